//! rpm(8)-backed transaction executor
//!
//! Assembles the element list into rpm invocations: installs and
//! upgrades in one `-U`/`-i` run, erases in one `-e` run, in the order
//! the resolver produced. Progress granularity is per invocation phase;
//! rpm itself owns sub-package progress.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, warn};
use urpm_errors::{Error, RpmError};
use urpm_events::RpmPhase;

use crate::{RpmOutcome, RpmProgress, RpmTransaction, TransactionElement};

/// Executor driving the system rpm binary
#[derive(Debug, Clone)]
pub struct ProcessRpm {
    root: Option<PathBuf>,
}

impl ProcessRpm {
    #[must_use]
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new("rpm");
        if let Some(root) = &self.root {
            cmd.arg("--root").arg(root);
        }
        cmd
    }

    async fn run_rpm(&self, args: &[String]) -> Result<(), Error> {
        let mut cmd = self.base_command();
        cmd.args(args);
        debug!(?args, "invoking rpm");

        let output = cmd.output().await.map_err(|e| RpmError::BinaryMissing {
            path: format!("rpm: {e}"),
        })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(code = output.status.code(), "rpm failed");
            Err(RpmError::ExitFailure {
                code: output.status.code().unwrap_or(-1),
                stderr,
            }
            .into())
        }
    }

    fn split(elements: &[TransactionElement]) -> (Vec<&PathBuf>, Vec<&PathBuf>, Vec<&String>) {
        let mut installs = Vec::new();
        let mut upgrades = Vec::new();
        let mut erases = Vec::new();
        for element in elements {
            match element {
                TransactionElement::Install(p) => installs.push(p),
                TransactionElement::Upgrade(p) => upgrades.push(p),
                TransactionElement::Erase(n) => erases.push(n),
            }
        }
        (installs, upgrades, erases)
    }
}

#[async_trait]
impl RpmTransaction for ProcessRpm {
    async fn run(
        &self,
        elements: &[TransactionElement],
        progress: &(dyn Fn(RpmProgress) + Send + Sync),
    ) -> Result<RpmOutcome, Error> {
        let (installs, upgrades, erases) = Self::split(elements);

        let emit = |nevra: &str, phase: RpmPhase, percent: u8| {
            progress(RpmProgress {
                nevra: nevra.to_string(),
                phase,
                percent,
            });
        };

        for path in installs.iter().chain(&upgrades) {
            emit(&stem(path), RpmPhase::Prepare, 0);
        }

        if !installs.is_empty() {
            let mut args = vec!["-i".to_string(), "--nosignature".to_string()];
            args.extend(installs.iter().map(|p| p.display().to_string()));
            self.run_rpm(&args).await?;
            for path in &installs {
                emit(&stem(path), RpmPhase::Install, 100);
            }
        }

        if !upgrades.is_empty() {
            let mut args = vec!["-U".to_string(), "--nosignature".to_string()];
            args.extend(upgrades.iter().map(|p| p.display().to_string()));
            self.run_rpm(&args).await?;
            for path in &upgrades {
                emit(&stem(path), RpmPhase::Install, 100);
            }
        }

        if !erases.is_empty() {
            let mut args = vec!["-e".to_string()];
            args.extend(erases.iter().map(|n| (*n).clone()));
            self.run_rpm(&args).await?;
            for nevra in &erases {
                emit(nevra, RpmPhase::Remove, 100);
            }
        }

        for element in elements {
            if let TransactionElement::Install(p) | TransactionElement::Upgrade(p) = element {
                emit(&stem(p), RpmPhase::Cleanup, 100);
            }
        }

        let installed_after = crate::query_installed(self.root.as_deref())
            .await?
            .into_iter()
            .map(|p| p.nevra.to_string())
            .collect();

        Ok(RpmOutcome { installed_after })
    }

    async fn test(&self, elements: &[TransactionElement]) -> Result<(), Error> {
        let (installs, upgrades, erases) = Self::split(elements);

        if !installs.is_empty() || !upgrades.is_empty() {
            let mut args = vec![
                "-U".to_string(),
                "--test".to_string(),
                "--nosignature".to_string(),
            ];
            args.extend(installs.iter().chain(&upgrades).map(|p| p.display().to_string()));
            self.run_rpm(&args).await?;
        }
        if !erases.is_empty() {
            let mut args = vec!["-e".to_string(), "--test".to_string()];
            args.extend(erases.iter().map(|n| (*n).clone()));
            self.run_rpm(&args).await?;
        }
        Ok(())
    }
}

fn stem(path: &std::path::Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
