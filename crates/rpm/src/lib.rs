#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! RPM database boundary
//!
//! The RPM library is an opaque transaction executor to the rest of the
//! system: the engine assembles elements in resolver order, hands them
//! off, and streams progress. This crate defines that contract, a
//! process-backed implementation driving rpm(8), the installed-set
//! projection, and a recording double for tests.

mod installed;
mod lock;
mod process;

pub use installed::query_installed;
pub use lock::RpmLock;
pub use process::ProcessRpm;

use async_trait::async_trait;
use urpm_errors::Error;
use urpm_events::RpmPhase;

/// One element of an assembled RPM transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionElement {
    /// Install the artifact at this path
    Install(std::path::PathBuf),
    /// Upgrade using the artifact at this path
    Upgrade(std::path::PathBuf),
    /// Erase the installed package with this NEVRA
    Erase(String),
}

/// Progress callback payload
#[derive(Debug, Clone)]
pub struct RpmProgress {
    pub nevra: String,
    pub phase: RpmPhase,
    pub percent: u8,
}

/// Outcome of a handed-off transaction
#[derive(Debug, Clone, Default)]
pub struct RpmOutcome {
    /// NEVRAs present in the RPM database after the transaction
    pub installed_after: Vec<String>,
}

/// Opaque transaction executor contract.
///
/// Elements run in the order given; the implementation is not
/// interruptible once `run` starts - cancellation is the caller's
/// problem and applies only before the handoff.
#[async_trait]
pub trait RpmTransaction: Send + Sync {
    /// Execute the transaction, invoking `progress` per package phase.
    async fn run(
        &self,
        elements: &[TransactionElement],
        progress: &(dyn Fn(RpmProgress) + Send + Sync),
    ) -> Result<RpmOutcome, Error>;

    /// Dry-run verification of the same element list
    async fn test(&self, elements: &[TransactionElement]) -> Result<(), Error>;
}

/// Recording double: stores every handed-off transaction and plays back
/// a configurable installed set.
#[derive(Debug, Default)]
pub struct MockRpm {
    handed_off: std::sync::Mutex<Vec<Vec<TransactionElement>>>,
    installed: std::sync::Mutex<Vec<String>>,
    fail_next: std::sync::atomic::AtomicBool,
}

impl MockRpm {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the simulated installed set
    pub fn set_installed(&self, nevras: Vec<String>) {
        *self.installed.lock().expect("mock lock") = nevras;
    }

    /// Make the next `run` fail
    pub fn fail_next(&self) {
        self.fail_next
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// Transactions handed off so far
    #[must_use]
    pub fn transactions(&self) -> Vec<Vec<TransactionElement>> {
        self.handed_off.lock().expect("mock lock").clone()
    }

    /// Current simulated installed set
    #[must_use]
    pub fn installed(&self) -> Vec<String> {
        self.installed.lock().expect("mock lock").clone()
    }

    fn apply(&self, elements: &[TransactionElement]) -> Vec<String> {
        let mut installed = self.installed.lock().expect("mock lock");
        for element in elements {
            match element {
                TransactionElement::Install(path) | TransactionElement::Upgrade(path) => {
                    let nevra = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    // An upgrade displaces older builds of the same name
                    let name = urpm_types::Nevra::parse(&nevra).name;
                    installed.retain(|n| urpm_types::Nevra::parse(n).name != name);
                    installed.push(nevra);
                }
                TransactionElement::Erase(nevra) => {
                    installed.retain(|n| n != nevra);
                }
            }
        }
        installed.clone()
    }
}

#[async_trait]
impl RpmTransaction for MockRpm {
    async fn run(
        &self,
        elements: &[TransactionElement],
        progress: &(dyn Fn(RpmProgress) + Send + Sync),
    ) -> Result<RpmOutcome, Error> {
        if self.fail_next.swap(false, std::sync::atomic::Ordering::SeqCst) {
            return Err(urpm_errors::RpmError::ExitFailure {
                code: 1,
                stderr: "simulated failure".into(),
            }
            .into());
        }

        self.handed_off
            .lock()
            .expect("mock lock")
            .push(elements.to_vec());

        for element in elements {
            let (nevra, phase) = match element {
                TransactionElement::Install(p) | TransactionElement::Upgrade(p) => (
                    p.file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    RpmPhase::Install,
                ),
                TransactionElement::Erase(n) => (n.clone(), RpmPhase::Remove),
            };
            progress(RpmProgress {
                nevra: nevra.clone(),
                phase: RpmPhase::Prepare,
                percent: 0,
            });
            progress(RpmProgress {
                nevra,
                phase,
                percent: 100,
            });
        }

        Ok(RpmOutcome {
            installed_after: self.apply(elements),
        })
    }

    async fn test(&self, _elements: &[TransactionElement]) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn mock_records_and_applies() {
        let rpm = MockRpm::new();
        rpm.set_installed(vec!["old-1.0-1.x86_64".into()]);

        let elements = vec![
            TransactionElement::Install(PathBuf::from("/cache/new-2.0-1.x86_64.rpm")),
            TransactionElement::Erase("old-1.0-1.x86_64".into()),
        ];
        let outcome = rpm
            .run(&elements, &|_p| {})
            .await
            .unwrap();

        assert_eq!(outcome.installed_after, vec!["new-2.0-1.x86_64"]);
        assert_eq!(rpm.transactions().len(), 1);
    }

    #[tokio::test]
    async fn mock_failure_is_one_shot() {
        let rpm = MockRpm::new();
        rpm.fail_next();
        assert!(rpm.run(&[], &|_p| {}).await.is_err());
        assert!(rpm.run(&[], &|_p| {}).await.is_ok());
    }
}
