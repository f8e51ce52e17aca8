//! Installed-set projection out of the RPM database
//!
//! Queried through rpm(8) with a fixed queryformat; reloaded on demand
//! and never persisted by the catalog.

use tokio::process::Command;
use tracing::debug;
use urpm_errors::{Error, RpmError};
use urpm_types::{Capability, InstalledPackage, Nevra};

const QUERYFORMAT: &str =
    "%{NAME}\\t%{EPOCH}\\t%{VERSION}\\t%{RELEASE}\\t%{ARCH}\\t%{INSTALLTIME}\\t[%{PROVIDENEVRS},]\\t[%{REQUIRENEVRS},]\\n";

/// Query every installed package with provides and requires.
///
/// `root` switches the RPM database root (`--root`); `None` queries the
/// running system.
///
/// # Errors
///
/// Returns `RpmError::QueryFailed` when rpm(8) exits non-zero and
/// `RpmError::BinaryMissing` when it cannot be spawned.
pub async fn query_installed(root: Option<&std::path::Path>) -> Result<Vec<InstalledPackage>, Error> {
    let mut cmd = Command::new("rpm");
    cmd.arg("-qa").arg("--qf").arg(QUERYFORMAT);
    if let Some(root) = root {
        cmd.arg("--root").arg(root);
    }

    let output = cmd.output().await.map_err(|e| RpmError::BinaryMissing {
        path: format!("rpm: {e}"),
    })?;

    if !output.status.success() {
        return Err(RpmError::QueryFailed {
            message: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
        .into());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let packages = parse_query_output(&stdout);
    debug!(count = packages.len(), "loaded installed set");
    Ok(packages)
}

/// Parse the fixed queryformat output. Kept separate so tests can feed
/// captured output without an RPM database.
#[must_use]
pub fn parse_query_output(output: &str) -> Vec<InstalledPackage> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let name = fields.next()?;
            if name.is_empty() {
                return None;
            }
            let epoch_raw = fields.next()?;
            // rpm prints "(none)" for an absent epoch
            let epoch = epoch_raw.parse().unwrap_or(0);
            let version = fields.next()?;
            let release = fields.next()?;
            let arch = fields.next()?;
            let install_time = fields.next()?.parse().unwrap_or(0);
            let provides = parse_cap_list(fields.next().unwrap_or(""));
            let requires = parse_cap_list(fields.next().unwrap_or(""));

            Some(InstalledPackage {
                nevra: Nevra::new(name, epoch, version, release, arch),
                provides,
                requires,
                install_time,
            })
        })
        .collect()
}

fn parse_cap_list(raw: &str) -> Vec<Capability> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Capability::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_query_lines() {
        let output = "\
bash\t(none)\t5.2\t3.mga10\tx86_64\t1700000000\tbash = 5.2-3.mga10,/bin/bash,\tlibc.so.6,glibc >= 2.38,
dhcp-client\t2\t4.4\t1.mga10\tx86_64\t1700000100\tdhcp-client = 2:4.4-1.mga10,\t/bin/sh,
";
        let pkgs = parse_query_output(output);
        assert_eq!(pkgs.len(), 2);

        assert_eq!(pkgs[0].nevra.name, "bash");
        assert_eq!(pkgs[0].nevra.epoch, 0);
        assert_eq!(pkgs[0].provides.len(), 2);
        assert!(pkgs[0].provides[1].is_file());
        assert_eq!(pkgs[0].requires.len(), 2);

        assert_eq!(pkgs[1].nevra.epoch, 2);
        assert_eq!(pkgs[1].install_time, 1_700_000_100);
    }

    #[test]
    fn empty_output_is_empty_set() {
        assert!(parse_query_output("").is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let pkgs = parse_query_output("garbage line with no tabs\n");
        assert!(pkgs.is_empty());
    }
}
