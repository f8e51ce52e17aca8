//! NEVRA: the identity of a concrete package build

use crate::version::Evr;
use serde::{Deserialize, Serialize};
use std::fmt;

/// (Name, Epoch, Version, Release, Arch) - globally unique within a
/// media snapshot. The canonical string form is
/// `name-version-release.arch`; epoch is carried separately because the
/// synthesis format transmits it on the `@info` line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Nevra {
    pub name: String,
    pub epoch: u32,
    pub version: String,
    pub release: String,
    pub arch: String,
}

impl Nevra {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        epoch: u32,
        version: impl Into<String>,
        release: impl Into<String>,
        arch: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            epoch,
            version: version.into(),
            release: release.into(),
            arch: arch.into(),
        }
    }

    /// Parse a `name-version-release.arch` string. The package name may
    /// itself contain dashes, so version and release are split off the
    /// right; a missing arch defaults to `noarch`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let (nvr, arch) = match s.rsplit_once('.') {
            // An arch never contains '-'; a dotted release would
            Some((rest, a)) if !a.contains('-') && !a.is_empty() => (rest, a),
            _ => (s, "noarch"),
        };

        let mut it = nvr.rsplitn(3, '-');
        let release = it.next().unwrap_or("");
        let version = it.next().unwrap_or("");
        let name = it.next().unwrap_or("");

        if name.is_empty() {
            // Not enough dashes for n-v-r; treat the whole thing as a name
            Self::new(nvr, 0, version, release, arch)
        } else {
            Self::new(name, 0, version, release, arch)
        }
    }

    /// Parse with an explicit epoch (synthesis `@info` carries it apart)
    #[must_use]
    pub fn parse_with_epoch(s: &str, epoch: u32) -> Self {
        let mut nevra = Self::parse(s);
        nevra.epoch = epoch;
        nevra
    }

    #[must_use]
    pub fn evr(&self) -> Evr {
        Evr::new(self.epoch, self.version.clone(), self.release.clone())
    }

    /// File name of the package artifact in the cache
    #[must_use]
    pub fn rpm_file_name(&self) -> String {
        format!("{self}.rpm")
    }
}

impl Default for Nevra {
    fn default() -> Self {
        Self::new("", 0, "", "", "noarch")
    }
}

impl fmt::Display for Nevra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}.{}",
            self.name, self.version, self.release, self.arch
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain() {
        let n = Nevra::parse("firefox-120.0-1.mga9.x86_64");
        assert_eq!(n.name, "firefox");
        assert_eq!(n.version, "120.0");
        assert_eq!(n.release, "1.mga9");
        assert_eq!(n.arch, "x86_64");
    }

    #[test]
    fn parse_dashed_name() {
        let n = Nevra::parse("dhcp-client-4.4-1.mga10.x86_64");
        assert_eq!(n.name, "dhcp-client");
        assert_eq!(n.version, "4.4");
        assert_eq!(n.release, "1.mga10");
    }

    #[test]
    fn parse_missing_arch_defaults_noarch() {
        let n = Nevra::parse("somepkg-1.0-1");
        assert_eq!(n.arch, "noarch");
        assert_eq!(n.name, "somepkg");
    }

    #[test]
    fn display_round_trip() {
        let s = "vim-common-9.1-2.mga10.noarch";
        assert_eq!(Nevra::parse(s).to_string(), s);
    }

    #[test]
    fn rpm_file_name_appends_extension() {
        let n = Nevra::parse("jq-1.7-1.mga10.x86_64");
        assert_eq!(n.rpm_file_name(), "jq-1.7-1.mga10.x86_64.rpm");
    }
}
