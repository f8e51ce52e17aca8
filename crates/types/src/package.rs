//! Package record types

use crate::capability::Capability;
use crate::nevra::Nevra;
use serde::{Deserialize, Serialize};

/// Dependency kind attached to a capability list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepKind {
    Provides,
    Requires,
    Conflicts,
    Obsoletes,
    Recommends,
    Suggests,
}

impl DepKind {
    pub const ALL: [DepKind; 6] = [
        DepKind::Provides,
        DepKind::Requires,
        DepKind::Conflicts,
        DepKind::Obsoletes,
        DepKind::Recommends,
        DepKind::Suggests,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DepKind::Provides => "provides",
            DepKind::Requires => "requires",
            DepKind::Conflicts => "conflicts",
            DepKind::Obsoletes => "obsoletes",
            DepKind::Recommends => "recommends",
            DepKind::Suggests => "suggests",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "provides" => DepKind::Provides,
            "requires" => DepKind::Requires,
            "conflicts" => DepKind::Conflicts,
            "obsoletes" => DepKind::Obsoletes,
            "recommends" => DepKind::Recommends,
            "suggests" => DepKind::Suggests,
            _ => return None,
        })
    }
}

/// Full package record as ingested from media metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageMeta {
    pub nevra: Nevra,
    pub summary: String,
    pub group: String,
    /// Installed size in bytes
    pub size: u64,
    /// Compressed artifact size, when the synthesis publishes it
    pub file_size: Option<u64>,
    pub description: Option<String>,
    pub license: Option<String>,
    pub url: Option<String>,
    pub provides: Vec<Capability>,
    pub requires: Vec<Capability>,
    pub conflicts: Vec<Capability>,
    pub obsoletes: Vec<Capability>,
    pub recommends: Vec<Capability>,
    pub suggests: Vec<Capability>,
    /// SHA-256 of the package artifact, when known
    pub digest: Option<String>,
}

impl PackageMeta {
    #[must_use]
    pub fn new(nevra: Nevra) -> Self {
        Self {
            nevra,
            ..Self::default()
        }
    }

    /// Capability list for a given kind
    #[must_use]
    pub fn deps(&self, kind: DepKind) -> &[Capability] {
        match kind {
            DepKind::Provides => &self.provides,
            DepKind::Requires => &self.requires,
            DepKind::Conflicts => &self.conflicts,
            DepKind::Obsoletes => &self.obsoletes,
            DepKind::Recommends => &self.recommends,
            DepKind::Suggests => &self.suggests,
        }
    }

    pub fn deps_mut(&mut self, kind: DepKind) -> &mut Vec<Capability> {
        match kind {
            DepKind::Provides => &mut self.provides,
            DepKind::Requires => &mut self.requires,
            DepKind::Conflicts => &mut self.conflicts,
            DepKind::Obsoletes => &mut self.obsoletes,
            DepKind::Recommends => &mut self.recommends,
            DepKind::Suggests => &mut self.suggests,
        }
    }
}

/// Projection of one installed package out of the RPM database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub nevra: Nevra,
    pub provides: Vec<Capability>,
    pub requires: Vec<Capability>,
    pub install_time: i64,
}

/// File row belonging to a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageFile {
    pub nevra: String,
    pub dir: String,
    pub basename: String,
}

impl PackageFile {
    /// Split an absolute path into (dir, basename)
    #[must_use]
    pub fn from_path(nevra: &str, path: &str) -> Self {
        let (dir, basename) = match path.rsplit_once('/') {
            Some(("", base)) => ("/", base),
            Some((dir, base)) => (dir, base),
            None => ("/", path),
        };
        Self {
            nevra: nevra.to_string(),
            dir: dir.to_string(),
            basename: basename.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_path_split() {
        let f = PackageFile::from_path("x-1-1.noarch", "/usr/bin/foo");
        assert_eq!(f.dir, "/usr/bin");
        assert_eq!(f.basename, "foo");

        let root = PackageFile::from_path("x-1-1.noarch", "/vmlinuz");
        assert_eq!(root.dir, "/");
        assert_eq!(root.basename, "vmlinuz");
    }

    #[test]
    fn dep_kind_round_trip() {
        for kind in DepKind::ALL {
            assert_eq!(DepKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(DepKind::parse("enhances"), None);
    }
}
