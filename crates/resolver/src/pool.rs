//! Candidate pool
//!
//! Package graphs are cyclic, so candidates live in an arena keyed by
//! `PackageId`; every cross-reference (capability index, solver
//! variables, transaction output) is by id, never by owning reference.

use std::collections::HashMap;

use urpm_types::{Capability, InstalledPackage, Nevra, PackageMeta};

/// Arena index of one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId(pub u32);

impl PackageId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where a candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Installed,
    Media { media_id: i64, priority: i64 },
}

/// One candidate package in the pool
#[derive(Debug, Clone)]
pub struct Candidate {
    pub nevra: Nevra,
    pub origin: Origin,
    pub provides: Vec<Capability>,
    pub requires: Vec<Capability>,
    pub conflicts: Vec<Capability>,
    pub obsoletes: Vec<Capability>,
    pub recommends: Vec<Capability>,
    pub suggests: Vec<Capability>,
    /// Artifact digest when the catalog knows it
    pub digest: Option<String>,
    /// Download size hint
    pub file_size: Option<u64>,
}

impl Candidate {
    #[must_use]
    pub fn is_installed(&self) -> bool {
        matches!(self.origin, Origin::Installed)
    }

    #[must_use]
    pub fn media_priority(&self) -> i64 {
        match self.origin {
            Origin::Installed => 0,
            Origin::Media { priority, .. } => priority,
        }
    }
}

/// The pool: installed set union catalog, with a capability index
#[derive(Debug, Default)]
pub struct Pool {
    candidates: Vec<Candidate>,
    by_name: HashMap<String, Vec<PackageId>>,
    /// capability name -> providers carrying the provided capability
    providers: HashMap<String, Vec<PackageId>>,
}

impl Pool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of candidates (equals the solver's variable count)
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: PackageId) -> &Candidate {
        &self.candidates[id.index()]
    }

    #[must_use]
    pub fn ids(&self) -> impl Iterator<Item = PackageId> + '_ {
        #[allow(clippy::cast_possible_truncation)]
        (0..self.candidates.len()).map(|i| PackageId(i as u32))
    }

    /// Candidates sharing an exact package name
    #[must_use]
    pub fn by_name(&self, name: &str) -> &[PackageId] {
        self.by_name.get(name).map_or(&[], Vec::as_slice)
    }

    /// Candidates providing a capability matching the expression
    #[must_use]
    pub fn providers_of(&self, want: &Capability) -> Vec<PackageId> {
        let Some(ids) = self.providers.get(&want.name) else {
            return Vec::new();
        };
        ids.iter()
            .copied()
            .filter(|id| {
                self.get(*id)
                    .provides
                    .iter()
                    .any(|have| want.satisfies(have))
            })
            .collect()
    }

    /// Add an installed package
    pub fn add_installed(&mut self, pkg: &InstalledPackage) -> PackageId {
        self.push(Candidate {
            nevra: pkg.nevra.clone(),
            origin: Origin::Installed,
            provides: with_self_provide(&pkg.nevra, pkg.provides.clone()),
            requires: pkg.requires.clone(),
            conflicts: Vec::new(),
            obsoletes: Vec::new(),
            recommends: Vec::new(),
            suggests: Vec::new(),
            digest: None,
            file_size: None,
        })
    }

    /// Add a catalog candidate
    pub fn add_available(&mut self, meta: &PackageMeta, media_id: i64, priority: i64) -> PackageId {
        self.push(Candidate {
            nevra: meta.nevra.clone(),
            origin: Origin::Media { media_id, priority },
            provides: with_self_provide(&meta.nevra, meta.provides.clone()),
            requires: meta.requires.clone(),
            conflicts: meta.conflicts.clone(),
            obsoletes: meta.obsoletes.clone(),
            recommends: meta.recommends.clone(),
            suggests: meta.suggests.clone(),
            digest: meta.digest.clone(),
            file_size: meta.file_size,
        })
    }

    fn push(&mut self, candidate: Candidate) -> PackageId {
        #[allow(clippy::cast_possible_truncation)]
        let id = PackageId(self.candidates.len() as u32);
        self.by_name
            .entry(candidate.nevra.name.clone())
            .or_default()
            .push(id);
        for cap in &candidate.provides {
            self.providers.entry(cap.name.clone()).or_default().push(id);
        }
        self.candidates.push(candidate);
        id
    }

    /// The installed build of a name, if any
    #[must_use]
    pub fn installed_of(&self, name: &str) -> Option<PackageId> {
        self.by_name(name)
            .iter()
            .copied()
            .find(|id| self.get(*id).is_installed())
    }
}

/// Every package implicitly provides its own name at its own EVR
fn with_self_provide(nevra: &Nevra, mut provides: Vec<Capability>) -> Vec<Capability> {
    let has_self = provides
        .iter()
        .any(|c| c.name == nevra.name);
    if !has_self {
        provides.push(Capability::versioned(
            nevra.name.clone(),
            urpm_types::CapOp::Eq,
            nevra.evr(),
        ));
    }
    provides
}

#[cfg(test)]
mod tests {
    use super::*;
    use urpm_types::PackageMeta;

    fn meta(nevra: &str, provides: &[&str]) -> PackageMeta {
        let mut m = PackageMeta::new(Nevra::parse(nevra));
        m.provides = provides.iter().map(|p| Capability::parse(p)).collect();
        m
    }

    #[test]
    fn self_provide_is_implicit() {
        let mut pool = Pool::new();
        let id = pool.add_available(&meta("jq-1.7-1.x86_64", &[]), 1, 50);
        let providers = pool.providers_of(&Capability::parse("jq"));
        assert_eq!(providers, vec![id]);
    }

    #[test]
    fn versioned_provider_match() {
        let mut pool = Pool::new();
        pool.add_available(&meta("php8.4-fpm-8.4.2-1.x86_64", &["php[== 8.4.2]"]), 1, 50);
        pool.add_available(&meta("php8.5-fpm-8.5.0-1.x86_64", &["php[== 8.5.0]"]), 1, 50);

        let want = Capability::parse("php[== 8.4.2]");
        let hits = pool.providers_of(&want);
        assert_eq!(hits.len(), 1);
        assert_eq!(pool.get(hits[0]).nevra.name, "php8.4-fpm");
    }

    #[test]
    fn installed_lookup() {
        let mut pool = Pool::new();
        let installed = InstalledPackage {
            nevra: Nevra::parse("bash-5.2-3.x86_64"),
            provides: vec![],
            requires: vec![],
            install_time: 0,
        };
        let id = pool.add_installed(&installed);
        pool.add_available(&meta("bash-5.3-1.x86_64", &[]), 1, 50);

        assert_eq!(pool.installed_of("bash"), Some(id));
        assert_eq!(pool.by_name("bash").len(), 2);
    }
}
