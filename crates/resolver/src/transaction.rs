//! Transaction projection and ordering
//!
//! The satisfying model is projected onto three lists: installs and
//! upgrades sorted dependencies-first, erases sorted dependents-first.
//! Residual cycles (shared-library families) degrade to a stable
//! arbitrary order inside the cycle.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

use urpm_types::Nevra;

use crate::pool::{PackageId, Pool};

/// One package movement in a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionItem {
    pub nevra: Nevra,
    /// Media the artifact comes from (None for installed-only entries)
    pub media_id: Option<i64>,
    pub digest: Option<String>,
    pub file_size: Option<u64>,
}

/// Resolver output: ordered package movements
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transaction {
    /// Dependency-first order
    pub to_install: Vec<TransactionItem>,
    /// Dependency-first order
    pub to_upgrade: Vec<TransactionItem>,
    /// Dependents-first (reverse topological) order
    pub to_erase: Vec<Nevra>,
    /// Packages left alone with the reason (holds, mostly)
    pub skipped: Vec<(String, String)>,
}

impl Transaction {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_install.is_empty() && self.to_upgrade.is_empty() && self.to_erase.is_empty()
    }

    /// Every artifact the engine must acquire
    #[must_use]
    pub fn artifacts(&self) -> impl Iterator<Item = &TransactionItem> {
        self.to_install.iter().chain(self.to_upgrade.iter())
    }
}

/// Order ids dependencies-first: if a requires something b provides,
/// b comes out before a.
#[must_use]
pub fn order_dependencies_first(pool: &Pool, selected: &[PackageId]) -> Vec<PackageId> {
    let in_set: HashSet<PackageId> = selected.iter().copied().collect();

    // a -> set of ids a depends on (within the selection)
    let mut deps: HashMap<PackageId, HashSet<PackageId>> = HashMap::new();
    let mut dependents: HashMap<PackageId, Vec<PackageId>> = HashMap::new();

    for &id in selected {
        let mut my_deps = HashSet::new();
        for cap in &pool.get(id).requires {
            for provider in pool.providers_of(cap) {
                if provider != id && in_set.contains(&provider) {
                    my_deps.insert(provider);
                }
            }
        }
        for &dep in &my_deps {
            dependents.entry(dep).or_default().push(id);
        }
        deps.insert(id, my_deps);
    }

    // Kahn's algorithm, smallest NEVRA first for determinism
    let mut ready: Vec<PackageId> = deps
        .iter()
        .filter(|(_, d)| d.is_empty())
        .map(|(&id, _)| id)
        .collect();
    ready.sort_by_key(|id| pool.get(*id).nevra.to_string());
    let mut queue: VecDeque<PackageId> = ready.into();

    let mut out = Vec::with_capacity(selected.len());
    let mut remaining: HashMap<PackageId, usize> =
        deps.iter().map(|(&id, d)| (id, d.len())).collect();

    while let Some(id) = queue.pop_front() {
        out.push(id);
        if let Some(deps_of) = dependents.get(&id) {
            let mut newly_ready = Vec::new();
            for &dependent in deps_of {
                if let Some(count) = remaining.get_mut(&dependent) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        newly_ready.push(dependent);
                    }
                }
            }
            newly_ready.sort_by_key(|id| pool.get(*id).nevra.to_string());
            queue.extend(newly_ready);
        }
        remaining.remove(&id);
    }

    // Cycle residue: emit in stable order
    if out.len() < selected.len() {
        let emitted: HashSet<PackageId> = out.iter().copied().collect();
        let mut rest: Vec<PackageId> = selected
            .iter()
            .copied()
            .filter(|id| !emitted.contains(id))
            .collect();
        rest.sort_by_key(|id| pool.get(*id).nevra.to_string());
        out.extend(rest);
    }

    out
}

/// Order ids dependents-first (erase order): reverse of the dependency
/// ordering over the same edges.
#[must_use]
pub fn order_dependents_first(pool: &Pool, selected: &[PackageId]) -> Vec<PackageId> {
    let mut ordered = order_dependencies_first(pool, selected);
    ordered.reverse();
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use urpm_types::{Capability, PackageMeta};

    fn meta(nevra: &str, provides: &[&str], requires: &[&str]) -> PackageMeta {
        let mut m = PackageMeta::new(Nevra::parse(nevra));
        m.provides = provides.iter().map(|p| Capability::parse(p)).collect();
        m.requires = requires.iter().map(|r| Capability::parse(r)).collect();
        m
    }

    #[test]
    fn dependencies_come_first() {
        let mut pool = Pool::new();
        let app = pool.add_available(&meta("app-1-1.x86_64", &[], &["libfoo.so.1"]), 1, 50);
        let lib = pool.add_available(
            &meta("libfoo-1-1.x86_64", &["libfoo.so.1"], &[]),
            1,
            50,
        );

        let ordered = order_dependencies_first(&pool, &[app, lib]);
        assert_eq!(ordered, vec![lib, app]);

        let erase_order = order_dependents_first(&pool, &[app, lib]);
        assert_eq!(erase_order, vec![app, lib]);
    }

    #[test]
    fn chains_are_fully_ordered() {
        let mut pool = Pool::new();
        let c = pool.add_available(&meta("c-1-1.noarch", &["cap_c"], &[]), 1, 50);
        let b = pool.add_available(&meta("b-1-1.noarch", &["cap_b"], &["cap_c"]), 1, 50);
        let a = pool.add_available(&meta("a-1-1.noarch", &[], &["cap_b"]), 1, 50);

        let ordered = order_dependencies_first(&pool, &[a, b, c]);
        assert_eq!(ordered, vec![c, b, a]);
    }

    #[test]
    fn cycles_do_not_wedge() {
        let mut pool = Pool::new();
        let x = pool.add_available(&meta("x-1-1.noarch", &["cap_x"], &["cap_y"]), 1, 50);
        let y = pool.add_available(&meta("y-1-1.noarch", &["cap_y"], &["cap_x"]), 1, 50);

        let ordered = order_dependencies_first(&pool, &[x, y]);
        assert_eq!(ordered.len(), 2);
    }
}
