//! Candidate ranking
//!
//! Tie-break order: held-and-installed, preference score, media
//! priority, newer EVR, same-arch-as-system, locale tag on the name.

use crate::jobs::ResolveOptions;
use crate::pool::{Candidate, PackageId, Pool};
use crate::prefs;

/// Comparable rank; larger wins
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Rank {
    held_installed: bool,
    preference: i64,
    media_priority: i64,
    evr: urpm_types::Evr,
    arch_match: bool,
    locale_match: bool,
}

/// Rank one candidate under the given options
#[must_use]
pub fn rank(candidate: &Candidate, options: &ResolveOptions) -> Rank {
    Rank {
        held_installed: candidate.is_installed() && options.is_held(&candidate.nevra.name),
        preference: prefs::score(&options.preferences, candidate),
        media_priority: candidate.media_priority(),
        evr: candidate.nevra.evr(),
        arch_match: candidate.nevra.arch == options.system_arch
            || candidate.nevra.arch == "noarch",
        locale_match: options
            .locale
            .as_deref()
            .is_some_and(|tag| candidate.nevra.name.ends_with(&format!("-{tag}"))),
    }
}

/// Order candidate ids best-first
#[must_use]
pub fn order_best_first(
    pool: &Pool,
    ids: &[PackageId],
    options: &ResolveOptions,
) -> Vec<PackageId> {
    let mut ordered: Vec<PackageId> = ids.to_vec();
    ordered.sort_by(|a, b| {
        rank(pool.get(*b), options)
            .cmp(&rank(pool.get(*a), options))
            // Stable fallback so resolution is deterministic
            .then_with(|| pool.get(*a).nevra.to_string().cmp(&pool.get(*b).nevra.to_string()))
    });
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::Preference;
    use urpm_types::{Nevra, PackageMeta};

    fn pool_with(metas: &[(&str, i64)]) -> Pool {
        let mut pool = Pool::new();
        for (nevra, priority) in metas {
            pool.add_available(&PackageMeta::new(Nevra::parse(nevra)), 1, *priority);
        }
        pool
    }

    #[test]
    fn newer_evr_wins_at_equal_priority() {
        let pool = pool_with(&[("pkg-1.0-1.x86_64", 50), ("pkg-2.0-1.x86_64", 50)]);
        let options = ResolveOptions::new();
        let ids: Vec<_> = pool.ids().collect();
        let ordered = order_best_first(&pool, &ids, &options);
        assert_eq!(pool.get(ordered[0]).nevra.version, "2.0");
    }

    #[test]
    fn media_priority_beats_evr() {
        let pool = pool_with(&[("pkg-1.0-1.x86_64", 90), ("pkg-2.0-1.x86_64", 10)]);
        let options = ResolveOptions::new();
        let ids: Vec<_> = pool.ids().collect();
        let ordered = order_best_first(&pool, &ids, &options);
        assert_eq!(pool.get(ordered[0]).nevra.version, "1.0");
    }

    #[test]
    fn preference_beats_media_priority() {
        let mut pool = Pool::new();
        let mut low = PackageMeta::new(Nevra::parse("postfix-3.0-1.x86_64"));
        low.provides = vec![urpm_types::Capability::parse("mta")];
        let mut high = PackageMeta::new(Nevra::parse("sendmail-1.0-1.x86_64"));
        high.provides = vec![urpm_types::Capability::parse("mta")];
        pool.add_available(&low, 1, 10);
        pool.add_available(&high, 1, 90);

        let options =
            ResolveOptions::new().with_preferences(vec![Preference::parse("postfix")]);
        let ids: Vec<_> = pool.ids().collect();
        let ordered = order_best_first(&pool, &ids, &options);
        assert_eq!(pool.get(ordered[0]).nevra.name, "postfix");
    }

    #[test]
    fn arch_match_breaks_evr_tie() {
        let pool = pool_with(&[("pkg-1.0-1.i586", 50), ("pkg-1.0-1.x86_64", 50)]);
        let options = ResolveOptions::new();
        let ids: Vec<_> = pool.ids().collect();
        let ordered = order_best_first(&pool, &ids, &options);
        assert_eq!(pool.get(ordered[0]).nevra.arch, "x86_64");
    }
}
