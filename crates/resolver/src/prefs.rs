//! User preferences
//!
//! Preferences are guidance applied at the capability layer: a
//! candidate is favored when any of its provides or requires match.
//! They break ties and steer alternative choices; they never override
//! hard dependencies, and an unmatched preference is a no-op.

use crate::pool::Candidate;

/// One parsed preference token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preference {
    /// `name:version` - favor candidates providing this versioned
    /// capability
    Versioned { name: String, version: String },
    /// `pattern` - favor candidates whose capability names contain this
    Favor(String),
    /// `-pattern` - push down candidates whose capability names contain
    /// this
    Avoid(String),
}

impl Preference {
    /// Parse a single token
    #[must_use]
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        if let Some(pattern) = token.strip_prefix('-') {
            return Self::Avoid(pattern.to_string());
        }
        if let Some((name, version)) = token.split_once(':') {
            if !version.is_empty() && version.chars().next().is_some_and(char::is_numeric) {
                return Self::Versioned {
                    name: name.to_string(),
                    version: version.to_string(),
                };
            }
        }
        Self::Favor(token.to_string())
    }

    /// Parse a comma-separated preference list
    #[must_use]
    pub fn parse_list(tokens: &str) -> Vec<Self> {
        tokens
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(Self::parse)
            .collect()
    }
}

const FAVOR_WEIGHT: i64 = 100;
const VERSION_WEIGHT: i64 = 200;
const AVOID_WEIGHT: i64 = -300;

/// Preference score of a candidate. Zero when nothing matches.
#[must_use]
pub fn score(prefs: &[Preference], candidate: &Candidate) -> i64 {
    let caps = candidate
        .provides
        .iter()
        .chain(candidate.requires.iter());

    let mut total = 0;
    for pref in prefs {
        let mut matched = false;
        match pref {
            Preference::Versioned { name, version } => {
                for cap in caps.clone() {
                    let version_hit = cap
                        .evr
                        .as_ref()
                        .is_some_and(|evr| version_prefix_match(version, &evr.version));
                    if cap.name == *name && version_hit {
                        matched = true;
                        break;
                    }
                }
                if matched {
                    total += VERSION_WEIGHT;
                }
            }
            Preference::Favor(pattern) => {
                if caps.clone().any(|c| c.name.contains(pattern.as_str())) {
                    total += FAVOR_WEIGHT;
                }
            }
            Preference::Avoid(pattern) => {
                if caps.clone().any(|c| c.name.contains(pattern.as_str())) {
                    total += AVOID_WEIGHT;
                }
            }
        }
    }
    total
}

/// `8.4` matches `8.4` and `8.4.2`, but not `8.40` or `8.5.0`:
/// dot-separated segments of the wanted version must equal the leading
/// segments of the provided one.
fn version_prefix_match(want: &str, have: &str) -> bool {
    let want_segs: Vec<&str> = want.split('.').collect();
    let have_segs: Vec<&str> = have.split('.').collect();
    want_segs.len() <= have_segs.len()
        && want_segs.iter().zip(&have_segs).all(|(w, h)| w == h)
}

/// Whether any preference distinguishes the listed candidates (used for
/// choice-point detection)
#[must_use]
pub fn disambiguates(prefs: &[Preference], candidates: &[&Candidate]) -> bool {
    if prefs.is_empty() || candidates.len() < 2 {
        return false;
    }
    let scores: Vec<i64> = candidates.iter().map(|c| score(prefs, c)).collect();
    let max = scores.iter().copied().max().unwrap_or(0);
    scores.iter().filter(|&&s| s == max).count() == 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Origin;
    use urpm_types::{Capability, Nevra};

    fn candidate(name: &str, provides: &[&str], requires: &[&str]) -> Candidate {
        Candidate {
            nevra: Nevra::parse(&format!("{name}-1.0-1.x86_64")),
            origin: Origin::Media {
                media_id: 1,
                priority: 50,
            },
            provides: provides.iter().map(|p| Capability::parse(p)).collect(),
            requires: requires.iter().map(|r| Capability::parse(r)).collect(),
            conflicts: vec![],
            obsoletes: vec![],
            recommends: vec![],
            suggests: vec![],
            digest: None,
            file_size: None,
        }
    }

    #[test]
    fn token_shapes() {
        assert_eq!(
            Preference::parse("php:8.4"),
            Preference::Versioned {
                name: "php".into(),
                version: "8.4".into()
            }
        );
        assert_eq!(Preference::parse("apache"), Preference::Favor("apache".into()));
        assert_eq!(
            Preference::parse("-apache-mod_php"),
            Preference::Avoid("apache-mod_php".into())
        );
    }

    #[test]
    fn scenario_preference_guided_resolution() {
        let prefs = Preference::parse_list("php:8.4,apache,php-fpm,-apache-mod_php");

        let fpm_apache = candidate(
            "php8.4-fpm-apache",
            &["php[== 8.4.2]", "php-fpm"],
            &["apache"],
        );
        let fpm_nginx = candidate(
            "php8.4-fpm-nginx",
            &["php[== 8.4.2]", "php-fpm"],
            &["nginx"],
        );
        let mod_php = candidate(
            "apache-mod_php8.4",
            &["php[== 8.4.2]", "apache-mod_php"],
            &["apache"],
        );
        let fpm_85 = candidate(
            "php8.5-fpm-apache",
            &["php[== 8.5.0]", "php-fpm"],
            &["apache"],
        );

        let s_winner = score(&prefs, &fpm_apache);
        assert!(s_winner > score(&prefs, &fpm_nginx));
        assert!(s_winner > score(&prefs, &mod_php));
        assert!(s_winner > score(&prefs, &fpm_85));
    }

    #[test]
    fn version_prefix_is_segment_aware() {
        assert!(version_prefix_match("8.4", "8.4"));
        assert!(version_prefix_match("8.4", "8.4.2"));
        assert!(!version_prefix_match("8.4", "8.40"));
        assert!(!version_prefix_match("8.4", "8.5.0"));
        assert!(!version_prefix_match("8.4.2.1", "8.4.2"));
    }

    #[test]
    fn unmatched_preference_is_noop() {
        let prefs = Preference::parse_list("php-fpm");
        let plain = candidate("vim", &[], &[]);
        assert_eq!(score(&prefs, &plain), 0);
    }

    #[test]
    fn disambiguation_requires_unique_winner() {
        let prefs = Preference::parse_list("postfix");
        let sendmail = candidate("sendmail", &["mta", "sendmail"], &[]);
        let postfix = candidate("postfix", &["mta", "postfix"], &[]);
        assert!(disambiguates(&prefs, &[&sendmail, &postfix]));
        assert!(!disambiguates(&[], &[&sendmail, &postfix]));
    }
}
