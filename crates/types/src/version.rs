//! RPM epoch:version-release handling
//!
//! Ordering follows the rpmvercmp contract: versions are split into
//! alternating numeric and alphabetic segments, numeric segments compare
//! as integers, `~` sorts before anything (including end of string) and
//! `^` sorts after the common prefix.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Epoch, version, release triple
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Evr {
    pub epoch: u32,
    pub version: String,
    pub release: String,
}

impl Evr {
    #[must_use]
    pub fn new(epoch: u32, version: impl Into<String>, release: impl Into<String>) -> Self {
        Self {
            epoch,
            version: version.into(),
            release: release.into(),
        }
    }

    /// Parse `[epoch:]version[-release]`
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let (epoch, rest) = match s.split_once(':') {
            Some((e, rest)) => (e.parse().unwrap_or(0), rest),
            None => (0, s),
        };
        match rest.rsplit_once('-') {
            Some((v, r)) => Self::new(epoch, v, r),
            None => Self::new(epoch, rest, ""),
        }
    }
}

impl fmt::Display for Evr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.version)?;
        if !self.release.is_empty() {
            write!(f, "-{}", self.release)?;
        }
        Ok(())
    }
}

impl PartialOrd for Evr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Evr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| rpm_vercmp(&self.version, &other.version))
            .then_with(|| rpm_vercmp(&self.release, &other.release))
    }
}

/// Compare two version strings the way rpmvercmp does.
#[must_use]
pub fn rpm_vercmp(a: &str, b: &str) -> Ordering {
    let mut a = a.as_bytes();
    let mut b = b.as_bytes();

    loop {
        // Drop separator characters (everything that is not alnum, ~ or ^)
        a = skip_separators(a);
        b = skip_separators(b);

        // Tilde sorts before everything, including end of string
        match (a.first() == Some(&b'~'), b.first() == Some(&b'~')) {
            (true, true) => {
                a = &a[1..];
                b = &b[1..];
                continue;
            }
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }

        // Caret sorts after the base version but before a longer one
        match (a.first() == Some(&b'^'), b.first() == Some(&b'^')) {
            (true, true) => {
                a = &a[1..];
                b = &b[1..];
                continue;
            }
            (true, false) => {
                return if b.is_empty() {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            (false, true) => {
                return if a.is_empty() {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
            (false, false) => {}
        }

        if a.is_empty() || b.is_empty() {
            return a.len().cmp(&b.len());
        }

        let a_digit = a[0].is_ascii_digit();
        let (seg_a, rest_a) = take_segment(a, a_digit);
        let (seg_b, rest_b) = take_segment(b, a_digit);

        // The other side has no segment of this kind: numeric wins
        if seg_b.is_empty() {
            return if a_digit {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let ord = if a_digit {
            let ta = trim_leading_zeros(seg_a);
            let tb = trim_leading_zeros(seg_b);
            ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb))
        } else {
            seg_a.cmp(seg_b)
        };

        if ord != Ordering::Equal {
            return ord;
        }

        a = rest_a;
        b = rest_b;
    }
}

fn skip_separators(s: &[u8]) -> &[u8] {
    let n = s
        .iter()
        .take_while(|c| !c.is_ascii_alphanumeric() && **c != b'~' && **c != b'^')
        .count();
    &s[n..]
}

fn take_segment(s: &[u8], digits: bool) -> (&[u8], &[u8]) {
    let n = s
        .iter()
        .take_while(|c| {
            if digits {
                c.is_ascii_digit()
            } else {
                c.is_ascii_alphabetic()
            }
        })
        .count();
    s.split_at(n)
}

fn trim_leading_zeros(s: &[u8]) -> &[u8] {
    let n = s.iter().take_while(|c| **c == b'0').count();
    if n == s.len() {
        &s[s.len() - 1..]
    } else {
        &s[n..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(a: &str, b: &str) -> Ordering {
        rpm_vercmp(a, b)
    }

    #[test]
    fn simple_numeric() {
        assert_eq!(cmp("1.0", "1.0"), Ordering::Equal);
        assert_eq!(cmp("1.0", "2.0"), Ordering::Less);
        assert_eq!(cmp("2.0.1", "2.0"), Ordering::Greater);
        assert_eq!(cmp("10", "9"), Ordering::Greater);
    }

    #[test]
    fn leading_zeros_ignored() {
        assert_eq!(cmp("1.05", "1.5"), Ordering::Equal);
        assert_eq!(cmp("1.05", "1.06"), Ordering::Less);
    }

    #[test]
    fn alpha_vs_numeric() {
        assert_eq!(cmp("1.0a", "1.0"), Ordering::Greater);
        assert_eq!(cmp("1.0", "1.0rc1"), Ordering::Less);
        assert_eq!(cmp("alpha", "beta"), Ordering::Less);
        // Numeric segment beats alphabetic at the same position
        assert_eq!(cmp("1.1", "1.a"), Ordering::Greater);
    }

    #[test]
    fn tilde_sorts_first() {
        assert_eq!(cmp("1.0~rc1", "1.0"), Ordering::Less);
        assert_eq!(cmp("1.0~rc1", "1.0~rc2"), Ordering::Less);
        assert_eq!(cmp("1.0~~", "1.0~"), Ordering::Less);
    }

    #[test]
    fn caret_sorts_after_base() {
        assert_eq!(cmp("1.0^git1", "1.0"), Ordering::Greater);
        assert_eq!(cmp("1.0^git1", "1.0.1"), Ordering::Less);
    }

    #[test]
    fn separators_are_soft() {
        assert_eq!(cmp("1.0.1", "1_0_1"), Ordering::Equal);
        assert_eq!(cmp("2.0-1", "2.0.1"), Ordering::Equal);
    }

    #[test]
    fn evr_ordering_uses_epoch_first() {
        let old = Evr::new(0, "9.9", "1");
        let new = Evr::new(1, "1.0", "1");
        assert!(new > old);
    }

    #[test]
    fn evr_parse_display_round_trip() {
        let evr = Evr::parse("2:4.4-1.mga10");
        assert_eq!(evr.epoch, 2);
        assert_eq!(evr.version, "4.4");
        assert_eq!(evr.release, "1.mga10");
        assert_eq!(evr.to_string(), "2:4.4-1.mga10");

        let bare = Evr::parse("3.0");
        assert_eq!(bare.epoch, 0);
        assert_eq!(bare.to_string(), "3.0");
    }
}
