//! Versioned capability expressions
//!
//! A capability is a named feature a package provides or requires,
//! optionally constrained to a version range. A file path such as
//! `/usr/bin/foo` is a capability with no version.

use crate::version::Evr;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Comparison operator in a capability expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapOp {
    None,
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CapOp {
    /// Parse the operator token (`==` and `=` are equivalent)
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "==" | "=" => Some(Self::Eq),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }

    /// RPMSENSE flag bits as found in binary headers (LESS=2, GREATER=4,
    /// EQUAL=8)
    #[must_use]
    pub fn from_rpm_flags(flags: u32) -> Self {
        match flags & 0x0e {
            0x02 => Self::Lt,
            0x0a => Self::Le,
            0x04 => Self::Gt,
            0x0c => Self::Ge,
            0x08 => Self::Eq,
            _ => Self::None,
        }
    }
}

impl fmt::Display for CapOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "",
            Self::Eq => "==",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        };
        f.write_str(s)
    }
}

/// A (name, op, evr) capability expression
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub op: CapOp,
    pub evr: Option<Evr>,
}

impl Capability {
    #[must_use]
    pub fn unversioned(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op: CapOp::None,
            evr: None,
        }
    }

    #[must_use]
    pub fn versioned(name: impl Into<String>, op: CapOp, evr: Evr) -> Self {
        Self {
            name: name.into(),
            op,
            evr: Some(evr),
        }
    }

    /// Parse a capability token. Accepted shapes:
    /// `name`, `name[>= 1.0]`, `name[== 1:2.0-1]`, `name >= 1.0`,
    /// `name>=1.0`.
    #[must_use]
    pub fn parse(token: &str) -> Self {
        let token = token.trim();

        // Bracketed constraint: name[op evr]
        if let Some(open) = token.find('[') {
            if let Some(rest) = token[open + 1..].strip_suffix(']') {
                let name = &token[..open];
                if let Some((op, evr)) = split_constraint(rest) {
                    return Self::versioned(name, op, evr);
                }
                // Bracket without an operator (e.g. locale tags) is part
                // of the name
            }
        }

        if let Some((op, evr, name)) = find_inline_constraint(token) {
            return Self::versioned(name, op, evr);
        }

        Self::unversioned(token)
    }

    /// Whether this (required) capability is satisfied by a provided one.
    /// Name must match exactly; version ranges must overlap. An
    /// unversioned side satisfies anything with the same name.
    #[must_use]
    pub fn satisfies(&self, provided: &Capability) -> bool {
        if self.name != provided.name {
            return false;
        }
        let (Some(want), Some(have)) = (&self.evr, &provided.evr) else {
            return true;
        };
        // A provide with no release published against a require with one
        // (or vice versa) compares on the populated fields only
        let ord = if want.release.is_empty() || have.release.is_empty() {
            Evr::new(want.epoch, want.version.clone(), "")
                .cmp(&Evr::new(have.epoch, have.version.clone(), ""))
        } else {
            want.cmp(have)
        };
        range_overlaps(self.op, provided.op, ord)
    }

    /// File-path capabilities have no version and start with '/'
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.name.starts_with('/')
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.evr {
            Some(evr) => write!(f, "{}[{} {}]", self.name, self.op, evr),
            None => f.write_str(&self.name),
        }
    }
}

fn split_constraint(s: &str) -> Option<(CapOp, Evr)> {
    let s = s.trim();
    let op_len = s
        .bytes()
        .take_while(|c| matches!(c, b'<' | b'>' | b'=' | b'!'))
        .count();
    if op_len == 0 {
        return None;
    }
    let op = CapOp::parse(&s[..op_len])?;
    let evr = Evr::parse(s[op_len..].trim());
    Some((op, evr))
}

fn find_inline_constraint(token: &str) -> Option<(CapOp, Evr, &str)> {
    let bytes = token.as_bytes();
    let start = bytes
        .iter()
        .position(|c| matches!(c, b'<' | b'>' | b'='))?;
    // A '/' path may contain '=' in a query-ish name; only treat as
    // constraint when something version-like follows
    let (name, rest) = token.split_at(start);
    let op_len = rest
        .bytes()
        .take_while(|c| matches!(c, b'<' | b'>' | b'='))
        .count();
    let op = CapOp::parse(&rest[..op_len])?;
    let evr_str = rest[op_len..].trim();
    if evr_str.is_empty() {
        return None;
    }
    Some((op, Evr::parse(evr_str), name.trim()))
}

/// Does `want.op` intersect `have.op` given the ordering of their EVRs?
fn range_overlaps(want: CapOp, have: CapOp, ord: Ordering) -> bool {
    use CapOp::{Eq, Ge, Gt, Le, Lt, None as NoOp};
    match (want, have) {
        (NoOp, _) | (_, NoOp) => true,
        (Eq, Eq) => ord == Ordering::Equal,
        (Eq, Ge) | (Le, Eq) | (Le, Ge) => ord != Ordering::Less,
        (Eq, Le) | (Ge, Eq) | (Ge, Le) => ord != Ordering::Greater,
        (Eq, Gt) | (Lt, Eq) | (Lt, Ge) | (Le, Gt) | (Lt, Gt) => ord == Ordering::Greater,
        (Eq, Lt) | (Gt, Eq) | (Gt, Le) | (Ge, Lt) | (Gt, Lt) => ord == Ordering::Less,
        // Open-ended pairs always intersect somewhere
        (Ge, Ge | Gt) | (Gt, Ge | Gt) | (Le, Le | Lt) | (Lt, Le | Lt) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare() {
        let c = Capability::parse("libfoo.so.1");
        assert_eq!(c.name, "libfoo.so.1");
        assert_eq!(c.op, CapOp::None);
        assert!(c.evr.is_none());
    }

    #[test]
    fn parse_bracketed() {
        let c = Capability::parse("mta[>= 2.0]");
        assert_eq!(c.name, "mta");
        assert_eq!(c.op, CapOp::Ge);
        assert_eq!(c.evr.unwrap().version, "2.0");
    }

    #[test]
    fn parse_bracketed_double_eq() {
        let c = Capability::parse("php[== 8.4.2]");
        assert_eq!(c.op, CapOp::Eq);
    }

    #[test]
    fn parse_inline() {
        let c = Capability::parse("libbar>=1.2.3");
        assert_eq!(c.name, "libbar");
        assert_eq!(c.op, CapOp::Ge);
    }

    #[test]
    fn file_path_is_capability() {
        let c = Capability::parse("/usr/bin/python3");
        assert!(c.is_file());
        assert_eq!(c.op, CapOp::None);
    }

    #[test]
    fn unversioned_satisfies_everything() {
        let want = Capability::parse("mta");
        let have = Capability::parse("mta[== 1.0]");
        assert!(want.satisfies(&have));
        assert!(have.satisfies(&want));
    }

    #[test]
    fn versioned_satisfaction() {
        let want = Capability::parse("libssl[>= 3.0]");
        assert!(want.satisfies(&Capability::parse("libssl[== 3.2]")));
        assert!(!want.satisfies(&Capability::parse("libssl[== 1.1]")));
        assert!(want.satisfies(&Capability::parse("libssl")));
    }

    #[test]
    fn different_names_never_satisfy() {
        let want = Capability::parse("mta");
        assert!(!want.satisfies(&Capability::parse("mua")));
    }

    #[test]
    fn rpm_flag_bits() {
        assert_eq!(CapOp::from_rpm_flags(0x08), CapOp::Eq);
        assert_eq!(CapOp::from_rpm_flags(0x02), CapOp::Lt);
        assert_eq!(CapOp::from_rpm_flags(0x0c), CapOp::Ge);
        assert_eq!(CapOp::from_rpm_flags(0), CapOp::None);
    }
}
