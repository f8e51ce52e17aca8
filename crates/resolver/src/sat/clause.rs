//! Clauses and the reasons they exist
//!
//! Every clause carries the package-level rule that produced it, so an
//! unsatisfiable core reports as a dependency chain instead of raw
//! literals.

use super::types::Literal;
use std::fmt;

/// Why a clause is in the problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// A user job demanded one of these candidates
    Job(String),
    /// Package requires a capability
    Requires { package: String, capability: String },
    /// Two packages cannot coexist (explicit conflict)
    Conflicts { a: String, b: String },
    /// Two builds of the same name cannot coexist
    SameName { a: String, b: String },
    /// Installing one obsoletes the other
    Obsoletes { winner: String, loser: String },
    /// Name is blacklisted
    Blacklisted(String),
    /// Held package must stay installed
    Held(String),
    /// Erase job removes this package
    Erase(String),
    /// Weak dependency (droppable)
    Recommends { package: String, capability: String },
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Job(job) => write!(f, "requested: {job}"),
            Reason::Requires {
                package,
                capability,
            } => write!(f, "{package} requires {capability}"),
            Reason::Conflicts { a, b } => write!(f, "{a} conflicts with {b}"),
            Reason::SameName { a, b } => write!(f, "{a} and {b} are the same package name"),
            Reason::Obsoletes { winner, loser } => write!(f, "{winner} obsoletes {loser}"),
            Reason::Blacklisted(name) => write!(f, "{name} is blacklisted"),
            Reason::Held(name) => write!(f, "{name} is held"),
            Reason::Erase(name) => write!(f, "erase {name}"),
            Reason::Recommends {
                package,
                capability,
            } => write!(f, "{package} recommends {capability}"),
        }
    }
}

/// A disjunction of literals with provenance
#[derive(Debug, Clone)]
pub struct Clause {
    literals: Vec<Literal>,
    pub reason: Reason,
}

impl Clause {
    /// Build a clause, dropping duplicate literals. Returns None for a
    /// tautology (contains both polarities of a variable).
    #[must_use]
    pub fn new(mut literals: Vec<Literal>, reason: Reason) -> Option<Self> {
        literals.sort_by_key(|l| (l.variable(), l.is_positive()));
        literals.dedup();

        let tautology = literals
            .windows(2)
            .any(|w| w[0].variable() == w[1].variable());
        if tautology {
            return None;
        }

        Some(Self { literals, reason })
    }

    #[must_use]
    pub fn unit(literal: Literal, reason: Reason) -> Self {
        Self {
            literals: vec![literal],
            reason,
        }
    }

    #[must_use]
    pub fn literals(&self) -> &[Literal] {
        &self.literals
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.literals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sat::types::Variable;

    #[test]
    fn tautology_is_dropped() {
        let v = Variable::new(0);
        let clause = Clause::new(
            vec![Literal::positive(v), Literal::negative(v)],
            Reason::Job("x".into()),
        );
        assert!(clause.is_none());
    }

    #[test]
    fn duplicates_are_merged() {
        let v = Variable::new(0);
        let clause = Clause::new(
            vec![Literal::positive(v), Literal::positive(v)],
            Reason::Job("x".into()),
        )
        .unwrap();
        assert_eq!(clause.len(), 1);
    }
}
