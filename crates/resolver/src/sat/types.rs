//! Basic types for the SAT layer

use std::fmt;

/// A boolean variable; one per candidate package in the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(pub u32);

impl Variable {
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A variable or its negation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Literal {
    variable: Variable,
    positive: bool,
}

impl Literal {
    #[must_use]
    pub const fn positive(variable: Variable) -> Self {
        Self {
            variable,
            positive: true,
        }
    }

    #[must_use]
    pub const fn negative(variable: Variable) -> Self {
        Self {
            variable,
            positive: false,
        }
    }

    #[must_use]
    pub const fn variable(self) -> Variable {
        self.variable
    }

    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.positive
    }

    #[must_use]
    pub const fn negate(self) -> Self {
        Self {
            variable: self.variable,
            positive: !self.positive,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.positive {
            write!(f, "{}", self.variable)
        } else {
            write!(f, "!{}", self.variable)
        }
    }
}

/// Three-valued truth assignment over a dense variable range
#[derive(Debug, Clone)]
pub struct Assignment {
    values: Vec<Option<bool>>,
    /// Assignment order, for backtracking
    trail: Vec<Literal>,
    /// Trail length at each decision
    decision_marks: Vec<usize>,
}

impl Assignment {
    #[must_use]
    pub fn new(num_vars: usize) -> Self {
        Self {
            values: vec![None; num_vars],
            trail: Vec::with_capacity(num_vars),
            decision_marks: Vec::new(),
        }
    }

    #[must_use]
    pub fn value(&self, var: Variable) -> Option<bool> {
        self.values.get(var.index()).copied().flatten()
    }

    /// Literal truth under the current assignment
    #[must_use]
    pub fn eval(&self, lit: Literal) -> Option<bool> {
        self.value(lit.variable()).map(|v| v == lit.is_positive())
    }

    /// Record a propagated (non-decision) assignment
    pub fn assign(&mut self, lit: Literal) {
        self.values[lit.variable().index()] = Some(lit.is_positive());
        self.trail.push(lit);
    }

    /// Record a decision assignment, opening a new level
    pub fn decide(&mut self, lit: Literal) {
        self.decision_marks.push(self.trail.len());
        self.assign(lit);
    }

    #[must_use]
    pub fn decision_level(&self) -> usize {
        self.decision_marks.len()
    }

    /// Undo the current decision level; returns the decision literal,
    /// or None at level zero.
    pub fn backtrack(&mut self) -> Option<Literal> {
        let mark = self.decision_marks.pop()?;
        let decision = self.trail.get(mark).copied();
        for lit in self.trail.drain(mark..) {
            self.values[lit.variable().index()] = None;
        }
        decision
    }

    #[must_use]
    pub fn num_assigned(&self) -> usize {
        self.trail.len()
    }

    /// Variables assigned true in the final model
    #[must_use]
    pub fn true_variables(&self) -> Vec<Variable> {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| {
                #[allow(clippy::cast_possible_truncation)]
                v.filter(|&b| b).map(|_| Variable::new(i as u32))
            })
            .collect()
    }
}
