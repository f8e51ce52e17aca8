//! DPLL solver with unit propagation and activity-guided decisions
//!
//! The problem sizes here (one variable per candidate package) do not
//! need clause learning; chronological backtracking with watched
//! clauses per literal and a polarity hint per variable is enough and
//! keeps the model deterministic.

use std::collections::HashMap;

use super::clause::{Clause, Reason};
use super::types::{Assignment, Literal, Variable};

/// Solver outcome
pub enum SatResult {
    /// Satisfying assignment found
    Sat(Assignment),
    /// Unsatisfiable; the reasons on the conflicting path
    Unsat(Vec<Reason>),
}

/// DPLL solver over the candidate pool
pub struct Solver {
    num_vars: usize,
    clauses: Vec<Clause>,
    /// literal -> clause indices containing it
    occurrences: HashMap<Literal, Vec<usize>>,
    /// Decision priority per variable (higher decides earlier)
    activity: Vec<i64>,
    /// Preferred polarity per variable when undecided
    polarity: Vec<bool>,
    /// Flag checked between decisions so a cancel takes effect at the
    /// next suspension-equivalent point
    cancelled: Option<std::sync::Arc<std::sync::atomic::AtomicBool>>,
}

impl Solver {
    #[must_use]
    pub fn new(num_vars: usize) -> Self {
        Self {
            num_vars,
            clauses: Vec::new(),
            occurrences: HashMap::new(),
            activity: vec![0; num_vars],
            polarity: vec![false; num_vars],
            cancelled: None,
        }
    }

    /// Install a cancellation flag
    pub fn with_cancel_flag(
        &mut self,
        flag: std::sync::Arc<std::sync::atomic::AtomicBool>,
    ) -> &mut Self {
        self.cancelled = Some(flag);
        self
    }

    /// Raise a variable's decision priority
    pub fn bump_activity(&mut self, var: Variable, amount: i64) {
        if let Some(slot) = self.activity.get_mut(var.index()) {
            *slot += amount;
        }
    }

    /// Set the polarity tried first for a variable
    pub fn set_polarity(&mut self, var: Variable, value: bool) {
        if let Some(slot) = self.polarity.get_mut(var.index()) {
            *slot = value;
        }
    }

    /// Add a clause. An empty clause makes the problem trivially UNSAT.
    pub fn add_clause(&mut self, clause: Clause) {
        let idx = self.clauses.len();
        for &lit in clause.literals() {
            self.occurrences.entry(lit).or_default().push(idx);
        }
        self.clauses.push(clause);
    }

    /// Solve. Deterministic for a fixed clause set and activity table.
    pub fn solve(&self) -> SatResult {
        if let Some(empty) = self.clauses.iter().find(|c| c.is_empty()) {
            return SatResult::Unsat(vec![empty.reason.clone()]);
        }

        let mut assignment = Assignment::new(self.num_vars);

        // Seed with unit clauses
        let mut queue: Vec<usize> = (0..self.clauses.len()).collect();

        loop {
            if let Some(flag) = &self.cancelled {
                if flag.load(std::sync::atomic::Ordering::Relaxed) {
                    return SatResult::Unsat(vec![Reason::Job("cancelled".into())]);
                }
            }

            // Propagate until fixpoint or conflict
            match self.propagate(&mut assignment, &mut queue) {
                Some(conflict_idx) => {
                    // Chronological backtrack: flip the latest decision
                    // and re-assert it as implied at the parent level
                    match assignment.backtrack() {
                        Some(decision) => {
                            let flipped = decision.negate();
                            assignment.assign(flipped);
                            queue = self.clauses_watching(flipped.variable());
                        }
                        None => {
                            let mut conflict_reasons =
                                vec![self.clauses[conflict_idx].reason.clone()];
                            conflict_reasons.extend(self.root_conflict_context(conflict_idx));
                            return SatResult::Unsat(conflict_reasons);
                        }
                    }
                }
                None => {
                    // Decide the next variable
                    match self.pick_branch(&assignment) {
                        Some(var) => {
                            let value = self.polarity[var.index()];
                            let lit = if value {
                                Literal::positive(var)
                            } else {
                                Literal::negative(var)
                            };
                            assignment.decide(lit);
                            queue = self.clauses_watching(var);
                        }
                        None => return SatResult::Sat(assignment),
                    }
                }
            }
        }
    }

    /// Unit propagation over the queued clause indices. Returns the
    /// index of a falsified clause on conflict.
    fn propagate(&self, assignment: &mut Assignment, queue: &mut Vec<usize>) -> Option<usize> {
        while let Some(idx) = queue.pop() {
            let clause = &self.clauses[idx];

            let mut unassigned = None;
            let mut satisfied = false;
            let mut unassigned_count = 0usize;

            for &lit in clause.literals() {
                match assignment.eval(lit) {
                    Some(true) => {
                        satisfied = true;
                        break;
                    }
                    Some(false) => {}
                    None => {
                        unassigned_count += 1;
                        unassigned = Some(lit);
                    }
                }
            }

            if satisfied {
                continue;
            }

            match (unassigned_count, unassigned) {
                (0, _) => return Some(idx),
                (1, Some(lit)) => {
                    assignment.assign(lit);
                    queue.extend(self.clauses_watching(lit.variable()));
                }
                _ => {}
            }
        }
        None
    }

    fn clauses_watching(&self, var: Variable) -> Vec<usize> {
        let mut out = Vec::new();
        for lit in [Literal::positive(var), Literal::negative(var)] {
            if let Some(indices) = self.occurrences.get(&lit) {
                out.extend_from_slice(indices);
            }
        }
        out
    }

    /// Highest-activity unassigned variable
    fn pick_branch(&self, assignment: &Assignment) -> Option<Variable> {
        #[allow(clippy::cast_possible_truncation)]
        (0..self.num_vars)
            .map(|i| Variable::new(i as u32))
            .filter(|v| assignment.value(*v).is_none())
            .max_by_key(|v| (self.activity[v.index()], std::cmp::Reverse(v.index())))
    }

    /// Additional reasons sharing variables with the root conflict, for
    /// a readable problem chain
    fn root_conflict_context(&self, conflict_idx: usize) -> Vec<Reason> {
        let conflict_vars: Vec<Variable> = self.clauses[conflict_idx]
            .literals()
            .iter()
            .map(|l| l.variable())
            .collect();

        let mut reasons = Vec::new();
        for clause in &self.clauses {
            if clause
                .literals()
                .iter()
                .any(|l| conflict_vars.contains(&l.variable()))
                && clause.reason != self.clauses[conflict_idx].reason
            {
                reasons.push(clause.reason.clone());
                if reasons.len() >= 4 {
                    break;
                }
            }
        }
        reasons
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(i: u32) -> Variable {
        Variable::new(i)
    }

    fn pos(i: u32) -> Literal {
        Literal::positive(var(i))
    }

    fn neg(i: u32) -> Literal {
        Literal::negative(var(i))
    }

    fn job(clause: Vec<Literal>) -> Clause {
        Clause::new(clause, Reason::Job("test".into())).unwrap()
    }

    #[test]
    fn trivially_sat() {
        let mut solver = Solver::new(2);
        solver.add_clause(job(vec![pos(0), pos(1)]));
        match solver.solve() {
            SatResult::Sat(model) => {
                assert!(model.value(var(0)) == Some(true) || model.value(var(1)) == Some(true));
            }
            SatResult::Unsat(_) => panic!("expected SAT"),
        }
    }

    #[test]
    fn unit_propagation_chains() {
        // 0 forced true; 0 -> 1; 1 -> 2
        let mut solver = Solver::new(3);
        solver.add_clause(job(vec![pos(0)]));
        solver.add_clause(job(vec![neg(0), pos(1)]));
        solver.add_clause(job(vec![neg(1), pos(2)]));
        match solver.solve() {
            SatResult::Sat(model) => {
                assert_eq!(model.value(var(2)), Some(true));
            }
            SatResult::Unsat(_) => panic!("expected SAT"),
        }
    }

    #[test]
    fn contradiction_is_unsat() {
        let mut solver = Solver::new(1);
        solver.add_clause(job(vec![pos(0)]));
        solver.add_clause(job(vec![neg(0)]));
        match solver.solve() {
            SatResult::Sat(_) => panic!("expected UNSAT"),
            SatResult::Unsat(reasons) => assert!(!reasons.is_empty()),
        }
    }

    #[test]
    fn backtracking_finds_the_needle() {
        // (0 | 1) & (!0 | 2) & (!2 | !1) & (1)
        // Forces 1, then !2, then !0... check consistency: 1 true;
        // (!2|!1) forces !2; (!0|2) forces !0; (0|1) satisfied by 1.
        let mut solver = Solver::new(3);
        solver.add_clause(job(vec![pos(0), pos(1)]));
        solver.add_clause(job(vec![neg(0), pos(2)]));
        solver.add_clause(job(vec![neg(2), neg(1)]));
        solver.add_clause(job(vec![pos(1)]));
        match solver.solve() {
            SatResult::Sat(model) => {
                assert_eq!(model.value(var(1)), Some(true));
                assert_eq!(model.value(var(2)), Some(false));
                assert_eq!(model.value(var(0)), Some(false));
            }
            SatResult::Unsat(_) => panic!("expected SAT"),
        }
    }

    #[test]
    fn polarity_hint_steers_the_model() {
        let mut solver = Solver::new(2);
        solver.add_clause(job(vec![pos(0), pos(1)]));
        solver.bump_activity(var(1), 10);
        solver.set_polarity(var(1), true);
        match solver.solve() {
            SatResult::Sat(model) => assert_eq!(model.value(var(1)), Some(true)),
            SatResult::Unsat(_) => panic!("expected SAT"),
        }
    }
}
