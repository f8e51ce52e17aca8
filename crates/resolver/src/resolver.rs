//! Resolution orchestration
//!
//! Builds the clause set from pool and jobs, detects open alternatives
//! before committing to one, runs the solver (retrying weak
//! dependencies greedily), and projects the model onto an ordered
//! transaction.

use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use urpm_errors::{Error, ResolverError};
use urpm_types::{Capability, Nevra};

use crate::jobs::{Job, ResolveOptions};
use crate::pool::{PackageId, Pool};
use crate::prefs;
use crate::rank::order_best_first;
use crate::sat::{Clause, Literal, Reason, SatResult, Solver, Variable};
use crate::transaction::{
    order_dependencies_first, order_dependents_first, Transaction, TransactionItem,
};

/// An unresolved alternative: a required capability with several
/// non-installed providers and nothing to pick one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoicePoint {
    pub capability: String,
    /// Candidate NEVRAs, ranked best-first
    pub candidates: Vec<String>,
    /// Requirement chain that led here
    pub reasons: Vec<String>,
}

/// Resolution result: either a concrete transaction or a choice the
/// front-end must make (re-enter with the pick added to preferences).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Outcome {
    Transaction(Transaction),
    Choice(ChoicePoint),
}

/// Dependency resolver over a built pool
pub struct Resolver {
    pool: Pool,
    options: ResolveOptions,
    cancel: Arc<AtomicBool>,
}

impl Resolver {
    #[must_use]
    pub fn new(pool: Pool, options: ResolveOptions) -> Self {
        Self {
            pool,
            options,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked between solver rounds
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    #[must_use]
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Resolve a job list into a transaction or a choice point.
    ///
    /// # Errors
    ///
    /// Returns structured `ResolverError` variants; never retries
    /// internally.
    pub fn resolve(&self, jobs: &[Job]) -> Result<Outcome, Error> {
        let mut skipped: Vec<(String, String)> = Vec::new();

        // Alternatives are surfaced before solving so the user's pick
        // can steer the model; the walk also yields the chain of
        // ranked-best providers to steer decisions toward
        let (choice, steered) = self.walk_alternatives(jobs)?;
        if let Some(choice) = choice {
            return Ok(Outcome::Choice(choice));
        }

        let mut solver = Solver::new(self.pool.len());
        solver.with_cancel_flag(Arc::clone(&self.cancel));

        self.encode_base(&mut solver, jobs);
        self.encode_jobs(&mut solver, jobs, &mut skipped)?;

        for id in &steered {
            let var = Variable::new(id.0);
            solver.bump_activity(var, 800);
            solver.set_polarity(var, true);
        }

        let model = match solver.solve() {
            SatResult::Sat(model) => model,
            SatResult::Unsat(reasons) => return Err(self.unsat_error(jobs, &reasons)),
        };

        // Weak dependencies: greedily keep each recommends clause that
        // stays satisfiable; drop the rest silently
        let model = if self.options.with_recommends {
            self.extend_with_recommends(jobs, &steered, &model)?
        } else {
            model
        };

        if self.cancel.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(ResolverError::Cancelled.into());
        }

        Ok(Outcome::Transaction(self.project(&model, skipped)))
    }

    // -- choice points ---------------------------------------------------

    /// Walk the dependency closure of the jobs. The first required
    /// capability with two or more equally-preferred non-installed
    /// providers becomes a choice point; otherwise the chain of
    /// ranked-best candidates is returned so the solver can be steered
    /// toward it.
    fn walk_alternatives(
        &self,
        jobs: &[Job],
    ) -> Result<(Option<ChoicePoint>, Vec<PackageId>), Error> {
        let mut visited: HashSet<PackageId> = HashSet::new();
        let mut frontier: Vec<(PackageId, Vec<String>)> = Vec::new();

        for job in jobs {
            if let Job::Install { spec } = job {
                let candidates = self.install_candidates(spec)?;
                if candidates.is_empty() {
                    continue; // already installed
                }
                if let Some(choice) =
                    self.open_choice(spec, &candidates, &[format!("requested: {spec}")])
                {
                    return Ok((Some(choice), Vec::new()));
                }
                if let Some(&best) = order_best_first(&self.pool, &candidates, &self.options)
                    .first()
                {
                    frontier.push((best, vec![format!("requested: {spec}")]));
                }
            }
        }

        let mut steered = Vec::new();
        while let Some((id, chain)) = frontier.pop() {
            if !visited.insert(id) {
                continue;
            }
            steered.push(id);
            let candidate = self.pool.get(id);
            for cap in &candidate.requires {
                // Satisfied by something installed: no choice to make
                let providers = self.pool.providers_of(cap);
                if providers
                    .iter()
                    .any(|p| self.pool.get(*p).is_installed())
                {
                    continue;
                }
                let mut chain = chain.clone();
                chain.push(format!("{} requires {cap}", candidate.nevra));
                if let Some(choice) = self.open_choice(&cap.to_string(), &providers, &chain) {
                    return Ok((Some(choice), Vec::new()));
                }
                if let Some(&best) =
                    order_best_first(&self.pool, &providers, &self.options).first()
                {
                    frontier.push((best, chain));
                }
            }
        }

        Ok((None, steered))
    }

    fn open_choice(
        &self,
        capability: &str,
        providers: &[PackageId],
        chain: &[String],
    ) -> Option<ChoicePoint> {
        let non_installed: Vec<PackageId> = providers
            .iter()
            .copied()
            .filter(|id| !self.pool.get(*id).is_installed())
            .collect();
        // Distinct names only: several versions of one name are ranked,
        // not chosen interactively
        let names: HashSet<&str> = non_installed
            .iter()
            .map(|id| self.pool.get(*id).nevra.name.as_str())
            .collect();
        if names.len() < 2 {
            return None;
        }

        let refs: Vec<&crate::pool::Candidate> =
            non_installed.iter().map(|id| self.pool.get(*id)).collect();
        if prefs::disambiguates(&self.options.preferences, &refs) {
            return None;
        }

        let ordered = order_best_first(&self.pool, &non_installed, &self.options);
        Some(ChoicePoint {
            capability: capability.to_string(),
            candidates: ordered
                .iter()
                .map(|id| self.pool.get(*id).nevra.to_string())
                .collect(),
            reasons: chain.to_vec(),
        })
    }

    // -- encoding --------------------------------------------------------

    #[allow(clippy::too_many_lines)]
    fn encode_base(&self, solver: &mut Solver, jobs: &[Job]) {
        let erase_names: HashSet<&str> = jobs
            .iter()
            .filter_map(|j| match j {
                Job::Erase { name } => Some(name.as_str()),
                _ => None,
            })
            .collect();

        for id in self.pool.ids() {
            let candidate = self.pool.get(id);
            let var = Variable::new(id.0);
            let me = candidate.nevra.to_string();

            if candidate.is_installed() {
                // Installed packages stay unless something removes them
                solver.set_polarity(var, true);
                solver.bump_activity(var, 1);

                if self.options.is_held(&candidate.nevra.name)
                    && !erase_names.contains(candidate.nevra.name.as_str())
                {
                    solver.add_clause(Clause::unit(
                        Literal::positive(var),
                        Reason::Held(candidate.nevra.name.clone()),
                    ));
                }
            } else {
                solver.set_polarity(var, false);

                if self.options.blacklist.contains(&candidate.nevra.name) {
                    solver.add_clause(Clause::unit(
                        Literal::negative(var),
                        Reason::Blacklisted(candidate.nevra.name.clone()),
                    ));
                    continue;
                }
            }

            if !self.options.nodeps {
                for cap in &candidate.requires {
                    let providers: Vec<PackageId> = self
                        .pool
                        .providers_of(cap)
                        .into_iter()
                        .filter(|p| *p != id)
                        .collect();

                    if providers.is_empty() {
                        if candidate.is_installed() || self.options.force {
                            // A broken installed set is tolerated, not
                            // repaired here
                            continue;
                        }
                        solver.add_clause(Clause::unit(
                            Literal::negative(var),
                            Reason::Requires {
                                package: me.clone(),
                                capability: cap.to_string(),
                            },
                        ));
                        continue;
                    }

                    let mut literals = vec![Literal::negative(var)];
                    literals.extend(
                        providers
                            .iter()
                            .map(|p| Literal::positive(Variable::new(p.0))),
                    );
                    if let Some(clause) = Clause::new(
                        literals,
                        Reason::Requires {
                            package: me.clone(),
                            capability: cap.to_string(),
                        },
                    ) {
                        solver.add_clause(clause);
                    }
                }
            }

            for cap in &candidate.conflicts {
                for other in self.pool.providers_of(cap) {
                    if other == id {
                        continue;
                    }
                    let them = self.pool.get(other).nevra.to_string();
                    if let Some(clause) = Clause::new(
                        vec![
                            Literal::negative(var),
                            Literal::negative(Variable::new(other.0)),
                        ],
                        Reason::Conflicts {
                            a: me.clone(),
                            b: them,
                        },
                    ) {
                        solver.add_clause(clause);
                    }
                }
            }

            for cap in &candidate.obsoletes {
                for other in self.pool.by_name(&cap.name) {
                    let other = *other;
                    if other == id {
                        continue;
                    }
                    let victim = self.pool.get(other);
                    let matches = cap.evr.is_none()
                        || cap.satisfies(&Capability::versioned(
                            victim.nevra.name.clone(),
                            urpm_types::CapOp::Eq,
                            victim.nevra.evr(),
                        ));
                    if !matches {
                        continue;
                    }

                    if victim.is_installed() && self.options.is_held(&victim.nevra.name) {
                        // A held package blocks its obsoleter entirely
                        solver.add_clause(Clause::unit(
                            Literal::negative(var),
                            Reason::Held(victim.nevra.name.clone()),
                        ));
                        continue;
                    }

                    if let Some(clause) = Clause::new(
                        vec![
                            Literal::negative(var),
                            Literal::negative(Variable::new(other.0)),
                        ],
                        Reason::Obsoletes {
                            winner: me.clone(),
                            loser: victim.nevra.to_string(),
                        },
                    ) {
                        solver.add_clause(clause);
                    }
                }
            }
        }

        // Single build per name, kernels exempt
        for id in self.pool.ids() {
            let candidate = self.pool.get(id);
            if candidate.nevra.name.starts_with("kernel") {
                continue;
            }
            for other in self.pool.by_name(&candidate.nevra.name) {
                let other = *other;
                if other.0 <= id.0 {
                    continue;
                }
                if let Some(clause) = Clause::new(
                    vec![
                        Literal::negative(Variable::new(id.0)),
                        Literal::negative(Variable::new(other.0)),
                    ],
                    Reason::SameName {
                        a: candidate.nevra.to_string(),
                        b: self.pool.get(other).nevra.to_string(),
                    },
                ) {
                    solver.add_clause(clause);
                }
            }
        }
    }

    fn encode_jobs(
        &self,
        solver: &mut Solver,
        jobs: &[Job],
        skipped: &mut Vec<(String, String)>,
    ) -> Result<(), Error> {
        for job in jobs {
            match job {
                Job::Install { spec } => {
                    let candidates = self.install_candidates(spec)?;
                    if candidates.is_empty() {
                        skipped.push((spec.clone(), "already installed".to_string()));
                        continue;
                    }
                    let literals: Vec<Literal> = candidates
                        .iter()
                        .map(|id| Literal::positive(Variable::new(id.0)))
                        .collect();
                    if let Some(clause) = Clause::new(literals, Reason::Job(job.to_string())) {
                        solver.add_clause(clause);
                    }
                    // Steer the model toward the ranked best
                    let ordered = order_best_first(&self.pool, &candidates, &self.options);
                    for (i, id) in ordered.iter().enumerate() {
                        let var = Variable::new(id.0);
                        #[allow(clippy::cast_possible_wrap)]
                        solver.bump_activity(var, 1000 - (i as i64 * 10));
                        if i == 0 {
                            solver.set_polarity(var, true);
                        }
                    }
                }
                Job::Erase { name } => {
                    let Some(installed) = self.pool.installed_of(name) else {
                        return Err(ResolverError::UnknownPackage { name: name.clone() }.into());
                    };
                    solver.add_clause(Clause::unit(
                        Literal::negative(Variable::new(installed.0)),
                        Reason::Erase(name.clone()),
                    ));
                }
                Job::Upgrade { name: Some(name) } => {
                    self.encode_upgrade_one(solver, name, skipped, false)?;
                }
                Job::Upgrade { name: None } => {
                    let names = self.installed_names();
                    for name in names {
                        self.encode_upgrade_one(solver, &name, skipped, false)?;
                    }
                }
                Job::DistUpgrade => {
                    let names = self.installed_names();
                    for name in names {
                        self.encode_upgrade_one(solver, &name, skipped, true)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn encode_upgrade_one(
        &self,
        solver: &mut Solver,
        name: &str,
        skipped: &mut Vec<(String, String)>,
        follow_catalog: bool,
    ) -> Result<(), Error> {
        let Some(installed_id) = self.pool.installed_of(name) else {
            return Err(ResolverError::UnknownPackage {
                name: name.to_string(),
            }
            .into());
        };
        let installed_evr = self.pool.get(installed_id).nevra.evr();

        if self.options.is_held(name) {
            let reason = self
                .options
                .held
                .get(name)
                .and_then(Clone::clone)
                .unwrap_or_else(|| "held".to_string());
            skipped.push((name.to_string(), format!("held: {reason}")));
            return Ok(());
        }

        let newer: Vec<PackageId> = self
            .pool
            .by_name(name)
            .iter()
            .copied()
            .filter(|id| !self.pool.get(*id).is_installed())
            .filter(|id| {
                follow_catalog
                    || self.options.allow_downgrade
                    || self.pool.get(*id).nevra.evr() > installed_evr
            })
            .collect();

        let Some(&best) = order_best_first(&self.pool, &newer, &self.options).first() else {
            return Ok(()); // nothing newer; no-op
        };

        // "Some build of this name survives"; preference toward the new
        // build, same-name exclusivity does the displacement
        let clause = Clause::new(
            vec![
                Literal::positive(Variable::new(best.0)),
                Literal::positive(Variable::new(installed_id.0)),
            ],
            Reason::Job(format!("upgrade {name}")),
        );
        if let Some(clause) = clause {
            solver.add_clause(clause);
        }
        let best_var = Variable::new(best.0);
        solver.bump_activity(best_var, 500);
        solver.set_polarity(best_var, true);

        Ok(())
    }

    // -- weak dependencies -----------------------------------------------

    fn extend_with_recommends(
        &self,
        jobs: &[Job],
        steered: &[PackageId],
        base_model: &crate::sat::Assignment,
    ) -> Result<crate::sat::Assignment, Error> {
        let selected = self.selected_ids(base_model);

        // Gather recommends of everything selected, satisfiable only
        let mut soft: Vec<(PackageId, Capability)> = Vec::new();
        for &id in &selected {
            let candidate = self.pool.get(id);
            for cap in &candidate.recommends {
                let providers = self.pool.providers_of(cap);
                if providers.is_empty() {
                    continue;
                }
                if providers
                    .iter()
                    .any(|p| base_model.value(Variable::new(p.0)) == Some(true))
                {
                    continue; // already satisfied
                }
                soft.push((id, cap.clone()));
            }
        }

        if soft.is_empty() {
            return Ok(base_model.clone());
        }

        // Greedy: keep each recommends clause that stays satisfiable
        let mut kept: Vec<(PackageId, Capability)> = Vec::new();
        let mut best_model = base_model.clone();

        for (id, cap) in soft {
            let mut solver = Solver::new(self.pool.len());
            solver.with_cancel_flag(Arc::clone(&self.cancel));
            let mut throwaway = Vec::new();
            self.encode_base(&mut solver, jobs);
            self.encode_jobs(&mut solver, jobs, &mut throwaway)?;
            for steered_id in steered {
                let var = Variable::new(steered_id.0);
                solver.bump_activity(var, 800);
                solver.set_polarity(var, true);
            }

            for (prev_id, prev_cap) in kept.iter().chain(std::iter::once(&(id, cap.clone()))) {
                let providers = self.pool.providers_of(prev_cap);
                let mut literals = vec![Literal::negative(Variable::new(prev_id.0))];
                literals.extend(
                    providers
                        .iter()
                        .map(|p| Literal::positive(Variable::new(p.0))),
                );
                if let Some(clause) = Clause::new(
                    literals,
                    Reason::Recommends {
                        package: self.pool.get(*prev_id).nevra.to_string(),
                        capability: prev_cap.to_string(),
                    },
                ) {
                    solver.add_clause(clause);
                }
            }

            match solver.solve() {
                SatResult::Sat(model) => {
                    kept.push((id, cap));
                    best_model = model;
                }
                SatResult::Unsat(_) => {
                    // Dropped silently by contract
                    debug!(capability = %cap, "recommends dropped (would conflict)");
                }
            }
        }

        Ok(best_model)
    }

    // -- projection ------------------------------------------------------

    fn selected_ids(&self, model: &crate::sat::Assignment) -> Vec<PackageId> {
        model
            .true_variables()
            .into_iter()
            .map(|v| PackageId(v.0))
            .collect()
    }

    fn project(
        &self,
        model: &crate::sat::Assignment,
        mut skipped: Vec<(String, String)>,
    ) -> Transaction {
        skipped.sort();
        skipped.dedup_by(|a, b| a.0 == b.0);
        let mut installs: Vec<PackageId> = Vec::new();
        let mut upgrades: Vec<PackageId> = Vec::new();
        let mut erases: Vec<PackageId> = Vec::new();

        for id in self.pool.ids() {
            let candidate = self.pool.get(id);
            let value = model.value(Variable::new(id.0));
            if candidate.is_installed() {
                if value == Some(false) {
                    erases.push(id);
                }
            } else if value == Some(true) {
                if self.pool.installed_of(&candidate.nevra.name).is_some() {
                    upgrades.push(id);
                } else {
                    installs.push(id);
                }
            }
        }

        // An upgrade's displaced build is implied, not listed as erase
        let upgraded_names: HashSet<&str> = upgrades
            .iter()
            .map(|id| self.pool.get(*id).nevra.name.as_str())
            .collect();
        erases.retain(|id| !upgraded_names.contains(self.pool.get(*id).nevra.name.as_str()));

        let item = |id: &PackageId| {
            let c = self.pool.get(*id);
            TransactionItem {
                nevra: c.nevra.clone(),
                media_id: match c.origin {
                    crate::pool::Origin::Media { media_id, .. } => Some(media_id),
                    crate::pool::Origin::Installed => None,
                },
                digest: c.digest.clone(),
                file_size: c.file_size,
            }
        };

        Transaction {
            to_install: order_dependencies_first(&self.pool, &installs)
                .iter()
                .map(item)
                .collect(),
            to_upgrade: order_dependencies_first(&self.pool, &upgrades)
                .iter()
                .map(item)
                .collect(),
            to_erase: order_dependents_first(&self.pool, &erases)
                .iter()
                .map(|id| self.pool.get(*id).nevra.clone())
                .collect(),
            skipped,
        }
    }

    // -- helpers ---------------------------------------------------------

    /// Candidates matching an install spec: exact name, then capability
    /// or file-path providers.
    fn install_candidates(&self, spec: &str) -> Result<Vec<PackageId>, Error> {
        let cap = Capability::parse(spec);

        let by_name: Vec<PackageId> = self
            .pool
            .by_name(&cap.name)
            .iter()
            .copied()
            .filter(|id| !self.pool.get(*id).is_installed())
            .collect();
        if !by_name.is_empty() {
            if self.options.blacklist.contains(&cap.name) {
                return Err(ResolverError::Blacklisted {
                    name: cap.name.clone(),
                }
                .into());
            }
            return Ok(by_name);
        }

        // The name exists but only as the installed build: no-op install
        if self.pool.installed_of(&cap.name).is_some() {
            return Ok(Vec::new());
        }

        let providers: Vec<PackageId> = self
            .pool
            .providers_of(&cap)
            .into_iter()
            .filter(|id| !self.pool.get(*id).is_installed())
            .filter(|id| {
                !self
                    .options
                    .blacklist
                    .contains(&self.pool.get(*id).nevra.name)
            })
            .collect();
        if providers.is_empty() {
            if cap.name.starts_with('/') || cap.evr.is_some() {
                return Err(ResolverError::NoProvider {
                    capability: spec.to_string(),
                }
                .into());
            }
            return Err(ResolverError::UnknownPackage {
                name: spec.to_string(),
            }
            .into());
        }
        Ok(providers)
    }

    fn installed_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .pool
            .ids()
            .filter(|id| self.pool.get(*id).is_installed())
            .map(|id| self.pool.get(id).nevra.name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn unsat_error(&self, jobs: &[Job], reasons: &[Reason]) -> Error {
        let conflicting: Vec<String> = reasons
            .iter()
            .filter_map(|r| match r {
                Reason::Conflicts { a, b } | Reason::SameName { a, b } => {
                    Some(vec![a.clone(), b.clone()])
                }
                _ => None,
            })
            .flatten()
            .collect();
        if !conflicting.is_empty() {
            return ResolverError::Conflicting {
                packages: conflicting,
            }
            .into();
        }

        if let Some(Reason::Held(name)) = reasons
            .iter()
            .find(|r| matches!(r, Reason::Held(_)))
        {
            let by = reasons
                .iter()
                .find_map(|r| match r {
                    Reason::Obsoletes { winner, .. } => Some(winner.clone()),
                    _ => None,
                })
                .unwrap_or_else(|| "requested change".to_string());
            return ResolverError::HeldObsoleted {
                package: name.clone(),
                by,
            }
            .into();
        }

        let job = jobs
            .first()
            .map_or_else(|| "resolution".to_string(), ToString::to_string);
        ResolverError::Unsatisfiable {
            job,
            chain: reasons.iter().map(ToString::to_string).collect(),
        }
        .into()
    }
}

/// Convenience: resolve and auto-answer every choice point with its
/// first candidate (non-interactive mode).
///
/// # Errors
///
/// Propagates resolver failures. Converges because each answered choice
/// strictly reduces the open-choice set.
pub fn resolve_auto(
    pool_builder: impl Fn() -> Pool,
    mut options: ResolveOptions,
    jobs: &[Job],
) -> Result<Transaction, Error> {
    loop {
        let resolver = Resolver::new(pool_builder(), options.clone());
        match resolver.resolve(jobs)? {
            Outcome::Transaction(tx) => return Ok(tx),
            Outcome::Choice(choice) => {
                let Some(first) = choice.candidates.first() else {
                    return Err(ResolverError::NoProvider {
                        capability: choice.capability,
                    }
                    .into());
                };
                let name = Nevra::parse(first).name;
                options
                    .preferences
                    .push(crate::prefs::Preference::Favor(name));
            }
        }
    }
}
