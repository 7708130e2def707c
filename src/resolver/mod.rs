//! The resolver: turn targets into an ordered plan of decisions and
//! jobs.
//!
//! The resolver maintains a map from [`Resolvent`] to its constraints
//! and decision. Targets seed resolvents; deciding a resolvent pulls in
//! its dependencies as further constraints; a constraint that arrives
//! too late to influence an already-made decision triggers a bounded
//! restart with the constraint preloaded. Decisions are then ordered by
//! dependency arrows and linearised into fetch/install/uninstall jobs.
//!
//! Inability to decide is data, not an error: it flows into
//! [`Resolved`] alongside the plan.

mod constraint;
mod decider;
mod decision;
mod jobs;
mod orderer;
mod reason;
mod resolvent;

pub use constraint::{effective_use_existing, Constraint, ConstraintSpec, UseExisting};
pub use decision::{ChosenDestination, Decision, UnsuitableCandidate};
pub use jobs::{
    ExecuteJob, FetchJob, InstallJob, JobLists, JobRequirement, JobRequirementFlags, PretendJob,
    UninstallJob,
};
pub use reason::Reason;
pub use resolvent::{DestinationType, Resolvent};

use std::collections::{BTreeSet, VecDeque};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::error::{CinderError, Result};
use crate::resolver::decider::{choose_any_alternative, decide, installed_ids};
use crate::resolver::orderer::{order, OrderArrow};
use crate::selection::match_package;
use crate::spectree::{
    flatten, sanitise_dependencies, DependenciesLabel, SanitisedDependency, SanitisedSpec, SetLeaf,
};
use crate::types::choices::Choices;
use crate::types::name::{QualifiedPackageName, SetName};
use crate::types::package::PackageId;
use crate::types::spec::{BlockDepSpec, PackageDepSpec, SlotRequirement};

/// How the resolver treats suggestion/recommendation dependencies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuggestionsPolicy {
    /// Skip them entirely.
    #[default]
    Ignore,
    /// Resolve them but mark the decisions untaken.
    Untaken,
    /// Resolve and take them.
    Take,
}

/// The policy knobs a driver supplies to one resolver run.
#[derive(Clone, Debug)]
pub struct ResolverPolicy {
    /// `use_existing` applied to target constraints.
    pub use_existing_for_targets: UseExisting,
    /// `use_existing` applied to dependency constraints.
    pub use_existing_for_dependencies: UseExisting,
    /// Installed packages the resolver may remove when they stand in the
    /// way (dependents of removed packages, blocked packages).
    pub allowed_to_remove: Vec<PackageDepSpec>,
    /// Installed dependents of removed packages to remove along.
    pub remove_if_dependent: Vec<PackageDepSpec>,
    /// Installed packages to purge once nothing outside the removal set
    /// uses them.
    pub purge: Vec<PackageDepSpec>,
    /// Preferred alternatives in any-groups.
    pub prefer: Vec<PackageDepSpec>,
    /// Avoided alternatives in any-groups.
    pub avoid: Vec<PackageDepSpec>,
    /// How suggestions are treated.
    pub suggestions: SuggestionsPolicy,
    /// Whether downgrades require confirmation.
    pub confirm_downgrades: bool,
    /// Destination for new installs.
    pub destination: DestinationType,
    /// Restart bound; exceeding it is an error.
    pub max_restarts: u32,
}

impl Default for ResolverPolicy {
    fn default() -> Self {
        Self {
            use_existing_for_targets: UseExisting::Never,
            use_existing_for_dependencies: UseExisting::IfSame,
            allowed_to_remove: Vec::new(),
            remove_if_dependent: Vec::new(),
            purge: Vec::new(),
            prefer: Vec::new(),
            avoid: Vec::new(),
            suggestions: SuggestionsPolicy::default(),
            confirm_downgrades: true,
            destination: DestinationType::InstallToSlash,
            max_restarts: 9,
        }
    }
}

/// One resolvent's state: its constraints and (eventually) decision.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Resolution {
    /// The resolvent.
    pub resolvent: Resolvent,
    /// The composed constraints.
    pub constraints: Vec<Constraint>,
    /// The decision, once made.
    pub decision: Option<Decision>,
}

/// The outcome of a resolver run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Resolved {
    /// Taken change/remove decisions, in execution order.
    pub taken_change_or_remove_decisions: Vec<Resolution>,
    /// Change/remove decisions that will not be executed.
    pub untaken_change_or_remove_decisions: Vec<Resolution>,
    /// Taken resolvents the resolver could not decide.
    pub taken_unable_to_make_decisions: Vec<Resolution>,
    /// Untaken resolvents the resolver could not decide.
    pub untaken_unable_to_make_decisions: Vec<Resolution>,
    /// Taken decisions awaiting user confirmation.
    pub taken_unconfirmed_decisions: Vec<Resolution>,
    /// Taken decisions stuck on a strict dependency cycle, with the
    /// cycle text.
    pub taken_unorderable_decisions: Vec<(Resolution, String)>,
    /// The linearised plan.
    pub job_lists: JobLists,
}

/// A resolver run in progress.
pub struct Resolver<'e> {
    env: &'e Environment,
    policy: ResolverPolicy,
    targets: Vec<Target>,
}

#[derive(Clone, Debug)]
enum Target {
    Spec { spec: PackageDepSpec, text: String },
    Set { name: SetName },
    Remove { spec: PackageDepSpec, text: String },
}

#[derive(Clone, Debug, Default)]
struct ResolutionState {
    constraints: Vec<Constraint>,
    decision: Option<Decision>,
}

#[derive(Debug, Default)]
struct State {
    resolutions: IndexMap<Resolvent, ResolutionState>,
    queue: VecDeque<Resolvent>,
}

/// Internal control flow: a fatal error, or a restart request carrying
/// the constraint to preload. Restart never escapes [`Resolver::resolve`].
enum StepError {
    Restart { resolvent: Resolvent, constraint: Constraint },
    Fatal(CinderError),
}

impl From<CinderError> for StepError {
    fn from(e: CinderError) -> Self {
        Self::Fatal(e)
    }
}

type StepResult<T> = std::result::Result<T, StepError>;

impl<'e> Resolver<'e> {
    /// A resolver with default policy.
    #[must_use]
    pub fn new(env: &'e Environment) -> Self {
        Self::with_policy(env, ResolverPolicy::default())
    }

    /// A resolver with an explicit policy.
    #[must_use]
    pub const fn with_policy(env: &'e Environment, policy: ResolverPolicy) -> Self {
        Self {
            env,
            policy,
            targets: Vec::new(),
        }
    }

    /// The policy in use.
    #[must_use]
    pub const fn policy(&self) -> &ResolverPolicy {
        &self.policy
    }

    /// Add an install target.
    pub fn add_target(&mut self, spec: PackageDepSpec) {
        let text = spec.to_string();
        self.targets.push(Target::Spec { spec, text });
    }

    /// Add a named-set target.
    pub fn add_target_set(&mut self, name: SetName) {
        self.targets.push(Target::Set { name });
    }

    /// Add an uninstall target: installed ids matching the spec are to
    /// be removed.
    pub fn add_uninstall_target(&mut self, spec: PackageDepSpec) {
        let text = format!("!{spec}");
        self.targets.push(Target::Remove { spec, text });
    }

    /// What: Run the resolution algorithm.
    ///
    /// Output:
    /// - The ordered decisions and job lists. Inability to decide a
    ///   resolvent is reported inside [`Resolved`], not as an error.
    ///
    /// Details:
    /// - A restart request re-runs the main loop with the offending
    ///   constraint preloaded; more than `max_restarts` restarts is a
    ///   [`CinderError::TooManyRestarts`].
    pub fn resolve(&self) -> Result<Resolved> {
        let mut preload: IndexMap<Resolvent, Vec<Constraint>> = IndexMap::new();
        for attempt in 0..=self.policy.max_restarts {
            match self.run_once(&preload) {
                Ok(state) => return self.finalise(state),
                Err(StepError::Fatal(e)) => return Err(e),
                Err(StepError::Restart { resolvent, constraint }) => {
                    tracing::debug!(
                        "restart {} for {resolvent} with constraint {}",
                        attempt + 1,
                        constraint.spec
                    );
                    let preset = Constraint {
                        reason: Reason::Preset {
                            explanation: format!("restarted for {}", constraint.spec),
                            inner: Some(Box::new(constraint.reason.clone())),
                        },
                        ..constraint
                    };
                    preload.entry(resolvent).or_default().push(preset);
                }
            }
        }
        Err(CinderError::TooManyRestarts {
            limit: self.policy.max_restarts,
        })
    }

    fn run_once(&self, preload: &IndexMap<Resolvent, Vec<Constraint>>) -> StepResult<State> {
        let mut state = State::default();

        for (resolvent, constraints) in preload {
            for constraint in constraints {
                self.add_constraint(&mut state, resolvent.clone(), constraint.clone())?;
            }
        }
        self.seed_targets(&mut state)?;

        while let Some(resolvent) = state.queue.pop_front() {
            let already_decided = state
                .resolutions
                .get(&resolvent)
                .is_some_and(|r| r.decision.is_some());
            if already_decided {
                continue;
            }
            let constraints = state
                .resolutions
                .get(&resolvent)
                .map(|r| r.constraints.clone())
                .unwrap_or_default();
            let decision = decide(self.env, &self.policy, &resolvent, &constraints);
            tracing::debug!("decided {resolvent}: {decision}");
            if let Some(entry) = state.resolutions.get_mut(&resolvent) {
                entry.decision = Some(decision.clone());
            }
            self.process_consequences(&mut state, &resolvent, &decision)?;
        }

        Ok(state)
    }

    fn seed_targets(&self, state: &mut State) -> StepResult<()> {
        for target in &self.targets {
            match target {
                Target::Spec { spec, text } => {
                    self.seed_spec_target(state, spec, Reason::target(text.clone()))?;
                }
                Target::Set { name } => {
                    let mut visited = BTreeSet::new();
                    self.seed_set_target(state, name, &mut visited)?;
                }
                Target::Remove { spec, text } => {
                    self.seed_remove_target(state, spec, text)?;
                }
            }
        }
        Ok(())
    }

    fn seed_spec_target(
        &self,
        state: &mut State,
        spec: &PackageDepSpec,
        reason: Reason,
    ) -> StepResult<()> {
        for name in self.target_names(spec)? {
            let resolvent = self.resolvent_for(&name, spec);
            let constraint = Constraint {
                spec: ConstraintSpec::Package(spec.clone()),
                nothing_is_fine_too: false,
                use_existing: self.policy.use_existing_for_targets,
                to_destination: self.policy.destination,
                taken: true,
                reason: reason.clone(),
            };
            self.add_constraint(state, resolvent, constraint)?;
        }
        Ok(())
    }

    fn seed_set_target(
        &self,
        state: &mut State,
        name: &SetName,
        visited: &mut BTreeSet<SetName>,
    ) -> StepResult<()> {
        if !visited.insert(name.clone()) {
            return Ok(());
        }
        let tree = self.env.set(name)?;
        let choices = Choices::default();
        for leaf in flatten(&tree, &choices, None) {
            match leaf {
                SetLeaf::Package(spec) => {
                    let reason = Reason::Set {
                        set: name.clone(),
                        inner: Box::new(Reason::target(format!("@{name}"))),
                    };
                    self.seed_spec_target(state, spec, reason)?;
                }
                SetLeaf::Set(nested) => {
                    self.seed_set_target(state, nested, visited)?;
                }
            }
        }
        Ok(())
    }

    fn seed_remove_target(
        &self,
        state: &mut State,
        spec: &PackageDepSpec,
        text: &str,
    ) -> StepResult<()> {
        let block = BlockDepSpec {
            blocked: spec.clone(),
            strong: false,
        };
        let mut resolvents: Vec<Resolvent> = Vec::new();
        for repo in self.env.installed_repositories() {
            for name in self.target_names(spec)? {
                for id in repo.package_ids(&name) {
                    if match_package(self.env, spec, &id) {
                        let resolvent = Resolvent::for_id(&id, self.policy.destination);
                        if !resolvents.contains(&resolvent) {
                            resolvents.push(resolvent);
                        }
                    }
                }
            }
        }
        if resolvents.is_empty() {
            // Nothing installed matches; still record the decision.
            if let Some(name) = spec.package_name() {
                resolvents.push(Resolvent {
                    name: name.clone(),
                    slot: None,
                    destination: self.policy.destination,
                });
            }
        }
        for resolvent in resolvents {
            let constraint = Constraint {
                spec: ConstraintSpec::Block(block.clone()),
                nothing_is_fine_too: true,
                use_existing: UseExisting::IfPossible,
                to_destination: self.policy.destination,
                taken: true,
                reason: Reason::target(text),
            };
            self.add_constraint(state, resolvent, constraint)?;
        }
        Ok(())
    }

    /// Exact names covered by a target spec, expanding wildcards through
    /// the repositories.
    fn target_names(&self, spec: &PackageDepSpec) -> StepResult<Vec<QualifiedPackageName>> {
        if let Some(name) = spec.package_name() {
            return Ok(vec![name.clone()]);
        }
        let mut names = Vec::new();
        for repo in self.env.repositories() {
            for category in repo.category_names() {
                for name in repo.package_names(&category) {
                    if spec.name_constraint().matches(&name) && !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
        }
        Ok(names)
    }

    fn resolvent_for(&self, name: &QualifiedPackageName, spec: &PackageDepSpec) -> Resolvent {
        let slot = match spec.slot_requirement() {
            Some(SlotRequirement::Exact(slot)) => Some(slot.clone()),
            _ => None,
        };
        Resolvent {
            name: name.clone(),
            slot,
            destination: self.policy.destination,
        }
    }

    /// What: Add a constraint, detecting invalidated decisions.
    ///
    /// Details:
    /// - A constraint arriving after its resolvent was decided, which
    ///   the decision does not satisfy, raises a restart request with
    ///   the constraint preloaded for the next run.
    fn add_constraint(
        &self,
        state: &mut State,
        resolvent: Resolvent,
        constraint: Constraint,
    ) -> StepResult<()> {
        let entry = state.resolutions.entry(resolvent.clone()).or_default();
        entry.constraints.push(constraint.clone());
        match &entry.decision {
            Some(decision) => {
                if !self.decision_satisfies(&resolvent, decision, &constraint) {
                    return Err(StepError::Restart { resolvent, constraint });
                }
            }
            None => {
                if !state.queue.contains(&resolvent) {
                    state.queue.push_back(resolvent);
                }
            }
        }
        Ok(())
    }

    fn decision_satisfies(
        &self,
        resolvent: &Resolvent,
        decision: &Decision,
        constraint: &Constraint,
    ) -> bool {
        match decision {
            Decision::ChangesToMake { origin, .. } => constraint.allows_id(self.env, origin),
            Decision::ExistingNoChange { existing, .. } => {
                constraint.use_existing != UseExisting::Never
                    && constraint.allows_id(self.env, existing)
            }
            Decision::NothingNoChange { .. } => {
                if constraint.spec.is_block() {
                    installed_ids(self.env, resolvent)
                        .iter()
                        .all(|id| constraint.allows_id(self.env, id))
                } else {
                    constraint.nothing_is_fine_too
                }
            }
            Decision::Remove { .. } | Decision::Break { .. } => constraint.spec.is_block(),
            Decision::Unable { .. } => true,
        }
    }

    fn process_consequences(
        &self,
        state: &mut State,
        resolvent: &Resolvent,
        decision: &Decision,
    ) -> StepResult<()> {
        match decision {
            Decision::ChangesToMake { origin, taken, .. } => {
                self.process_dependencies(state, resolvent, origin, *taken)
            }
            Decision::ExistingNoChange { existing, taken, .. } => {
                self.process_dependencies(state, resolvent, existing, *taken)
            }
            Decision::Remove { ids, .. } => self.process_removal(state, ids),
            _ => Ok(()),
        }
    }

    /// Collect an id's sanitised dependencies across its dependency
    /// keys, each with that key's initial label context.
    fn sanitised_dependencies_of(&self, id: &PackageId) -> Vec<SanitisedDependency> {
        let choices = self.env.effective_choices(id).unwrap_or_default();
        let mut deps = Vec::new();
        let keys: [(_, &[DependenciesLabel]); 5] = [
            (id.dependencies_key(), &[DependenciesLabel::Build, DependenciesLabel::Run]),
            (id.build_dependencies_key(), &[DependenciesLabel::Build]),
            (id.run_dependencies_key(), &[DependenciesLabel::Run]),
            (id.post_dependencies_key(), &[DependenciesLabel::Post]),
            (id.suggested_dependencies_key(), &[DependenciesLabel::Suggestion]),
        ];
        for (tree, labels) in keys {
            if let Some(tree) = tree {
                deps.extend(sanitise_dependencies(tree, &choices, None, labels));
            }
        }
        deps
    }

    fn process_dependencies(
        &self,
        state: &mut State,
        from_resolvent: &Resolvent,
        id: &PackageId,
        taken: bool,
    ) -> StepResult<()> {
        for dep in self.sanitised_dependencies_of(id) {
            let taken_here = if dep.is_optional() {
                match self.policy.suggestions {
                    SuggestionsPolicy::Ignore => continue,
                    SuggestionsPolicy::Untaken => false,
                    SuggestionsPolicy::Take => taken,
                }
            } else {
                taken
            };

            match &dep.spec {
                SanitisedSpec::Package(spec) => {
                    self.add_dependency_constraint(
                        state,
                        from_resolvent,
                        id,
                        &dep,
                        spec,
                        taken_here,
                    )?;
                }
                SanitisedSpec::Block(block) => {
                    self.add_block_constraint(state, from_resolvent, id, &dep, block, taken_here)?;
                }
                SanitisedSpec::NamedSet(set) => {
                    let tree = self.env.set(set)?;
                    for leaf in flatten(&tree, &Choices::default(), None) {
                        if let SetLeaf::Package(spec) = leaf {
                            self.add_dependency_constraint(
                                state,
                                from_resolvent,
                                id,
                                &dep,
                                spec,
                                taken_here,
                            )?;
                        }
                    }
                }
                SanitisedSpec::Any { alternatives, .. } => {
                    let chosen = {
                        let would_install = |name: &QualifiedPackageName| {
                            state.resolutions.iter().any(|(r, entry)| {
                                r.name == *name
                                    && entry
                                        .decision
                                        .as_ref()
                                        .is_some_and(|d| matches!(d, Decision::ChangesToMake { .. }))
                            })
                        };
                        choose_any_alternative(self.env, &self.policy, alternatives, &would_install)
                            .map(|index| alternatives[index].specs.clone())
                    };
                    for spec in chosen.unwrap_or_default() {
                        self.add_dependency_constraint(
                            state,
                            from_resolvent,
                            id,
                            &dep,
                            &spec,
                            taken_here,
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    fn add_dependency_constraint(
        &self,
        state: &mut State,
        from_resolvent: &Resolvent,
        from_id: &PackageId,
        dep: &SanitisedDependency,
        spec: &PackageDepSpec,
        taken: bool,
    ) -> StepResult<()> {
        let Some(name) = spec.package_name() else {
            tracing::debug!("ignoring wildcard dependency {spec} of {from_id}");
            return Ok(());
        };
        let resolvent = self.resolvent_for(name, spec);
        let already_met = installed_ids(self.env, &resolvent)
            .iter()
            .any(|installed| match_package(self.env, spec, installed));
        let constraint = Constraint {
            spec: ConstraintSpec::Package(spec.clone()),
            nothing_is_fine_too: false,
            use_existing: self.policy.use_existing_for_dependencies,
            to_destination: from_resolvent.destination,
            taken,
            reason: Reason::Dependency {
                from_id: from_id.clone(),
                from_resolvent: from_resolvent.clone(),
                dependency: dep.clone(),
                already_met,
            },
        };
        self.add_constraint(state, resolvent, constraint)
    }

    fn add_block_constraint(
        &self,
        state: &mut State,
        from_resolvent: &Resolvent,
        from_id: &PackageId,
        dep: &SanitisedDependency,
        block: &BlockDepSpec,
        taken: bool,
    ) -> StepResult<()> {
        let Some(name) = block.blocked.package_name() else {
            tracing::debug!("ignoring wildcard block {block} of {from_id}");
            return Ok(());
        };
        let resolvent = self.resolvent_for(name, &block.blocked);
        let constraint = Constraint {
            spec: ConstraintSpec::Block(block.clone()),
            nothing_is_fine_too: true,
            use_existing: UseExisting::IfPossible,
            to_destination: from_resolvent.destination,
            taken,
            reason: Reason::Dependency {
                from_id: from_id.clone(),
                from_resolvent: from_resolvent.clone(),
                dependency: dep.clone(),
                already_met: false,
            },
        };
        self.add_constraint(state, resolvent, constraint)
    }

    /// Removal consequences: pull in dependents the policy says to
    /// remove, and purge installed packages only the removed set was
    /// using.
    fn process_removal(&self, state: &mut State, removed: &[PackageId]) -> StepResult<()> {
        let all_installed: Vec<PackageId> = self
            .env
            .installed_repositories()
            .iter()
            .flat_map(|repo| {
                repo.category_names().into_iter().flat_map(|c| {
                    repo.package_names(&c)
                        .into_iter()
                        .flat_map(|q| repo.package_ids(&q))
                })
            })
            .collect();

        let being_removed = |state: &State, id: &PackageId| {
            state.resolutions.iter().any(|(resolvent, entry)| {
                resolvent.covers(id) && entry.constraints.iter().any(|c| c.spec.is_block())
            })
        };

        // Dependents of the removed ids.
        for dependent in &all_installed {
            if being_removed(state, dependent) {
                continue;
            }
            let depended: Vec<&PackageId> = removed
                .iter()
                .filter(|gone| self.depends_on(dependent, gone))
                .collect();
            let Some(gone) = depended.first() else {
                continue;
            };
            if self
                .policy
                .remove_if_dependent
                .iter()
                .any(|spec| match_package(self.env, spec, dependent))
            {
                let resolvent = Resolvent::for_id(dependent, self.policy.destination);
                let constraint = Constraint {
                    spec: ConstraintSpec::Block(BlockDepSpec {
                        blocked: dependent.uniquely_identifying_spec(),
                        strong: false,
                    }),
                    nothing_is_fine_too: true,
                    use_existing: UseExisting::IfPossible,
                    to_destination: self.policy.destination,
                    taken: true,
                    reason: Reason::Dependent {
                        id_being_removed: (*gone).clone(),
                    },
                };
                self.add_constraint(state, resolvent, constraint)?;
            }
        }

        // Purges: installed ids matching a purge spec whose remaining
        // dependents are all in the removal set.
        for candidate in &all_installed {
            if being_removed(state, candidate) {
                continue;
            }
            let purgeable = self
                .policy
                .purge
                .iter()
                .any(|spec| match_package(self.env, spec, candidate));
            if !purgeable {
                continue;
            }
            let users: Vec<PackageId> = removed
                .iter()
                .filter(|gone| self.depends_on(gone, candidate))
                .cloned()
                .collect();
            if users.is_empty() {
                continue;
            }
            let still_needed = all_installed.iter().any(|other| {
                other != candidate
                    && !being_removed(state, other)
                    && self.depends_on(other, candidate)
            });
            if still_needed {
                continue;
            }
            let resolvent = Resolvent::for_id(candidate, self.policy.destination);
            let constraint = Constraint {
                spec: ConstraintSpec::Block(BlockDepSpec {
                    blocked: candidate.uniquely_identifying_spec(),
                    strong: false,
                }),
                nothing_is_fine_too: true,
                use_existing: UseExisting::IfPossible,
                to_destination: self.policy.destination,
                taken: true,
                reason: Reason::WasUsedBy { ids: users },
            };
            self.add_constraint(state, resolvent, constraint)?;
        }

        Ok(())
    }

    /// Whether installed id `user` depends on installed id `used`.
    fn depends_on(&self, user: &PackageId, used: &PackageId) -> bool {
        self.sanitised_dependencies_of(user)
            .iter()
            .filter(|dep| !dep.is_optional())
            .any(|dep| match &dep.spec {
                SanitisedSpec::Package(spec) => match_package(self.env, spec, used),
                SanitisedSpec::Any { alternatives, .. } => alternatives
                    .iter()
                    .flat_map(|a| a.specs.iter())
                    .any(|spec| match_package(self.env, spec, used)),
                _ => false,
            })
    }

    /// Build the ordered, partitioned result.
    fn finalise(&self, state: State) -> Result<Resolved> {
        let mut resolved = Resolved::default();

        // Nodes that become jobs: taken change/remove decisions.
        let mut nodes: Vec<Resolvent> = Vec::new();
        for (resolvent, entry) in &state.resolutions {
            if let Some(decision) = &entry.decision {
                if decision.taken() && decision.is_change_or_remove() {
                    nodes.push(resolvent.clone());
                }
            }
        }

        let arrows = self.arrows(&state, &nodes);
        let ordering = order(&nodes, &arrows);

        let resolution_of = |resolvent: &Resolvent| -> Resolution {
            let entry = &state.resolutions[resolvent];
            Resolution {
                resolvent: resolvent.clone(),
                constraints: entry.constraints.clone(),
                decision: entry.decision.clone(),
            }
        };

        for &index in &ordering.ordered {
            resolved
                .taken_change_or_remove_decisions
                .push(resolution_of(&nodes[index]));
        }
        for (index, cycle) in &ordering.unorderable {
            resolved
                .taken_unorderable_decisions
                .push((resolution_of(&nodes[*index]), cycle.clone()));
        }

        for (resolvent, entry) in &state.resolutions {
            let Some(decision) = &entry.decision else {
                continue;
            };
            match decision {
                Decision::ChangesToMake { .. } | Decision::Remove { .. } if !decision.taken() => {
                    resolved
                        .untaken_change_or_remove_decisions
                        .push(resolution_of(resolvent));
                }
                Decision::Unable { .. } => {
                    if decision.taken() {
                        resolved
                            .taken_unable_to_make_decisions
                            .push(resolution_of(resolvent));
                    } else {
                        resolved
                            .untaken_unable_to_make_decisions
                            .push(resolution_of(resolvent));
                    }
                }
                _ => {}
            }
            if decision.taken() && decision.needs_confirmation() {
                resolved
                    .taken_unconfirmed_decisions
                    .push(resolution_of(resolvent));
            }
        }

        resolved.job_lists = self.linearise(&state, &nodes, &ordering.ordered);
        debug_assert!(resolved.job_lists.requirements_are_acyclic());
        Ok(resolved)
    }

    /// Precedence arrows between job-bearing nodes.
    fn arrows(&self, state: &State, nodes: &[Resolvent]) -> Vec<OrderArrow> {
        let index_of = |resolvent: &Resolvent| nodes.iter().position(|n| n == resolvent);
        let node_covering = |id: &PackageId| {
            nodes.iter().position(|n| {
                n.covers(id)
                    && state.resolutions[n]
                        .decision
                        .as_ref()
                        .is_some_and(|d| matches!(d, Decision::Remove { .. }))
            })
        };
        let mut arrows = Vec::new();

        for (resolvent, entry) in &state.resolutions {
            let Some(this) = index_of(resolvent) else {
                continue;
            };
            for constraint in &entry.constraints {
                match &constraint.reason {
                    Reason::Dependency { from_resolvent, dependency, .. } => {
                        // The depender comes after its dependency.
                        if let Some(dependent) = index_of(from_resolvent) {
                            if dependency.is_post() || dependency.is_optional() {
                                continue;
                            }
                            arrows.push(OrderArrow {
                                from: this,
                                to: dependent,
                                strict: dependency.is_strict(),
                            });
                        }
                    }
                    Reason::Dependent { id_being_removed } => {
                        // A dependent is removed before what it needed.
                        if let Some(needed) = node_covering(id_being_removed) {
                            arrows.push(OrderArrow { from: this, to: needed, strict: true });
                        }
                    }
                    Reason::WasUsedBy { ids } => {
                        // Users go before what they were using.
                        for user in ids {
                            if let Some(user_index) = node_covering(user) {
                                arrows.push(OrderArrow { from: user_index, to: this, strict: true });
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        arrows
    }

    /// Turn the ordered decisions into fetch/install/uninstall jobs with
    /// requirement edges.
    fn linearise(&self, state: &State, nodes: &[Resolvent], ordered: &[usize]) -> JobLists {
        let mut lists = JobLists::default();
        // Node index -> its install/uninstall job index.
        let mut job_of: IndexMap<usize, usize> = IndexMap::new();

        // Direct dependency nodes of each node: (dep node index,
        // already_met).
        let direct_deps = |node: usize| -> Vec<(usize, bool)> {
            let mut deps = Vec::new();
            for (resolvent, entry) in &state.resolutions {
                let Some(this) = nodes.iter().position(|n| n == resolvent) else {
                    continue;
                };
                for constraint in &entry.constraints {
                    if let Reason::Dependency { from_resolvent, dependency, already_met, .. } =
                        &constraint.reason
                    {
                        if nodes.get(node) == Some(from_resolvent)
                            && !dependency.is_post()
                            && !dependency.is_optional()
                            && !deps.iter().any(|(d, _)| *d == this)
                        {
                            deps.push((this, *already_met));
                        }
                    }
                }
            }
            deps
        };

        // Transitive dependency job indices, through already-placed jobs.
        fn transitive(
            node: usize,
            direct: &dyn Fn(usize) -> Vec<(usize, bool)>,
            job_of: &IndexMap<usize, usize>,
            seen: &mut BTreeSet<usize>,
        ) -> BTreeSet<usize> {
            let mut out = BTreeSet::new();
            if !seen.insert(node) {
                return out;
            }
            for (dep, _) in direct(node) {
                if let Some(&job) = job_of.get(&dep) {
                    out.insert(job);
                }
                out.extend(transitive(dep, direct, job_of, seen));
            }
            out
        }

        for &node in ordered {
            let entry = &state.resolutions[&nodes[node]];
            let Some(decision) = &entry.decision else {
                continue;
            };
            match decision {
                Decision::ChangesToMake { origin, destination, .. } => {
                    let Some(destination) = destination else {
                        continue;
                    };
                    let origin_spec = origin.uniquely_identifying_spec();
                    lists.pretend_jobs.push(PretendJob {
                        origin_id_spec: origin_spec.clone(),
                    });

                    let fetch_index = lists.execute_jobs.len();
                    lists.execute_jobs.push(ExecuteJob::Fetch(FetchJob {
                        requirements: Vec::new(),
                        origin_id_spec: origin_spec.clone(),
                    }));

                    let mut requirements = vec![JobRequirement {
                        job_index: fetch_index,
                        flags: JobRequirementFlags {
                            for_satisfied: true,
                            for_independent: true,
                            always: true,
                        },
                    }];
                    for (dep, already_met) in direct_deps(node) {
                        if already_met {
                            continue;
                        }
                        if let Some(&job) = job_of.get(&dep) {
                            requirements.push(JobRequirement {
                                job_index: job,
                                flags: JobRequirementFlags {
                                    for_satisfied: true,
                                    ..JobRequirementFlags::default()
                                },
                            });
                        }
                    }
                    let mut seen = BTreeSet::new();
                    let independents = transitive(node, &direct_deps, &job_of, &mut seen);
                    for &job in independents.iter().rev() {
                        requirements.push(JobRequirement {
                            job_index: job,
                            flags: JobRequirementFlags {
                                for_independent: true,
                                ..JobRequirementFlags::default()
                            },
                        });
                    }

                    let install_index = lists.execute_jobs.len();
                    lists.execute_jobs.push(ExecuteJob::Install(InstallJob {
                        requirements,
                        origin_id_spec: origin_spec,
                        destination_repository: destination.repository.clone(),
                        destination_type: nodes[node].destination,
                        replacing_specs: destination
                            .replacing
                            .iter()
                            .map(PackageId::uniquely_identifying_spec)
                            .collect(),
                    }));
                    job_of.insert(node, install_index);
                }
                Decision::Remove { ids, .. } => {
                    // A removal requires its already-scheduled dependent
                    // removals.
                    let mut requirements = Vec::new();
                    for (resolvent, entry) in &state.resolutions {
                        let Some(other) = nodes.iter().position(|n| n == resolvent) else {
                            continue;
                        };
                        let depends_on_this = entry.constraints.iter().any(|c| match &c.reason {
                            Reason::Dependent { id_being_removed } => {
                                ids.contains(id_being_removed)
                            }
                            _ => false,
                        });
                        if depends_on_this {
                            if let Some(&job) = job_of.get(&other) {
                                requirements.push(JobRequirement {
                                    job_index: job,
                                    flags: JobRequirementFlags {
                                        for_satisfied: true,
                                        ..JobRequirementFlags::default()
                                    },
                                });
                            }
                        }
                    }
                    // Purged packages likewise wait for their users.
                    for constraint in &entry.constraints {
                        if let Reason::WasUsedBy { ids: users } = &constraint.reason {
                            for user in users {
                                let user_node = nodes.iter().position(|n| {
                                    n.covers(user)
                                        && state.resolutions[n]
                                            .decision
                                            .as_ref()
                                            .is_some_and(|d| matches!(d, Decision::Remove { .. }))
                                });
                                if let Some(user_node) = user_node {
                                    if let Some(&job) = job_of.get(&user_node) {
                                        let requirement = JobRequirement {
                                            job_index: job,
                                            flags: JobRequirementFlags {
                                                for_satisfied: true,
                                                ..JobRequirementFlags::default()
                                            },
                                        };
                                        if !requirements.contains(&requirement) {
                                            requirements.push(requirement);
                                        }
                                    }
                                }
                            }
                        }
                    }

                    let job_index = lists.execute_jobs.len();
                    lists.execute_jobs.push(ExecuteJob::Uninstall(UninstallJob {
                        requirements,
                        ids_to_remove_specs: ids
                            .iter()
                            .map(PackageId::uniquely_identifying_spec)
                            .collect(),
                    }));
                    job_of.insert(node, job_index);
                }
                _ => {}
            }
        }

        lists
    }
}
