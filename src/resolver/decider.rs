//! Deciding: choose the best id (or no change, removal, or inability)
//! for one resolvent under its constraints.

use itertools::Itertools;

use crate::environment::Environment;
use crate::resolver::constraint::{effective_use_existing, Constraint, ConstraintSpec, UseExisting};
use crate::resolver::decision::{ChosenDestination, Decision, UnsuitableCandidate};
use crate::resolver::reason::Reason;
use crate::resolver::resolvent::Resolvent;
use crate::resolver::ResolverPolicy;
use crate::selection::match_package;
use crate::spectree::DependencyAlternative;
use crate::types::package::{ActionKind, PackageId};

/// Installed ids covered by a resolvent, best version first.
pub(crate) fn installed_ids(env: &Environment, resolvent: &Resolvent) -> Vec<PackageId> {
    let mut ids: Vec<PackageId> = env
        .installed_repositories()
        .iter()
        .flat_map(|repo| repo.package_ids(&resolvent.name))
        .filter(|id| resolvent.covers(id))
        .collect();
    ids.sort_by(|a, b| b.version().cmp(a.version()));
    ids
}

/// Installable ids covered by a resolvent, best version and most
/// important repository first.
pub(crate) fn installable_ids(env: &Environment, resolvent: &Resolvent) -> Vec<PackageId> {
    let mut ids: Vec<PackageId> = env
        .repositories()
        .iter()
        .filter(|repo| repo.installed_root().is_none())
        .flat_map(|repo| repo.package_ids(&resolvent.name))
        .filter(|id| resolvent.covers(id) && id.supports_action(ActionKind::Install))
        .collect();
    let importance = |id: &PackageId| {
        env.repository_index(id.repository_name()).unwrap_or(usize::MAX)
    };
    ids.sort_by(|a, b| {
        b.version()
            .cmp(a.version())
            .then_with(|| importance(a).cmp(&importance(b)))
    });
    ids
}

fn package_constraints(constraints: &[Constraint]) -> impl Iterator<Item = &Constraint> {
    constraints
        .iter()
        .filter(|c| matches!(c.spec, ConstraintSpec::Package(_)))
}

fn block_constraints(constraints: &[Constraint]) -> impl Iterator<Item = &Constraint> {
    constraints.iter().filter(|c| c.spec.is_block())
}

fn satisfies_all(env: &Environment, id: &PackageId, constraints: &[Constraint]) -> bool {
    constraints.iter().all(|c| c.allows_id(env, id))
}

fn unmet_constraint_texts(env: &Environment, id: &PackageId, constraints: &[Constraint]) -> Vec<String> {
    constraints
        .iter()
        .filter(|c| !c.allows_id(env, id))
        .map(|c| c.spec.to_string())
        .collect()
}

/// Whether removal of `id` is allowed under the given constraints: a
/// target or purge block carries its own permission, anything else
/// consults policy.
fn removal_allowed(env: &Environment, policy: &ResolverPolicy, id: &PackageId, constraints: &[Constraint]) -> bool {
    block_constraints(constraints).any(|c| match &c.reason {
        Reason::Target { .. } | Reason::Preset { .. } | Reason::WasUsedBy { .. } => true,
        Reason::Dependent { .. } | Reason::Dependency { .. } | Reason::Set { .. } => policy
            .allowed_to_remove
            .iter()
            .any(|spec| match_package(env, spec, id)),
    })
}

/// What: Decide one resolvent.
///
/// Inputs:
/// - `env` / `policy`: Context.
/// - `resolvent`: What is being decided.
/// - `constraints`: The composed (and-ed) constraints.
///
/// Output:
/// - The decision, per the rules of the resolution algorithm: blocks
///   force removal (or a break) of matching installed ids; otherwise the
///   best installable candidate wins unless `use_existing` retains an
///   install; no candidate and `nothing_is_fine_too` yields nothing;
///   anything else is an inability carrying the rejected candidates.
pub(crate) fn decide(
    env: &Environment,
    policy: &ResolverPolicy,
    resolvent: &Resolvent,
    constraints: &[Constraint],
) -> Decision {
    let taken = constraints.iter().any(|c| c.taken);
    let installed = installed_ids(env, resolvent);

    // Blocks first: anything installed that a block forbids must go.
    let blocks: Vec<&Constraint> = block_constraints(constraints).collect();
    if !blocks.is_empty() {
        let blocked: Vec<PackageId> = installed
            .iter()
            .filter(|id| blocks.iter().any(|c| !c.allows_id(env, id)))
            .cloned()
            .collect();
        if blocked.is_empty() {
            return Decision::NothingNoChange { taken };
        }
        if blocked.iter().all(|id| removal_allowed(env, policy, id, constraints)) {
            return Decision::Remove { ids: blocked, taken };
        }
        let existing = blocked
            .into_iter()
            .next()
            .unwrap_or_else(|| installed[0].clone());
        return Decision::Break { existing, taken };
    }

    let use_existing = effective_use_existing(constraints, policy.use_existing_for_dependencies);

    let candidates = installable_ids(env, resolvent);
    let mut unsuitable = Vec::new();
    let mut best_installable = None;
    for candidate in &candidates {
        if !satisfies_all(env, candidate, constraints) {
            unsuitable.push(UnsuitableCandidate {
                id: candidate.clone(),
                unmet_constraints: unmet_constraint_texts(env, candidate, constraints),
            });
            continue;
        }
        if env.masked(candidate) {
            unsuitable.push(UnsuitableCandidate {
                id: candidate.clone(),
                unmet_constraints: env
                    .masks(candidate)
                    .active
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            });
            continue;
        }
        best_installable = Some(candidate.clone());
        break;
    }

    let best_existing = installed
        .iter()
        .find(|id| satisfies_all(env, id, constraints))
        .cloned();

    match (best_installable, best_existing) {
        (Some(best), existing) => {
            let keep = existing.as_ref().is_some_and(|have| {
                match use_existing {
                    UseExisting::Never => false,
                    UseExisting::OnlyIfTransient => have.is_transient(),
                    UseExisting::IfSame => have.version() == best.version(),
                    UseExisting::IfSameVersion => {
                        have.version().equal_ignoring_revision(best.version())
                    }
                    UseExisting::IfPossible => true,
                }
            });
            if let Some(have) = existing.filter(|_| keep) {
                existing_no_change(&have, &best, taken)
            } else {
                changes_to_make(env, policy, resolvent, &best, &installed, taken)
            }
        }
        (None, Some(have)) => {
            // Nothing installable, but something installed satisfies
            // every constraint.
            let best = have.clone();
            existing_no_change(&have, &best, taken)
        }
        (None, None) => {
            if constraints.iter().all(|c| c.nothing_is_fine_too) {
                Decision::NothingNoChange { taken }
            } else {
                Decision::Unable { unsuitable, taken }
            }
        }
    }
}

fn existing_no_change(have: &PackageId, best: &PackageId, taken: bool) -> Decision {
    Decision::ExistingNoChange {
        existing: have.clone(),
        is_same: have.version() == best.version(),
        is_same_version: have.version().equal_ignoring_revision(best.version()),
        is_transient: have.is_transient(),
        taken,
    }
}

fn changes_to_make(
    env: &Environment,
    policy: &ResolverPolicy,
    resolvent: &Resolvent,
    best: &PackageId,
    installed: &[PackageId],
    taken: bool,
) -> Decision {
    let replacing: Vec<PackageId> = installed
        .iter()
        .filter(|id| id.slot() == best.slot())
        .cloned()
        .collect();
    let destination = env
        .default_destination_repository()
        .filter(|repo| {
            repo.destination()
                .is_some_and(|d| d.is_suitable_destination_for(best))
        })
        .map(|repo| ChosenDestination {
            repository: repo.name().clone(),
            replacing: replacing.clone(),
        });
    if destination.is_none() {
        return Decision::Unable {
            unsuitable: vec![UnsuitableCandidate {
                id: best.clone(),
                unmet_constraints: vec![format!(
                    "no suitable destination for {} ({})",
                    best, resolvent.destination
                )],
            }],
            taken,
        };
    }

    let mut confirmation_needed = Vec::new();
    if policy.confirm_downgrades {
        if let Some(newest_installed) = replacing.iter().map(PackageId::version).max() {
            if newest_installed > best.version() {
                confirmation_needed
                    .push(format!("downgrade from {newest_installed} to {}", best.version()));
            }
        }
    }

    Decision::ChangesToMake {
        origin: best.clone(),
        best: true,
        destination,
        confirmation_needed,
        taken,
    }
}

/// The score tiers of any-group alternatives, low to high.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum AlternativeScore {
    Avoided,
    Blocked,
    Masked,
    WouldInstallAnyway,
    InstallableNotMasked,
    Empty,
    AlreadyInstalled,
    Preferred,
}

/// What: Choose which alternative of an any-group to pursue.
///
/// Inputs:
/// - `alternatives`: The group's branches in declaration order.
/// - `would_install`: Whether a name already has a pending install.
///
/// Output:
/// - The index of the winning alternative. Scoring is stable: the same
///   inputs always produce the same choice, and declaration order breaks
///   ties.
pub(crate) fn choose_any_alternative(
    env: &Environment,
    policy: &ResolverPolicy,
    alternatives: &[DependencyAlternative],
    would_install: &dyn Fn(&crate::types::name::QualifiedPackageName) -> bool,
) -> Option<usize> {
    alternatives
        .iter()
        .enumerate()
        .map(|(index, alternative)| {
            (score_alternative(env, policy, alternative, would_install), index)
        })
        // max_by_key keeps the *last* maximum; position_max semantics
        // need the first, so compare with index descending.
        .sorted_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)))
        .next_back()
        .map(|(_, index)| index)
}

fn score_alternative(
    env: &Environment,
    policy: &ResolverPolicy,
    alternative: &DependencyAlternative,
    would_install: &dyn Fn(&crate::types::name::QualifiedPackageName) -> bool,
) -> AlternativeScore {
    if alternative.specs.is_empty() {
        return AlternativeScore::Empty;
    }

    // An alternative scores as its weakest member.
    alternative
        .specs
        .iter()
        .map(|spec| {
            if policy.avoid.iter().any(|a| a.name_constraint() == spec.name_constraint()) {
                return AlternativeScore::Avoided;
            }
            let preferred = policy
                .prefer
                .iter()
                .any(|p| p.name_constraint() == spec.name_constraint());

            let resolvent = spec
                .package_name()
                .cloned()
                .map(Resolvent::unslotted);
            let Some(resolvent) = resolvent else {
                return AlternativeScore::Blocked;
            };

            let satisfied_installed = installed_ids(env, &resolvent)
                .iter()
                .any(|id| match_package(env, spec, id));
            if satisfied_installed {
                return if preferred {
                    AlternativeScore::Preferred
                } else {
                    AlternativeScore::AlreadyInstalled
                };
            }
            if preferred {
                return AlternativeScore::Preferred;
            }

            let candidates = installable_ids(env, &resolvent);
            let unmasked = candidates
                .iter()
                .any(|id| match_package(env, spec, id) && !env.masked(id));
            if unmasked {
                return AlternativeScore::InstallableNotMasked;
            }
            // Unavailable here, but an earlier resolution already plans
            // to bring the name in.
            if would_install(&resolvent.name) {
                return AlternativeScore::WouldInstallAnyway;
            }
            let masked_candidate = candidates.iter().any(|id| match_package(env, spec, id));
            if masked_candidate {
                return AlternativeScore::Masked;
            }
            AlternativeScore::Blocked
        })
        .min()
        .unwrap_or(AlternativeScore::Blocked)
}
