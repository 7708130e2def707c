//! The selection pipeline: queries over all repositories.
//!
//! A query is a [`Generator`] (which repositories, categories, packages
//! and ids are candidates) narrowed by [`Filter`]s and shaped by a
//! [`Selection`]. Filters are applied in stages from cheapest to
//! strictest, so repository-level filters short-circuit before any ids
//! are materialised. This module also houses spec matching
//! ([`match_package`]), which the filters and the resolver share.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use itertools::Itertools;

use crate::environment::Environment;
use crate::error::{CinderError, Result};
use crate::repository::Repository;
use crate::types::choices::ChangedChoices;
use crate::types::mask::Mask;
use crate::types::name::{CategoryNamePart, QualifiedPackageName, RepositoryName};
use crate::types::package::{ActionKind, PackageId};
use crate::types::spec::{ChoiceRequirement, PackageDepSpec, SlotRequirement};

/// The consumer side of a conditional choice requirement (`[flag?]`,
/// `[flag=]`): whose flags decide, and under which hypothetical overlay.
pub struct MatchContext<'a> {
    /// The package whose dependency is being matched.
    pub consumer: &'a PackageId,
    /// An optional "what if" overlay on the consumer's choices.
    pub changed: Option<&'a ChangedChoices>,
}

/// What: Match a package against a dep spec, without consumer context.
///
/// Inputs:
/// - `env`: Environment for repository and mask resolution.
/// - `spec`: The dep spec.
/// - `id`: The candidate package.
///
/// Output:
/// - `true` when every requirement of the spec accepts the candidate.
///   Conditional choice requirements are vacuously met here; use
///   [`match_package_in`] to supply a consumer.
#[must_use]
pub fn match_package(env: &Environment, spec: &PackageDepSpec, id: &PackageId) -> bool {
    match_package_in(env, spec, id, None)
}

/// Match a package against a dep spec with optional consumer context.
#[must_use]
pub fn match_package_in(
    env: &Environment,
    spec: &PackageDepSpec,
    id: &PackageId,
    context: Option<&MatchContext<'_>>,
) -> bool {
    if !spec.name_constraint().matches(id.name()) {
        return false;
    }
    if !spec.version_requirements_match(id.version()) {
        return false;
    }
    match spec.slot_requirement() {
        Some(SlotRequirement::Exact(slot)) => {
            if id.slot() != Some(slot) {
                return false;
            }
        }
        Some(SlotRequirement::AnySlot | SlotRequirement::Locked) | None => {}
    }
    if let Some(repo) = spec.in_repository() {
        if id.repository_name() != repo {
            return false;
        }
    }
    if let Some(repo) = spec.from_repository() {
        let from = id.from_repositories_key();
        if !from.is_some_and(|set| set.contains(repo.as_str())) {
            return false;
        }
    }
    if let Some(path) = spec.installed_at_path() {
        let at_path = env
            .repository(id.repository_name())
            .ok()
            .and_then(|r| r.installed_root().map(|root| root == path.as_path()))
            .unwrap_or(false);
        if !at_path {
            return false;
        }
    }
    if let Some(repo_name) = spec.installable_to_repository() {
        let suitable = env.repository(repo_name).ok().is_some_and(|r| {
            r.destination()
                .is_some_and(|d| d.is_suitable_destination_for(id))
        });
        if !suitable {
            return false;
        }
    }
    if let Some(path) = spec.installable_to_path() {
        let suitable = env.repositories().iter().any(|r| {
            r.installed_root() == Some(path.as_path())
                && r.destination()
                    .is_some_and(|d| d.is_suitable_destination_for(id))
        });
        if !suitable {
            return false;
        }
    }
    for requirement in spec.choice_requirements() {
        if !choice_requirement_met(env, requirement, id, context) {
            return false;
        }
    }
    for requirement in spec.key_requirements() {
        let matched = id
            .metadata(&requirement.key)
            .and_then(|v| v.flat_string())
            .is_some_and(|s| s == requirement.value);
        if !matched {
            return false;
        }
    }
    true
}

fn choice_requirement_met(
    env: &Environment,
    requirement: &ChoiceRequirement,
    id: &PackageId,
    context: Option<&MatchContext<'_>>,
) -> bool {
    let theirs = |flag| {
        env.effective_choices(id)
            .and_then(|c| c.enabled(flag))
            .unwrap_or(false)
    };
    match requirement {
        ChoiceRequirement::Enabled(flag) => theirs(flag),
        ChoiceRequirement::Disabled(flag) => !theirs(flag),
        ChoiceRequirement::IfMineThenTheirs(flag) => match context {
            Some(ctx) => {
                let mine = consumer_flag_state(env, ctx, flag);
                !mine || theirs(flag)
            }
            None => true,
        },
        ChoiceRequirement::Equal(flag) => match context {
            Some(ctx) => consumer_flag_state(env, ctx, flag) == theirs(flag),
            None => true,
        },
    }
}

fn consumer_flag_state(
    env: &Environment,
    context: &MatchContext<'_>,
    flag: &crate::types::name::ChoiceNameWithPrefix,
) -> bool {
    let base = env.effective_choices(context.consumer).unwrap_or_default();
    match context.changed {
        Some(overlay) => overlay.effective(&base, flag),
        None => base.enabled(flag),
    }
    .unwrap_or(false)
}

/// Produces candidate ids, stage by stage.
#[derive(Clone, Debug)]
pub enum Generator {
    /// Every id in every repository.
    All,
    /// Ids matching a dep spec.
    Matches(PackageDepSpec),
    /// Ids of one qualified package name.
    Package(QualifiedPackageName),
    /// Ids within one category.
    Category(CategoryNamePart),
    /// Ids within one repository.
    InRepository(RepositoryName),
}

impl fmt::Display for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all packages"),
            Self::Matches(spec) => write!(f, "packages matching {spec}"),
            Self::Package(q) => write!(f, "package {q}"),
            Self::Category(c) => write!(f, "category {c}"),
            Self::InRepository(r) => write!(f, "repository {r}"),
        }
    }
}

impl Generator {
    fn repositories(&self, env: &Environment) -> Vec<Arc<dyn Repository>> {
        match self {
            Self::InRepository(name) => env.repository(name).into_iter().collect(),
            Self::Matches(spec) => match spec.in_repository() {
                Some(name) => env.repository(name).into_iter().collect(),
                None => env.repositories().to_vec(),
            },
            _ => env.repositories().to_vec(),
        }
    }

    fn categories(&self, repo: &dyn Repository) -> Vec<CategoryNamePart> {
        match self {
            Self::Category(c) => {
                if repo.has_category(c) {
                    vec![c.clone()]
                } else {
                    Vec::new()
                }
            }
            Self::Package(q) => {
                if repo.has_category(&q.category) {
                    vec![q.category.clone()]
                } else {
                    Vec::new()
                }
            }
            Self::Matches(spec) => match spec.package_name() {
                Some(q) => {
                    if repo.has_category(&q.category) {
                        vec![q.category.clone()]
                    } else {
                        Vec::new()
                    }
                }
                None => repo.category_names(),
            },
            _ => repo.category_names(),
        }
    }

    fn packages(
        &self,
        repo: &dyn Repository,
        category: &CategoryNamePart,
    ) -> Vec<QualifiedPackageName> {
        let names = match self {
            Self::Package(q) => {
                if repo.has_package(q) {
                    vec![q.clone()]
                } else {
                    Vec::new()
                }
            }
            Self::Matches(spec) => match spec.package_name() {
                Some(q) => {
                    if repo.has_package(q) {
                        vec![q.clone()]
                    } else {
                        Vec::new()
                    }
                }
                None => repo.package_names(category),
            },
            _ => repo.package_names(category),
        };
        names
            .into_iter()
            .filter(|q| match self {
                Self::Matches(spec) => spec.name_constraint().matches(q),
                _ => true,
            })
            .collect()
    }

    fn ids(&self, env: &Environment, repo: &dyn Repository, name: &QualifiedPackageName) -> Vec<PackageId> {
        repo.package_ids(name)
            .into_iter()
            .filter(|id| match self {
                Self::Matches(spec) => match_package(env, spec, id),
                _ => true,
            })
            .collect()
    }
}

/// The kind position of a [`Filter::WithMask`] query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskKind {
    /// User-imposed.
    User,
    /// Unaccepted metadata.
    Unaccepted,
    /// Repository-imposed.
    Repository,
    /// Unusable package.
    Unsupported,
    /// Masked by association.
    Association,
}

impl MaskKind {
    fn matches(self, mask: &Mask) -> bool {
        matches!(
            (self, mask),
            (Self::User, Mask::User { .. })
                | (Self::Unaccepted, Mask::Unaccepted { .. })
                | (Self::Repository, Mask::Repository { .. })
                | (Self::Unsupported, Mask::Unsupported { .. })
                | (Self::Association, Mask::Association { .. })
        )
    }
}

/// Narrows the candidate stream.
#[derive(Clone)]
pub enum Filter {
    /// No narrowing.
    All,
    /// Only ids installed at the given root.
    InstalledAtRoot(PathBuf),
    /// Only ids supporting an action kind.
    SupportsAction(ActionKind),
    /// Only unmasked ids.
    NotMasked,
    /// Only ids sharing the slot of the given id.
    SameSlot(PackageId),
    /// Only ids matching a dep spec.
    Matches(PackageDepSpec),
    /// Only ids carrying at least one mask of the given kind.
    WithMask(MaskKind),
    /// Arbitrary predicate.
    ByFunction(Arc<dyn Fn(&Environment, &PackageId) -> bool + Send + Sync>),
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::InstalledAtRoot(p) => write!(f, "InstalledAtRoot({})", p.display()),
            Self::SupportsAction(k) => write!(f, "SupportsAction({k})"),
            Self::NotMasked => f.write_str("NotMasked"),
            Self::SameSlot(id) => write!(f, "SameSlot({id})"),
            Self::Matches(spec) => write!(f, "Matches({spec})"),
            Self::WithMask(kind) => write!(f, "WithMask({kind:?})"),
            Self::ByFunction(_) => f.write_str("ByFunction(..)"),
        }
    }
}

impl Filter {
    /// Repository-level pre-check; `true` keeps the repository in play.
    fn allows_repository(&self, repo: &dyn Repository) -> bool {
        match self {
            Self::InstalledAtRoot(path) => repo.installed_root() == Some(path.as_path()),
            Self::SupportsAction(kind) => repo.some_ids_might_support_action(*kind),
            Self::NotMasked => repo.some_ids_might_not_be_masked(),
            _ => true,
        }
    }

    /// Id-level check.
    fn allows_id(&self, env: &Environment, id: &PackageId) -> bool {
        match self {
            Self::All => true,
            Self::InstalledAtRoot(path) => env
                .repository(id.repository_name())
                .ok()
                .and_then(|r| r.installed_root().map(|root| root == path.as_path()))
                .unwrap_or(false),
            Self::SupportsAction(kind) => id.supports_action(*kind),
            Self::NotMasked => !env.masked(id),
            Self::SameSlot(other) => id.slot() == other.slot(),
            Self::Matches(spec) => match_package(env, spec, id),
            Self::WithMask(kind) => env.masks(id).active.iter().any(|m| kind.matches(m)),
            Self::ByFunction(predicate) => predicate(env, id),
        }
    }
}

/// A generator narrowed by filters.
#[derive(Clone, Debug)]
pub struct FilteredGenerator {
    generator: Generator,
    filters: Vec<Filter>,
}

impl FilteredGenerator {
    /// Wrap a generator with no filters.
    #[must_use]
    pub fn new(generator: Generator) -> Self {
        Self {
            generator,
            filters: Vec::new(),
        }
    }

    /// Append a filter.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }
}

impl From<Generator> for FilteredGenerator {
    fn from(generator: Generator) -> Self {
        Self::new(generator)
    }
}

/// The result shape of a query.
#[derive(Clone, Debug)]
pub enum Selection {
    /// Every matching id, sorted by name then version.
    AllVersionsSorted(FilteredGenerator),
    /// Every matching id, grouped by slot within a name.
    AllVersionsGroupedBySlot(FilteredGenerator),
    /// Only the best version per `(name, slot)`.
    BestVersionOnly(FilteredGenerator),
    /// Exactly one id; anything else is an error.
    RequireExactlyOne(FilteredGenerator),
    /// Any one matching id.
    SomeArbitraryVersion(FilteredGenerator),
}

impl Environment {
    /// What: Evaluate a selection query over all repositories.
    ///
    /// Inputs:
    /// - `selection`: The shaped query.
    ///
    /// Output:
    /// - The matching ids in the shape's order.
    /// - `RequireExactlyOne` fails with `NoSuchPackage` or
    ///   `AmbiguousPackage` when the match count is not one.
    ///
    /// Details:
    /// - Filters are consulted per repository before categories or ids
    ///   are enumerated, so e.g. an installed-at-root filter never reads
    ///   metadata from installable repositories.
    pub fn select(&self, selection: &Selection) -> Result<Vec<PackageId>> {
        let (fg, shape) = match selection {
            Selection::AllVersionsSorted(fg) => (fg, Shape::AllSorted),
            Selection::AllVersionsGroupedBySlot(fg) => (fg, Shape::GroupedBySlot),
            Selection::BestVersionOnly(fg) => (fg, Shape::Best),
            Selection::RequireExactlyOne(fg) => (fg, Shape::ExactlyOne),
            Selection::SomeArbitraryVersion(fg) => (fg, Shape::Arbitrary),
        };

        let mut found: Vec<PackageId> = Vec::new();
        for repo in fg.generator.repositories(self) {
            if !fg.filters.iter().all(|f| f.allows_repository(repo.as_ref())) {
                continue;
            }
            for category in fg.generator.categories(repo.as_ref()) {
                for name in fg.generator.packages(repo.as_ref(), &category) {
                    for id in fg.generator.ids(self, repo.as_ref(), &name) {
                        if fg.filters.iter().all(|f| f.allows_id(self, &id)) {
                            found.push(id);
                            if matches!(shape, Shape::Arbitrary) {
                                return Ok(found);
                            }
                        }
                    }
                }
            }
        }

        self.shape_results(found, shape, &fg.generator)
    }

    fn shape_results(
        &self,
        mut found: Vec<PackageId>,
        shape: Shape,
        generator: &Generator,
    ) -> Result<Vec<PackageId>> {
        let importance = |id: &PackageId| {
            self.repository_index(id.repository_name())
                .unwrap_or(usize::MAX)
        };
        match shape {
            Shape::AllSorted | Shape::Arbitrary => {
                found.sort_by(|a, b| {
                    a.name()
                        .cmp(b.name())
                        .then_with(|| a.version().cmp(b.version()))
                        .then_with(|| importance(a).cmp(&importance(b)))
                });
                Ok(found)
            }
            Shape::GroupedBySlot => {
                found.sort_by(|a, b| {
                    a.name()
                        .cmp(b.name())
                        .then_with(|| a.slot().cmp(&b.slot()))
                        .then_with(|| a.version().cmp(b.version()))
                        .then_with(|| importance(a).cmp(&importance(b)))
                });
                Ok(found)
            }
            Shape::Best => {
                found.sort_by(|a, b| {
                    a.name()
                        .cmp(b.name())
                        .then_with(|| a.slot().cmp(&b.slot()))
                        .then_with(|| a.version().cmp(b.version()))
                        // Prefer more important repositories on equal versions.
                        .then_with(|| importance(b).cmp(&importance(a)))
                });
                let best: Vec<PackageId> = found
                    .into_iter()
                    .chunk_by(|id| (id.name().clone(), id.slot().cloned()))
                    .into_iter()
                    .filter_map(|(_, group)| group.last())
                    .collect();
                Ok(best)
            }
            Shape::ExactlyOne => match found.len() {
                1 => Ok(found),
                0 => Err(CinderError::NoSuchPackage(generator.to_string())),
                _ => Err(CinderError::AmbiguousPackage(generator.to_string())),
            },
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Shape {
    AllSorted,
    GroupedBySlot,
    Best,
    ExactlyOne,
    Arbitrary,
}
