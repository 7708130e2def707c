//! The process-wide environment: repositories, user configuration,
//! named sets, hooks, mirrors.
//!
//! An [`Environment`] is created once at startup through its builder and
//! lives for the program. It owns the ordered repository list (earlier
//! repositories are more important), the user's acceptance and mask
//! configuration, the world file, and the registries the rest of the
//! core consults.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{CinderError, Result};
use crate::output::{HookResult, Hooks, NullHooks, OutputManager, StandardOutputManager};
use crate::repository::Repository;
use crate::selection::match_package;
use crate::sets::SetRegistry;
use crate::spectree::{evaluate, SetLeaf, SetSpecTree, SpecTree};
use crate::types::choices::{ChangedChoices, Choices};
use crate::types::mask::{Mask, MaskOverrideReason, OverriddenMask};
use crate::types::name::{ChoiceNameWithPrefix, KeywordName, RepositoryName, SetName};
use crate::types::package::{keys, PackageId};
use crate::types::spec::PackageDepSpec;
use crate::world::{World, WorldEntry};

/// Factory for per-operation output managers.
pub type OutputFactory = Arc<dyn Fn() -> Box<dyn OutputManager> + Send + Sync>;

/// The computed mask state of one package.
#[derive(Clone, Debug, Default)]
pub struct MaskReport {
    /// Masks that currently apply.
    pub active: Vec<Mask>,
    /// Masks that applied but were overridden; kept visible for display.
    pub overridden: Vec<OverriddenMask>,
}

impl MaskReport {
    /// Whether the package is masked.
    #[must_use]
    pub fn masked(&self) -> bool {
        !self.active.is_empty()
    }
}

/// The process-wide context.
pub struct Environment {
    repositories: Vec<Arc<dyn Repository>>,
    accepted_keywords: BTreeSet<KeywordName>,
    accepted_licenses: BTreeSet<String>,
    user_masks: Vec<(PackageDepSpec, String)>,
    user_unmasks: Vec<PackageDepSpec>,
    choice_overrides: Vec<(PackageDepSpec, ChoiceNameWithPrefix, bool)>,
    world: Option<World>,
    sets: SetRegistry,
    hooks: Arc<dyn Hooks>,
    hook_dirs: Vec<PathBuf>,
    mirrors: BTreeMap<String, Vec<String>>,
    reduced_uid: Option<u32>,
    reduced_gid: Option<u32>,
    output_factory: OutputFactory,
}

impl Environment {
    /// Start building an environment.
    #[must_use]
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    /// The repositories in importance order (most important first).
    #[must_use]
    pub fn repositories(&self) -> &[Arc<dyn Repository>] {
        &self.repositories
    }

    /// Look up a repository by name.
    pub fn repository(&self, name: &RepositoryName) -> Result<Arc<dyn Repository>> {
        self.repositories
            .iter()
            .find(|r| r.name() == name)
            .cloned()
            .ok_or_else(|| CinderError::NoSuchRepository(name.to_string()))
    }

    /// The position of a repository in importance order.
    #[must_use]
    pub fn repository_index(&self, name: &RepositoryName) -> Option<usize> {
        self.repositories.iter().position(|r| r.name() == name)
    }

    /// The repositories representing live installed trees.
    #[must_use]
    pub fn installed_repositories(&self) -> Vec<Arc<dyn Repository>> {
        self.repositories
            .iter()
            .filter(|r| r.installed_root().is_some())
            .cloned()
            .collect()
    }

    /// The default merge destination, when one is configured.
    #[must_use]
    pub fn default_destination_repository(&self) -> Option<Arc<dyn Repository>> {
        self.repositories
            .iter()
            .find(|r| r.destination().is_some_and(|d| d.is_default_destination()))
            .cloned()
    }

    /// What: Compute the full mask state of a package (spec order).
    ///
    /// Inputs:
    /// - `id`: The package to inspect.
    ///
    /// Output:
    /// - A [`MaskReport`] with active and overridden masks.
    ///
    /// Details:
    /// - Repository-attached masks (unsupported, repository, association)
    ///   come first, then unaccepted-key masks for keywords and licences,
    ///   then user masks. A matching user unmask overrides everything
    ///   except unsupported masks.
    pub fn masks(&self, id: &PackageId) -> MaskReport {
        let mut report = MaskReport::default();
        let unmasked = self
            .user_unmasks
            .iter()
            .any(|spec| match_package(self, spec, id));

        let mut push = |mask: Mask, overridable: bool| {
            if overridable && unmasked {
                report.overridden.push(OverriddenMask {
                    mask,
                    override_reason: MaskOverrideReason::OverriddenByUser,
                });
            } else {
                report.active.push(mask);
            }
        };

        for mask in id.masks() {
            let overridable = !matches!(mask, Mask::Unsupported { .. });
            push(mask.clone(), overridable);
        }

        if let Some(keywords) = id.keywords_key() {
            if !self.accepts_any_keyword(keywords) {
                push(Mask::Unaccepted { key: keys::KEYWORDS.to_string() }, true);
            }
        }

        if let Some(licenses) = id.license_key() {
            let choices = id.choices_key().cloned().unwrap_or_default();
            let accepted = evaluate(licenses, &choices, None, &|license: &String| {
                self.accepts_license(license)
            });
            if !accepted {
                push(Mask::Unaccepted { key: keys::LICENSE.to_string() }, true);
            }
        }

        for (spec, token) in &self.user_masks {
            if match_package(self, spec, id) {
                push(Mask::User { token: token.clone() }, true);
            }
        }

        report.overridden.extend(id.overridden_masks().iter().cloned());
        report
    }

    /// Whether at least one mask applies to the package.
    #[must_use]
    pub fn masked(&self, id: &PackageId) -> bool {
        self.masks(id).masked()
    }

    /// What: Whether any of a package's keywords is accepted.
    ///
    /// Details:
    /// - `*` in user configuration accepts everything; `~*` accepts any
    ///   unstable keyword; otherwise exact membership decides.
    #[must_use]
    pub fn accepts_any_keyword(&self, keywords: &BTreeSet<KeywordName>) -> bool {
        keywords.iter().any(|k| {
            self.accepted_keywords.contains(k)
                || self.accepted_keywords.iter().any(|a| a.as_str() == "*")
                || (k.is_unstable() && self.accepted_keywords.iter().any(|a| a.as_str() == "~*"))
        })
    }

    /// Whether a license name is accepted.
    #[must_use]
    pub fn accepts_license(&self, license: &str) -> bool {
        self.accepted_licenses.contains("*") || self.accepted_licenses.contains(license)
    }

    /// What: The package's choices with user overrides applied.
    ///
    /// Output:
    /// - `None` when the package publishes no choices key; otherwise the
    ///   declared choices with every matching, changeable override
    ///   applied.
    #[must_use]
    pub fn effective_choices(&self, id: &PackageId) -> Option<Choices> {
        let mut choices = id.choices_key().cloned()?;
        for (spec, flag, enabled) in &self.choice_overrides {
            // Override specs match on identity only; honouring their
            // choice requirements here would re-enter this function.
            let mut identity_spec = spec.clone();
            identity_spec.choice_requirements.clear();
            if match_package(self, &identity_spec, id) && !choices.set_enabled(flag, *enabled) {
                tracing::debug!("choice override for {flag} on {id} not applicable");
            }
        }
        Some(choices)
    }

    /// Evaluate a choice condition context for a package: its effective
    /// choices plus an optional overlay.
    #[must_use]
    pub fn choices_with_overlay(
        &self,
        id: &PackageId,
        changed: Option<&ChangedChoices>,
    ) -> (Choices, Option<ChangedChoices>) {
        (
            self.effective_choices(id).unwrap_or_default(),
            changed.cloned(),
        )
    }

    /// What: Resolve a named set.
    ///
    /// Details:
    /// - `world` reads the world file; `everything` enumerates installed
    ///   package names; anything else comes from the registry
    ///   (repository-populated and user sets).
    pub fn set(&self, name: &SetName) -> Result<SetSpecTree> {
        match name.as_str() {
            "world" => match &self.world {
                Some(world) => world.as_set_tree(),
                None => {
                    tracing::warn!("no world file configured; world set is empty");
                    Ok(SetSpecTree::empty())
                }
            },
            "everything" => {
                let mut names = BTreeSet::new();
                for repo in self.installed_repositories() {
                    for category in repo.category_names() {
                        for package in repo.package_names(&category) {
                            names.insert(package);
                        }
                    }
                }
                Ok(SpecTree::All(
                    names
                        .into_iter()
                        .map(|q| SpecTree::Leaf(SetLeaf::Package(PackageDepSpec::simple(q))))
                        .collect(),
                ))
            }
            _ => self.sets.get(name).cloned(),
        }
    }

    /// The set registry (static sets only; see [`Environment::set`]).
    #[must_use]
    pub fn set_registry(&self) -> &SetRegistry {
        &self.sets
    }

    /// The world file handle, when configured.
    #[must_use]
    pub fn world(&self) -> Option<&World> {
        self.world.as_ref()
    }

    /// What: Add an entry to the world file.
    ///
    /// Details:
    /// - With no world file configured this warns and does nothing, so
    ///   install pipelines never fail on a missing world location.
    pub fn add_to_world(&self, entry: &WorldEntry) -> Result<bool> {
        match &self.world {
            Some(world) => world.add(entry),
            None => {
                tracing::warn!("not adding {entry} to world: no world file configured");
                Ok(false)
            }
        }
    }

    /// Remove an entry from the world file; `false` when absent or no
    /// world file is configured.
    pub fn remove_from_world(&self, entry: &WorldEntry) -> Result<bool> {
        match &self.world {
            Some(world) => world.remove(entry),
            None => {
                tracing::warn!("not removing {entry} from world: no world file configured");
                Ok(false)
            }
        }
    }

    /// Run a named hook through the configured hook interface.
    pub fn perform_hook(&self, name: &str, env: &[(String, String)]) -> Result<HookResult> {
        self.hooks.perform_hook(name, env)
    }

    /// The configured hook search directories.
    #[must_use]
    pub fn hook_dirs(&self) -> &[PathBuf] {
        &self.hook_dirs
    }

    /// Mirror URLs registered under a mirror name.
    #[must_use]
    pub fn mirrors(&self, name: &str) -> &[String] {
        self.mirrors.get(name).map_or(&[], Vec::as_slice)
    }

    /// The uid/gid to drop to for unprivileged work, when configured.
    #[must_use]
    pub const fn reduced_ids(&self) -> (Option<u32>, Option<u32>) {
        (self.reduced_uid, self.reduced_gid)
    }

    /// Create a fresh output manager for one operation.
    #[must_use]
    pub fn create_output_manager(&self) -> Box<dyn OutputManager> {
        (self.output_factory)()
    }
}

/// Builder for [`Environment`].
pub struct EnvironmentBuilder {
    repositories: Vec<Arc<dyn Repository>>,
    accepted_keywords: BTreeSet<KeywordName>,
    accepted_licenses: BTreeSet<String>,
    user_masks: Vec<(PackageDepSpec, String)>,
    user_unmasks: Vec<PackageDepSpec>,
    choice_overrides: Vec<(PackageDepSpec, ChoiceNameWithPrefix, bool)>,
    world_file: Option<PathBuf>,
    user_sets: Vec<(SetName, SetSpecTree)>,
    hooks: Arc<dyn Hooks>,
    hook_dirs: Vec<PathBuf>,
    mirrors: BTreeMap<String, Vec<String>>,
    reduced_uid: Option<u32>,
    reduced_gid: Option<u32>,
    output_factory: OutputFactory,
}

impl Default for EnvironmentBuilder {
    fn default() -> Self {
        Self {
            repositories: Vec::new(),
            accepted_keywords: BTreeSet::new(),
            accepted_licenses: BTreeSet::new(),
            user_masks: Vec::new(),
            user_unmasks: Vec::new(),
            choice_overrides: Vec::new(),
            world_file: None,
            user_sets: Vec::new(),
            hooks: Arc::new(NullHooks),
            hook_dirs: Vec::new(),
            mirrors: BTreeMap::new(),
            reduced_uid: None,
            reduced_gid: None,
            output_factory: Arc::new(|| Box::new(StandardOutputManager::new())),
        }
    }
}

impl EnvironmentBuilder {
    /// Append a repository; earlier repositories are more important.
    #[must_use]
    pub fn repository(mut self, repo: Arc<dyn Repository>) -> Self {
        self.repositories.push(repo);
        self
    }

    /// Accept a keyword.
    #[must_use]
    pub fn accept_keyword(mut self, keyword: KeywordName) -> Self {
        self.accepted_keywords.insert(keyword);
        self
    }

    /// Accept a license (or `*`).
    #[must_use]
    pub fn accept_license(mut self, license: impl Into<String>) -> Self {
        self.accepted_licenses.insert(license.into());
        self
    }

    /// Mask everything matching a spec, with a configuration token.
    #[must_use]
    pub fn user_mask(mut self, spec: PackageDepSpec, token: impl Into<String>) -> Self {
        self.user_masks.push((spec, token.into()));
        self
    }

    /// Unmask everything matching a spec.
    #[must_use]
    pub fn user_unmask(mut self, spec: PackageDepSpec) -> Self {
        self.user_unmasks.push(spec);
        self
    }

    /// Override a choice for packages matching a spec.
    #[must_use]
    pub fn choice_override(
        mut self,
        spec: PackageDepSpec,
        flag: ChoiceNameWithPrefix,
        enabled: bool,
    ) -> Self {
        self.choice_overrides.push((spec, flag, enabled));
        self
    }

    /// Configure the world file location.
    #[must_use]
    pub fn world_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.world_file = Some(path.into());
        self
    }

    /// Register a user set.
    #[must_use]
    pub fn user_set(mut self, name: SetName, contents: SetSpecTree) -> Self {
        self.user_sets.push((name, contents));
        self
    }

    /// Install a hook implementation.
    #[must_use]
    pub fn hooks(mut self, hooks: Arc<dyn Hooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Add a hook search directory.
    #[must_use]
    pub fn hook_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.hook_dirs.push(dir.into());
        self
    }

    /// Register mirror URLs under a mirror name.
    #[must_use]
    pub fn mirror(mut self, name: impl Into<String>, urls: Vec<String>) -> Self {
        self.mirrors.insert(name.into(), urls);
        self
    }

    /// Configure the reduced-privilege uid/gid.
    #[must_use]
    pub const fn reduced_ids(mut self, uid: u32, gid: u32) -> Self {
        self.reduced_uid = Some(uid);
        self.reduced_gid = Some(gid);
        self
    }

    /// Install an output-manager factory.
    #[must_use]
    pub fn output_factory(mut self, factory: OutputFactory) -> Self {
        self.output_factory = factory;
        self
    }

    /// What: Finalise the environment.
    ///
    /// Details:
    /// - Repositories populate their sets in importance order; user sets
    ///   registered through the builder win over repository sets of the
    ///   same name.
    pub fn build(self) -> Result<Environment> {
        let mut sets = SetRegistry::new();
        for repo in &self.repositories {
            repo.populate_sets(&mut sets);
        }
        for (name, contents) in self.user_sets {
            sets.register(name, contents);
        }
        // `system` always resolves, even when nothing populated it.
        let system = SetName::new("system")?;
        if !sets.contains(&system) {
            sets.register(system, SetSpecTree::empty());
        }

        Ok(Environment {
            repositories: self.repositories,
            accepted_keywords: self.accepted_keywords,
            accepted_licenses: self.accepted_licenses,
            user_masks: self.user_masks,
            user_unmasks: self.user_unmasks,
            choice_overrides: self.choice_overrides,
            world: self.world_file.map(World::new),
            sets,
            hooks: self.hooks,
            hook_dirs: self.hook_dirs,
            mirrors: self.mirrors,
            reduced_uid: self.reduced_uid,
            reduced_gid: self.reduced_gid,
            output_factory: self.output_factory,
        })
    }
}
