//! In-memory repository, used by tests, demos and transient trees.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::Result;
use crate::output::OutputManager;
use crate::repository::{Destination, MergeParams, Repository};
use crate::sets::SetRegistry;
use crate::spectree::SetSpecTree;
use crate::types::contents::Contents;
use crate::types::name::{CategoryNamePart, QualifiedPackageName, RepositoryName, SetName};
use crate::types::package::{ActionKind, MetadataValue, PackageId};
use crate::types::package::keys;

#[derive(Default)]
struct Inner {
    packages: BTreeMap<QualifiedPackageName, Vec<PackageId>>,
    sets: Vec<(SetName, SetSpecTree)>,
}

/// An in-memory repository backed by a map.
///
/// Covers both roles: an installable source of packages, or (given an
/// installed root) a live installed tree that can act as a merge
/// destination.
pub struct MemoryRepository {
    name: RepositoryName,
    installed_root: Option<PathBuf>,
    default_destination: bool,
    inner: RwLock<Inner>,
}

impl MemoryRepository {
    /// An installable repository with the given name.
    #[must_use]
    pub fn new(name: RepositoryName) -> Self {
        Self {
            name,
            installed_root: None,
            default_destination: false,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// An installed-tree repository rooted at `root`, acting as the
    /// default merge destination.
    #[must_use]
    pub fn installed(name: RepositoryName, root: impl Into<PathBuf>) -> Self {
        Self {
            name,
            installed_root: Some(root.into()),
            default_destination: true,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// What: Add a package id to the repository.
    ///
    /// Inputs:
    /// - `id`: The id to add. Its repository name should match this
    ///   repository's.
    ///
    /// Details:
    /// - An existing id with the same `(name, version, slot)` is
    ///   replaced, preserving the at-most-one invariant.
    pub fn add(&self, id: PackageId) {
        let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let versions = inner.packages.entry(id.name().clone()).or_default();
        versions.retain(|existing| existing != &id);
        versions.push(id);
        versions.sort();
    }

    /// Remove a package id, returning whether it was present.
    pub fn remove(&self, id: &PackageId) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        match inner.packages.get_mut(id.name()) {
            Some(versions) => {
                let before = versions.len();
                versions.retain(|existing| existing != id);
                let removed = versions.len() != before;
                if versions.is_empty() {
                    inner.packages.remove(id.name());
                }
                removed
            }
            None => false,
        }
    }

    /// Attach recorded contents to an installed id, replacing the stored
    /// handle.
    pub fn record_contents(&self, id: &PackageId, contents: Contents) {
        let rebuilt = clone_with(id, |builder| {
            builder.metadata(keys::CONTENTS, MetadataValue::Contents(contents))
        });
        self.add(rebuilt);
    }

    /// Register a named set this repository provides.
    pub fn add_set(&self, name: SetName, contents: SetSpecTree) {
        let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.sets.push((name, contents));
    }

    fn is_installed_tree(&self) -> bool {
        self.installed_root.is_some()
    }
}

/// Rebuild an id, letting `adjust` extend the builder, preserving
/// repository, name, version, slot, metadata, behaviours and supported
/// actions.
fn clone_with(
    id: &PackageId,
    adjust: impl FnOnce(crate::types::package::PackageIdBuilder) -> crate::types::package::PackageIdBuilder,
) -> PackageId {
    let mut builder = PackageId::builder(
        id.repository_name().clone(),
        id.name().clone(),
        id.version().clone(),
    );
    if let Some(slot) = id.slot() {
        builder = builder.slot(slot.clone());
    }
    for (key, value) in id.metadata_keys() {
        if key != keys::SLOT {
            builder = builder.metadata(key, value.clone());
        }
    }
    for behaviour in id.behaviours() {
        builder = builder.behaviour(behaviour.clone());
    }
    for kind in [
        ActionKind::Fetch,
        ActionKind::Install,
        ActionKind::Uninstall,
        ActionKind::Pretend,
        ActionKind::Config,
        ActionKind::Info,
    ] {
        if id.supports_action(kind) {
            builder = builder.supports(kind);
        }
    }
    for mask in id.masks() {
        builder = builder.mask(mask.clone());
    }
    adjust(builder).build()
}

impl Repository for MemoryRepository {
    fn name(&self) -> &RepositoryName {
        &self.name
    }

    fn has_category(&self, category: &CategoryNamePart) -> bool {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.packages.keys().any(|q| q.category == *category)
    }

    fn has_package(&self, name: &QualifiedPackageName) -> bool {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.packages.contains_key(name)
    }

    fn category_names(&self) -> Vec<CategoryNamePart> {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let categories: BTreeSet<_> = inner.packages.keys().map(|q| q.category.clone()).collect();
        categories.into_iter().collect()
    }

    fn package_names(&self, category: &CategoryNamePart) -> Vec<QualifiedPackageName> {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner
            .packages
            .keys()
            .filter(|q| q.category == *category)
            .cloned()
            .collect()
    }

    fn package_ids(&self, name: &QualifiedPackageName) -> Vec<PackageId> {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.packages.get(name).cloned().unwrap_or_default()
    }

    fn some_ids_might_support_action(&self, kind: ActionKind) -> bool {
        match kind {
            ActionKind::Uninstall | ActionKind::Config => self.is_installed_tree(),
            ActionKind::Fetch | ActionKind::Install | ActionKind::Pretend => {
                !self.is_installed_tree()
            }
            ActionKind::Info => true,
        }
    }

    fn installed_root(&self) -> Option<&Path> {
        self.installed_root.as_deref()
    }

    fn sync(&self, output: &mut dyn OutputManager) -> Result<bool> {
        // Nothing upstream to talk to.
        output.message(
            crate::output::MessageKind::Info,
            &format!("repository {} has no upstream to sync", self.name),
        );
        Ok(false)
    }

    fn populate_sets(&self, sets: &mut SetRegistry) {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        for (name, contents) in &inner.sets {
            sets.register(name.clone(), contents.clone());
        }
    }

    fn destination(&self) -> Option<&dyn Destination> {
        if self.is_installed_tree() {
            Some(self)
        } else {
            None
        }
    }
}

impl Destination for MemoryRepository {
    fn is_suitable_destination_for(&self, id: &PackageId) -> bool {
        self.is_installed_tree() && id.supports_action(ActionKind::Install)
    }

    fn is_default_destination(&self) -> bool {
        self.default_destination
    }

    fn merge(&self, params: MergeParams<'_>) -> Result<()> {
        tracing::debug!(
            "merging {} into {} (replacing {} ids)",
            params.id,
            self.name,
            params.replacing.len()
        );

        // Replace any installed id sharing the origin's name and slot.
        let superseded: Vec<PackageId> = self
            .package_ids(params.id.name())
            .into_iter()
            .filter(|existing| existing.slot() == params.id.slot())
            .collect();
        for old in &superseded {
            self.remove(old);
        }

        let mut from_repositories = BTreeSet::new();
        from_repositories.insert(params.id.repository_name().to_string());

        let installed_name = self.name.clone();
        let installed = clone_with_repository(params.id, installed_name, from_repositories);
        self.add(installed);
        params.output.succeeded();
        Ok(())
    }
}

/// Rebuild an origin id as an installed id in `repository`.
fn clone_with_repository(
    id: &PackageId,
    repository: RepositoryName,
    from_repositories: BTreeSet<String>,
) -> PackageId {
    let mut builder = PackageId::builder(repository, id.name().clone(), id.version().clone());
    if let Some(slot) = id.slot() {
        builder = builder.slot(slot.clone());
    }
    for (key, value) in id.metadata_keys() {
        if key != keys::SLOT && key != keys::FROM_REPOSITORIES {
            builder = builder.metadata(key, value.clone());
        }
    }
    for behaviour in id.behaviours() {
        builder = builder.behaviour(behaviour.clone());
    }
    builder
        .metadata(
            keys::FROM_REPOSITORIES,
            MetadataValue::StringSet(from_repositories),
        )
        .supports(ActionKind::Uninstall)
        .supports(ActionKind::Config)
        .supports(ActionKind::Info)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::BufferedOutputManager;
    use crate::types::version::VersionSpec;

    fn repo() -> MemoryRepository {
        MemoryRepository::new(RepositoryName::new("testrepo").unwrap())
    }

    fn id(repo_name: &str, name: &str, version: &str) -> PackageId {
        PackageId::builder(
            RepositoryName::new(repo_name).unwrap(),
            QualifiedPackageName::new(name).unwrap(),
            VersionSpec::new(version).unwrap(),
        )
        .supports(ActionKind::Install)
        .supports(ActionKind::Fetch)
        .build()
    }

    #[test]
    fn test_add_and_query() {
        let repository = repo();
        repository.add(id("testrepo", "cat/pkg", "1.0"));
        repository.add(id("testrepo", "cat/pkg", "2.0"));
        repository.add(id("testrepo", "other/thing", "1.0"));

        let name = QualifiedPackageName::new("cat/pkg").unwrap();
        assert!(repository.has_package(&name));
        assert!(repository.has_category(&CategoryNamePart::new("other").unwrap()));
        assert_eq!(repository.package_ids(&name).len(), 2);
        assert_eq!(repository.category_names().len(), 2);

        // Ids come back in version order.
        let versions: Vec<String> = repository
            .package_ids(&name)
            .iter()
            .map(|i| i.version().to_string())
            .collect();
        assert_eq!(versions, vec!["1.0", "2.0"]);
    }

    #[test]
    fn test_add_replaces_same_identity() {
        let repository = repo();
        repository.add(id("testrepo", "cat/pkg", "1.0"));
        repository.add(id("testrepo", "cat/pkg", "1.0"));
        let name = QualifiedPackageName::new("cat/pkg").unwrap();
        assert_eq!(repository.package_ids(&name).len(), 1);
    }

    #[test]
    fn test_remove() {
        let repository = repo();
        let pkg = id("testrepo", "cat/pkg", "1.0");
        repository.add(pkg.clone());
        assert!(repository.remove(&pkg));
        assert!(!repository.remove(&pkg));
        assert!(!repository.has_package(pkg.name()));
    }

    #[test]
    fn test_installable_repo_is_not_a_destination() {
        let repository = repo();
        assert!(repository.destination().is_none());
        assert!(repository.some_ids_might_support_action(ActionKind::Install));
        assert!(!repository.some_ids_might_support_action(ActionKind::Uninstall));
    }

    #[test]
    fn test_merge_into_installed_tree() {
        let installed = MemoryRepository::installed(
            RepositoryName::new("installed").unwrap(),
            "/",
        );
        assert!(installed.some_ids_might_support_action(ActionKind::Uninstall));
        let destination = installed.destination().expect("installed tree is a destination");
        assert!(destination.is_default_destination());

        let origin = id("testrepo", "cat/pkg", "1.0");
        let mut output = BufferedOutputManager::new();
        destination
            .merge(MergeParams {
                id: &origin,
                image_dir: Path::new("/tmp/image"),
                replacing: &[],
                output: &mut output,
            })
            .unwrap();

        let name = QualifiedPackageName::new("cat/pkg").unwrap();
        let merged = installed.package_ids(&name);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].repository_name().as_str(), "installed");
        assert!(merged[0].supports_action(ActionKind::Uninstall));
        assert!(!merged[0].supports_action(ActionKind::Install));
        assert!(merged[0]
            .from_repositories_key()
            .unwrap()
            .contains("testrepo"));
        assert!(output.succeeded);
    }
}
