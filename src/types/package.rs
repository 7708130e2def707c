//! Package identity and metadata.
//!
//! A [`PackageId`] is an immutable handle to one version of one package
//! in one repository. It carries a collection of metadata keys by string
//! name; each key holds a typed [`MetadataValue`]. The handle is cheap to
//! clone (the data sits behind an `Arc`) and refers to its repository by
//! name only, never by owning pointer.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::spectree::{
    DependencySpecTree, FetchableUriSpecTree, LicenseSpecTree, PlainTextSpecTree, ProvideSpecTree,
    SimpleUriSpecTree,
};
use crate::types::choices::Choices;
use crate::types::contents::Contents;
use crate::types::mask::{Mask, OverriddenMask};
use crate::types::name::{KeywordName, QualifiedPackageName, RepositoryName, SlotName};
use crate::types::spec::{PackageDepSpec, VersionRequirementsMode};
use crate::types::version::{VersionOperator, VersionSpec};

/// The kinds of action a package may support.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Download the package's sources.
    Fetch,
    /// Build and merge the package.
    Install,
    /// Remove an installed package.
    Uninstall,
    /// Dry-run checks before an install.
    Pretend,
    /// Post-install configuration.
    Config,
    /// Display package information.
    Info,
}

impl ActionKind {
    /// The action's lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Pretend => "pretend",
            Self::Config => "config",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed metadata value. The variant is the key's declared type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataValue {
    /// Free text.
    String(String),
    /// A slot name.
    Slot(SlotName),
    /// Seconds since the epoch.
    Time(u64),
    /// A filesystem path.
    Path(PathBuf),
    /// A boolean.
    Bool(bool),
    /// An integer.
    Long(i64),
    /// An unordered set of strings.
    StringSet(BTreeSet<String>),
    /// An ordered sequence of strings.
    StringSequence(Vec<String>),
    /// A set of keywords.
    KeywordSet(BTreeSet<KeywordName>),
    /// A dependency tree.
    Dependencies(DependencySpecTree),
    /// A fetchable-URI tree.
    Fetches(FetchableUriSpecTree),
    /// A simple-URI tree.
    SimpleUris(SimpleUriSpecTree),
    /// A license tree.
    Licenses(LicenseSpecTree),
    /// A plain-text tree.
    PlainText(PlainTextSpecTree),
    /// A legacy provides tree.
    Provides(ProvideSpecTree),
    /// The package's choice groups.
    Choices(Choices),
    /// Recorded installed contents.
    Contents(Contents),
}

impl MetadataValue {
    /// What: A flat string rendering for `[.key=value]` matching.
    ///
    /// Output:
    /// - `Some` for scalar and flat-collection values (sets and
    ///   sequences join with single spaces); `None` for structured trees
    ///   that have no canonical flat form.
    #[must_use]
    pub fn flat_string(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Slot(s) => Some(s.to_string()),
            Self::Time(t) => Some(t.to_string()),
            Self::Path(p) => Some(p.display().to_string()),
            Self::Bool(b) => Some(if *b { "true".to_string() } else { "false".to_string() }),
            Self::Long(n) => Some(n.to_string()),
            Self::StringSet(s) => Some(s.iter().cloned().collect::<Vec<_>>().join(" ")),
            Self::StringSequence(s) => Some(s.join(" ")),
            Self::KeywordSet(s) => Some(
                s.iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            _ => None,
        }
    }
}

/// Well-known metadata key names. Repositories may add their own beyond
/// these.
pub mod keys {
    /// Slot.
    pub const SLOT: &str = "SLOT";
    /// Accepted-or-not keywords.
    pub const KEYWORDS: &str = "KEYWORDS";
    /// License tree.
    pub const LICENSE: &str = "LICENSE";
    /// Combined dependencies.
    pub const DEPENDENCIES: &str = "DEPENDENCIES";
    /// Build-time dependencies.
    pub const BUILD_DEPENDENCIES: &str = "DEPEND";
    /// Run-time dependencies.
    pub const RUN_DEPENDENCIES: &str = "RDEPEND";
    /// Post dependencies.
    pub const POST_DEPENDENCIES: &str = "PDEPEND";
    /// Suggested dependencies.
    pub const SUGGESTED_DEPENDENCIES: &str = "SDEPEND";
    /// Source URIs.
    pub const FETCHES: &str = "SRC_URI";
    /// Homepage URIs.
    pub const HOMEPAGE: &str = "HOMEPAGE";
    /// Short description.
    pub const DESCRIPTION: &str = "DESCRIPTION";
    /// Choice groups.
    pub const CHOICES: &str = "CHOICES";
    /// On-disk location of the package's metadata.
    pub const FS_LOCATION: &str = "FS_LOCATION";
    /// Installed contents.
    pub const CONTENTS: &str = "CONTENTS";
    /// Repositories the package was originally installed from.
    pub const FROM_REPOSITORIES: &str = "REPOSITORIES";
    /// Behaviour markers (e.g. `transient`).
    pub const BEHAVIOURS: &str = "BEHAVIOURS";
    /// Install timestamp.
    pub const INSTALLED_TIME: &str = "INSTALLED_TIME";
}

#[derive(Debug, Serialize, Deserialize)]
struct PackageIdData {
    repository: RepositoryName,
    name: QualifiedPackageName,
    version: VersionSpec,
    slot: Option<SlotName>,
    metadata: IndexMap<String, MetadataValue>,
    behaviours: BTreeSet<String>,
    masks: Vec<Mask>,
    overridden_masks: Vec<OverriddenMask>,
    supported_actions: BTreeSet<ActionKind>,
}

/// An immutable handle to one version of one package in one repository.
///
/// Identity is the `(repository, name, version, slot)` tuple; the
/// derived ordering additionally uses the repository name as an
/// arbitrary-but-stable tie-breaker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackageId {
    data: Arc<PackageIdData>,
}

impl PackageId {
    /// Start building a package id.
    #[must_use]
    pub fn builder(
        repository: RepositoryName,
        name: QualifiedPackageName,
        version: VersionSpec,
    ) -> PackageIdBuilder {
        PackageIdBuilder {
            data: PackageIdData {
                repository,
                name,
                version,
                slot: None,
                metadata: IndexMap::new(),
                behaviours: BTreeSet::new(),
                masks: Vec::new(),
                overridden_masks: Vec::new(),
                supported_actions: BTreeSet::new(),
            },
        }
    }

    /// The owning repository's name (a non-owning back-reference; resolve
    /// through the environment).
    #[must_use]
    pub fn repository_name(&self) -> &RepositoryName {
        &self.data.repository
    }

    /// The qualified package name.
    #[must_use]
    pub fn name(&self) -> &QualifiedPackageName {
        &self.data.name
    }

    /// The version.
    #[must_use]
    pub fn version(&self) -> &VersionSpec {
        &self.data.version
    }

    /// The slot, when the repository assigns one.
    #[must_use]
    pub fn slot(&self) -> Option<&SlotName> {
        self.data.slot.as_ref()
    }

    /// Look up a raw metadata value by key name.
    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<&MetadataValue> {
        self.data.metadata.get(key)
    }

    /// Iterate all metadata keys in declaration order.
    pub fn metadata_keys(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.data.metadata.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The slot key, when present and slot-typed.
    #[must_use]
    pub fn slot_key(&self) -> Option<&SlotName> {
        match self.metadata(keys::SLOT) {
            Some(MetadataValue::Slot(s)) => Some(s),
            _ => None,
        }
    }

    /// The keywords key, when present and keyword-set-typed.
    #[must_use]
    pub fn keywords_key(&self) -> Option<&BTreeSet<KeywordName>> {
        match self.metadata(keys::KEYWORDS) {
            Some(MetadataValue::KeywordSet(k)) => Some(k),
            _ => None,
        }
    }

    /// The license tree, when present.
    #[must_use]
    pub fn license_key(&self) -> Option<&LicenseSpecTree> {
        match self.metadata(keys::LICENSE) {
            Some(MetadataValue::Licenses(t)) => Some(t),
            _ => None,
        }
    }

    fn dependencies_at(&self, key: &str) -> Option<&DependencySpecTree> {
        match self.metadata(key) {
            Some(MetadataValue::Dependencies(t)) => Some(t),
            _ => None,
        }
    }

    /// The combined dependencies tree, when the repository provides one.
    #[must_use]
    pub fn dependencies_key(&self) -> Option<&DependencySpecTree> {
        self.dependencies_at(keys::DEPENDENCIES)
    }

    /// The build-time dependencies tree.
    #[must_use]
    pub fn build_dependencies_key(&self) -> Option<&DependencySpecTree> {
        self.dependencies_at(keys::BUILD_DEPENDENCIES)
    }

    /// The run-time dependencies tree.
    #[must_use]
    pub fn run_dependencies_key(&self) -> Option<&DependencySpecTree> {
        self.dependencies_at(keys::RUN_DEPENDENCIES)
    }

    /// The post dependencies tree.
    #[must_use]
    pub fn post_dependencies_key(&self) -> Option<&DependencySpecTree> {
        self.dependencies_at(keys::POST_DEPENDENCIES)
    }

    /// The suggested dependencies tree.
    #[must_use]
    pub fn suggested_dependencies_key(&self) -> Option<&DependencySpecTree> {
        self.dependencies_at(keys::SUGGESTED_DEPENDENCIES)
    }

    /// The source-URI tree.
    #[must_use]
    pub fn fetches_key(&self) -> Option<&FetchableUriSpecTree> {
        match self.metadata(keys::FETCHES) {
            Some(MetadataValue::Fetches(t)) => Some(t),
            _ => None,
        }
    }

    /// The homepage tree.
    #[must_use]
    pub fn homepage_key(&self) -> Option<&SimpleUriSpecTree> {
        match self.metadata(keys::HOMEPAGE) {
            Some(MetadataValue::SimpleUris(t)) => Some(t),
            _ => None,
        }
    }

    /// The short description.
    #[must_use]
    pub fn short_description_key(&self) -> Option<&str> {
        match self.metadata(keys::DESCRIPTION) {
            Some(MetadataValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// The choice groups.
    #[must_use]
    pub fn choices_key(&self) -> Option<&Choices> {
        match self.metadata(keys::CHOICES) {
            Some(MetadataValue::Choices(c)) => Some(c),
            _ => None,
        }
    }

    /// The on-disk metadata location.
    #[must_use]
    pub fn fs_location_key(&self) -> Option<&PathBuf> {
        match self.metadata(keys::FS_LOCATION) {
            Some(MetadataValue::Path(p)) => Some(p),
            _ => None,
        }
    }

    /// The recorded installed contents.
    #[must_use]
    pub fn contents_key(&self) -> Option<&Contents> {
        match self.metadata(keys::CONTENTS) {
            Some(MetadataValue::Contents(c)) => Some(c),
            _ => None,
        }
    }

    /// The repositories this package was originally installed from.
    #[must_use]
    pub fn from_repositories_key(&self) -> Option<&BTreeSet<String>> {
        match self.metadata(keys::FROM_REPOSITORIES) {
            Some(MetadataValue::StringSet(s)) => Some(s),
            _ => None,
        }
    }

    /// Behaviour markers.
    #[must_use]
    pub fn behaviours(&self) -> &BTreeSet<String> {
        &self.data.behaviours
    }

    /// Whether this is a transient installed package (one whose origin
    /// is temporary, treated as replaceable by the resolver).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.data.behaviours.contains("transient")
    }

    /// Masks attached by the repository (unsupported / repository kinds).
    /// User-level masks are computed by the environment on top of these.
    #[must_use]
    pub fn masks(&self) -> &[Mask] {
        &self.data.masks
    }

    /// Masks that applied but were overridden.
    #[must_use]
    pub fn overridden_masks(&self) -> &[OverriddenMask] {
        &self.data.overridden_masks
    }

    /// Whether this package supports an action kind.
    #[must_use]
    pub fn supports_action(&self, kind: ActionKind) -> bool {
        self.data.supported_actions.contains(&kind)
    }

    /// What: The spec that uniquely identifies this package.
    ///
    /// Output:
    /// - A spec matching exactly this `(repository, name, version, slot)`
    ///   tuple and nothing else. Two ids are equal iff their uniquely
    ///   identifying specs are equal.
    #[must_use]
    pub fn uniquely_identifying_spec(&self) -> PackageDepSpec {
        let mut builder = PackageDepSpec::builder()
            .package(self.data.name.clone())
            .version_requirement(VersionOperator::Equal, self.data.version.clone())
            .version_requirements_mode(VersionRequirementsMode::And)
            .in_repository(self.data.repository.clone());
        if let Some(slot) = &self.data.slot {
            builder = builder.slot(slot.clone());
        }
        builder.build()
    }
}

impl PartialEq for PackageId {
    fn eq(&self, other: &Self) -> bool {
        self.data.repository == other.data.repository
            && self.data.name == other.data.name
            && self.data.version == other.data.version
            && self.data.slot == other.data.slot
    }
}

impl Eq for PackageId {}

impl PartialOrd for PackageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Environment-free fallback ordering: name, version, repository *name*
/// (alphabetical), slot. This is not the canonical ordering, which
/// tie-breaks equal versions by repository importance and needs an
/// environment to consult; callers that have one use the
/// `repository_index()`-based comparators in `selection.rs` and
/// `resolver/decider.rs` instead. This impl exists so ids can live in
/// sorted containers away from any environment (e.g. a repository's own
/// version lists).
impl Ord for PackageId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.data
            .name
            .cmp(&other.data.name)
            .then_with(|| self.data.version.cmp(&other.data.version))
            .then_with(|| self.data.repository.cmp(&other.data.repository))
            .then_with(|| self.data.slot.cmp(&other.data.slot))
    }
}

impl std::hash::Hash for PackageId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.data.repository.hash(state);
        self.data.name.hash(state);
        self.data.version.hash(state);
        self.data.slot.hash(state);
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.data.name, self.data.version)?;
        if let Some(slot) = &self.data.slot {
            write!(f, ":{slot}")?;
        }
        write!(f, "::{}", self.data.repository)
    }
}

/// Builder for [`PackageId`] values, used by repository implementations.
#[derive(Debug)]
pub struct PackageIdBuilder {
    data: PackageIdData,
}

impl PackageIdBuilder {
    /// Set the slot.
    #[must_use]
    pub fn slot(mut self, slot: SlotName) -> Self {
        self.data.metadata.insert(keys::SLOT.to_string(), MetadataValue::Slot(slot.clone()));
        self.data.slot = Some(slot);
        self
    }

    /// Insert a metadata value under a key name.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.data.metadata.insert(key.into(), value);
        self
    }

    /// Add a behaviour marker.
    #[must_use]
    pub fn behaviour(mut self, marker: impl Into<String>) -> Self {
        self.data.behaviours.insert(marker.into());
        self
    }

    /// Attach a repository-imposed mask.
    #[must_use]
    pub fn mask(mut self, mask: Mask) -> Self {
        self.data.masks.push(mask);
        self
    }

    /// Record an overridden mask.
    #[must_use]
    pub fn overridden_mask(mut self, mask: OverriddenMask) -> Self {
        self.data.overridden_masks.push(mask);
        self
    }

    /// Declare a supported action kind.
    #[must_use]
    pub fn supports(mut self, kind: ActionKind) -> Self {
        self.data.supported_actions.insert(kind);
        self
    }

    /// Finish, producing the immutable handle.
    #[must_use]
    pub fn build(self) -> PackageId {
        PackageId {
            data: Arc::new(self.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(repo: &str, name: &str, version: &str, slot: Option<&str>) -> PackageId {
        let mut builder = PackageId::builder(
            RepositoryName::new(repo).unwrap(),
            QualifiedPackageName::new(name).unwrap(),
            VersionSpec::new(version).unwrap(),
        );
        if let Some(s) = slot {
            builder = builder.slot(SlotName::new(s).unwrap());
        }
        builder.build()
    }

    #[test]
    fn test_identity_tuple() {
        let a = id("repo", "cat/pkg", "1.0", Some("0"));
        let b = id("repo", "cat/pkg", "1.0", Some("0"));
        let c = id("repo", "cat/pkg", "1.0", Some("1"));
        let d = id("other", "cat/pkg", "1.0", Some("0"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_uniquely_identifying_spec_law() {
        let a = id("repo", "cat/pkg", "1.0-r1", Some("0"));
        let b = id("repo", "cat/pkg", "1.0-r1", Some("0"));
        let c = id("repo", "cat/pkg", "1.0-r2", Some("0"));
        assert_eq!(a.uniquely_identifying_spec(), b.uniquely_identifying_spec());
        assert_ne!(a.uniquely_identifying_spec(), c.uniquely_identifying_spec());
        assert_eq!(a.uniquely_identifying_spec().to_string(), "=cat/pkg-1.0-r1:0::repo");
    }

    #[test]
    fn test_ordering_by_version() {
        let old = id("repo", "cat/pkg", "1.0", None);
        let new = id("repo", "cat/pkg", "2.0", None);
        assert!(old < new);
    }

    #[test]
    fn test_typed_accessors() {
        let openssl = PackageId::builder(
            RepositoryName::new("repo").unwrap(),
            QualifiedPackageName::new("dev-libs/openssl").unwrap(),
            VersionSpec::new("3.0.1").unwrap(),
        )
        .slot(SlotName::new("0/3").unwrap())
        .metadata(
            keys::DESCRIPTION,
            MetadataValue::String("TLS toolkit".to_string()),
        )
        .behaviour("transient")
        .supports(ActionKind::Install)
        .build();

        assert_eq!(openssl.slot_key().unwrap().as_str(), "0/3");
        assert_eq!(openssl.short_description_key(), Some("TLS toolkit"));
        assert!(openssl.is_transient());
        assert!(openssl.supports_action(ActionKind::Install));
        assert!(!openssl.supports_action(ActionKind::Uninstall));
        assert!(openssl.dependencies_key().is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            id("gentoo", "cat/pkg", "1.2.3", Some("0")).to_string(),
            "cat/pkg-1.2.3:0::gentoo"
        );
    }
}
