//! Structured package dependency specifications.
//!
//! A [`PackageDepSpec`] is an immutable, already-parsed package reference:
//! a name constraint (possibly wildcarded), version requirements, a slot
//! requirement, repository and path requirements, choice requirements and
//! key requirements. Parsing concrete text syntaxes is a collaborator's
//! job; the core consumes structured specs and [`PackageDepSpecBuilder`]
//! produces new specs from partial data.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::name::{
    CategoryNamePart, ChoiceNameWithPrefix, PackageNamePart, QualifiedPackageName, RepositoryName,
    SlotName,
};
use crate::types::version::{VersionOperator, VersionSpec};

/// The name position of a spec: exact, wildcarded, or fully open.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NameConstraint {
    /// `cat/pkg`
    Exact(QualifiedPackageName),
    /// `cat/*`
    AnyPackage(CategoryNamePart),
    /// `*/pkg`
    AnyCategory(PackageNamePart),
    /// `*/*`
    Any,
}

impl NameConstraint {
    /// Whether a qualified name satisfies this constraint.
    #[must_use]
    pub fn matches(&self, name: &QualifiedPackageName) -> bool {
        match self {
            Self::Exact(q) => q == name,
            Self::AnyPackage(c) => *c == name.category,
            Self::AnyCategory(p) => *p == name.package,
            Self::Any => true,
        }
    }
}

impl fmt::Display for NameConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(q) => write!(f, "{q}"),
            Self::AnyPackage(c) => write!(f, "{c}/*"),
            Self::AnyCategory(p) => write!(f, "*/{p}"),
            Self::Any => f.write_str("*/*"),
        }
    }
}

/// One `(operator, version)` requirement.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionRequirement {
    /// The comparison operator.
    pub op: VersionOperator,
    /// The constraint version.
    pub version: VersionSpec,
}

impl VersionRequirement {
    /// Whether a candidate version satisfies this requirement.
    #[must_use]
    pub fn matches(&self, have: &VersionSpec) -> bool {
        self.op.matches(have, &self.version)
    }
}

impl fmt::Display for VersionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op, self.version)
    }
}

/// How multiple version requirements combine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionRequirementsMode {
    /// All requirements must hold.
    #[default]
    And,
    /// At least one requirement must hold.
    Or,
}

/// The slot position of a spec.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotRequirement {
    /// `:slot` — this exact slot.
    Exact(SlotName),
    /// `:*` — any slot is acceptable.
    AnySlot,
    /// `:=` — any slot, but rebuild when the chosen slot changes.
    Locked,
}

impl fmt::Display for SlotRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(s) => write!(f, ":{s}"),
            Self::AnySlot => f.write_str(":*"),
            Self::Locked => f.write_str(":="),
        }
    }
}

/// A `[flag]`-style choice requirement.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChoiceRequirement {
    /// `[flag]`: the flag must be enabled on the candidate.
    Enabled(ChoiceNameWithPrefix),
    /// `[-flag]`: the flag must be disabled on the candidate.
    Disabled(ChoiceNameWithPrefix),
    /// `[flag?]`: if the consumer has the flag enabled, the candidate
    /// must too.
    IfMineThenTheirs(ChoiceNameWithPrefix),
    /// `[flag=]`: the candidate's flag state must equal the consumer's.
    Equal(ChoiceNameWithPrefix),
}

impl ChoiceRequirement {
    /// The flag this requirement inspects.
    #[must_use]
    pub const fn flag(&self) -> &ChoiceNameWithPrefix {
        match self {
            Self::Enabled(f) | Self::Disabled(f) | Self::IfMineThenTheirs(f) | Self::Equal(f) => f,
        }
    }
}

impl fmt::Display for ChoiceRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled(n) => write!(f, "[{n}]"),
            Self::Disabled(n) => write!(f, "[-{n}]"),
            Self::IfMineThenTheirs(n) => write!(f, "[{n}?]"),
            Self::Equal(n) => write!(f, "[{n}=]"),
        }
    }
}

/// A `[.key=value]` metadata key requirement.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRequirement {
    /// The raw metadata key name.
    pub key: String,
    /// The value the key's string form must equal.
    pub value: String,
}

impl fmt::Display for KeyRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[.{}={}]", self.key, self.value)
    }
}

/// A structured package reference.
///
/// Immutable; use [`PackageDepSpec::builder`] to construct one, or
/// [`PackageDepSpec::rebuild`] to derive a modified copy.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageDepSpec {
    pub(crate) name: NameConstraint,
    pub(crate) version_requirements: Vec<VersionRequirement>,
    pub(crate) version_requirements_mode: VersionRequirementsMode,
    pub(crate) slot: Option<SlotRequirement>,
    pub(crate) in_repository: Option<RepositoryName>,
    pub(crate) from_repository: Option<RepositoryName>,
    pub(crate) installed_at_path: Option<PathBuf>,
    pub(crate) installable_to_repository: Option<RepositoryName>,
    pub(crate) installable_to_path: Option<PathBuf>,
    pub(crate) choice_requirements: Vec<ChoiceRequirement>,
    pub(crate) key_requirements: Vec<KeyRequirement>,
}

impl PackageDepSpec {
    /// Start building a spec.
    #[must_use]
    pub fn builder() -> PackageDepSpecBuilder {
        PackageDepSpecBuilder::default()
    }

    /// Shorthand for a bare `cat/pkg` spec with no further requirements.
    #[must_use]
    pub fn simple(name: QualifiedPackageName) -> Self {
        Self::builder().package(name).build()
    }

    /// Derive a builder seeded with this spec's requirements.
    #[must_use]
    pub fn rebuild(&self) -> PackageDepSpecBuilder {
        PackageDepSpecBuilder { spec: self.clone() }
    }

    /// The name constraint.
    #[must_use]
    pub const fn name_constraint(&self) -> &NameConstraint {
        &self.name
    }

    /// The exact qualified name, when the name position is not wildcarded.
    #[must_use]
    pub const fn package_name(&self) -> Option<&QualifiedPackageName> {
        match &self.name {
            NameConstraint::Exact(q) => Some(q),
            _ => None,
        }
    }

    /// The version requirements, combined per
    /// [`version_requirements_mode`](Self::version_requirements_mode).
    #[must_use]
    pub fn version_requirements(&self) -> &[VersionRequirement] {
        &self.version_requirements
    }

    /// How the version requirements combine.
    #[must_use]
    pub const fn version_requirements_mode(&self) -> VersionRequirementsMode {
        self.version_requirements_mode
    }

    /// The slot requirement, if any.
    #[must_use]
    pub const fn slot_requirement(&self) -> Option<&SlotRequirement> {
        self.slot.as_ref()
    }

    /// The `::repo` requirement, if any.
    #[must_use]
    pub const fn in_repository(&self) -> Option<&RepositoryName> {
        self.in_repository.as_ref()
    }

    /// The originally-installed-from repository requirement, if any.
    #[must_use]
    pub const fn from_repository(&self) -> Option<&RepositoryName> {
        self.from_repository.as_ref()
    }

    /// The installed-at-path requirement, if any.
    #[must_use]
    pub const fn installed_at_path(&self) -> Option<&PathBuf> {
        self.installed_at_path.as_ref()
    }

    /// The installable-to-repository requirement, if any.
    #[must_use]
    pub const fn installable_to_repository(&self) -> Option<&RepositoryName> {
        self.installable_to_repository.as_ref()
    }

    /// The installable-to-path requirement, if any.
    #[must_use]
    pub const fn installable_to_path(&self) -> Option<&PathBuf> {
        self.installable_to_path.as_ref()
    }

    /// The `[flag]` requirements.
    #[must_use]
    pub fn choice_requirements(&self) -> &[ChoiceRequirement] {
        &self.choice_requirements
    }

    /// The `[.key=value]` requirements.
    #[must_use]
    pub fn key_requirements(&self) -> &[KeyRequirement] {
        &self.key_requirements
    }

    /// What: Check a version against this spec's version requirements.
    ///
    /// Inputs:
    /// - `have`: Candidate version.
    ///
    /// Output:
    /// - Returns `true` when the requirements (combined by the spec's
    ///   and/or mode) accept the version. No requirements accept all.
    #[must_use]
    pub fn version_requirements_match(&self, have: &VersionSpec) -> bool {
        if self.version_requirements.is_empty() {
            return true;
        }
        match self.version_requirements_mode {
            VersionRequirementsMode::And => {
                self.version_requirements.iter().all(|r| r.matches(have))
            }
            VersionRequirementsMode::Or => {
                self.version_requirements.iter().any(|r| r.matches(have))
            }
        }
    }
}

impl fmt::Display for PackageDepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // A single and-combined requirement renders as a prefix operator:
        // ">=cat/pkg-1.2". Anything else renders bracketed after the name.
        let prefix_req = match (self.version_requirements.len(), self.version_requirements_mode) {
            (1, VersionRequirementsMode::And) => self.version_requirements.first(),
            _ => None,
        };
        if let Some(req) = prefix_req {
            write!(f, "{}{}-{}", req.op, self.name, req.version)?;
        } else {
            write!(f, "{}", self.name)?;
        }
        if let Some(slot) = &self.slot {
            write!(f, "{slot}")?;
        }
        if let Some(r) = &self.in_repository {
            write!(f, "::{r}")?;
        }
        if let Some(r) = &self.from_repository {
            write!(f, "::{r}->")?;
        }
        if let Some(p) = &self.installed_at_path {
            write!(f, "::{}", p.display())?;
        }
        if let Some(r) = &self.installable_to_repository {
            write!(f, "::->{r}")?;
        }
        if let Some(p) = &self.installable_to_path {
            write!(f, "::->{}", p.display())?;
        }
        if prefix_req.is_none() && !self.version_requirements.is_empty() {
            let sep = match self.version_requirements_mode {
                VersionRequirementsMode::And => "&",
                VersionRequirementsMode::Or => "|",
            };
            let reqs = self
                .version_requirements
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(sep);
            write!(f, "[{reqs}]")?;
        }
        for c in &self.choice_requirements {
            write!(f, "{c}")?;
        }
        for k in &self.key_requirements {
            write!(f, "{k}")?;
        }
        Ok(())
    }
}

/// Builder producing immutable [`PackageDepSpec`] values from partial
/// data.
#[derive(Clone, Debug)]
pub struct PackageDepSpecBuilder {
    spec: PackageDepSpec,
}

impl Default for PackageDepSpecBuilder {
    fn default() -> Self {
        Self {
            spec: PackageDepSpec {
                name: NameConstraint::Any,
                version_requirements: Vec::new(),
                version_requirements_mode: VersionRequirementsMode::And,
                slot: None,
                in_repository: None,
                from_repository: None,
                installed_at_path: None,
                installable_to_repository: None,
                installable_to_path: None,
                choice_requirements: Vec::new(),
                key_requirements: Vec::new(),
            },
        }
    }
}

impl PackageDepSpecBuilder {
    /// Constrain to an exact qualified name.
    #[must_use]
    pub fn package(mut self, name: QualifiedPackageName) -> Self {
        self.spec.name = NameConstraint::Exact(name);
        self
    }

    /// Constrain to a category, any package (`cat/*`).
    #[must_use]
    pub fn any_package_in(mut self, category: CategoryNamePart) -> Self {
        self.spec.name = NameConstraint::AnyPackage(category);
        self
    }

    /// Constrain to a package name in any category (`*/pkg`).
    #[must_use]
    pub fn any_category_of(mut self, package: PackageNamePart) -> Self {
        self.spec.name = NameConstraint::AnyCategory(package);
        self
    }

    /// Add one `(operator, version)` requirement.
    #[must_use]
    pub fn version_requirement(mut self, op: VersionOperator, version: VersionSpec) -> Self {
        self.spec.version_requirements.push(VersionRequirement { op, version });
        self
    }

    /// Set how version requirements combine.
    #[must_use]
    pub fn version_requirements_mode(mut self, mode: VersionRequirementsMode) -> Self {
        self.spec.version_requirements_mode = mode;
        self
    }

    /// Require an exact slot.
    #[must_use]
    pub fn slot(mut self, slot: SlotName) -> Self {
        self.spec.slot = Some(SlotRequirement::Exact(slot));
        self
    }

    /// Accept any slot (`:*`).
    #[must_use]
    pub fn any_slot(mut self) -> Self {
        self.spec.slot = Some(SlotRequirement::AnySlot);
        self
    }

    /// Accept any slot, rebuilding on slot change (`:=`).
    #[must_use]
    pub fn locked_slot(mut self) -> Self {
        self.spec.slot = Some(SlotRequirement::Locked);
        self
    }

    /// Require residence in a repository.
    #[must_use]
    pub fn in_repository(mut self, repo: RepositoryName) -> Self {
        self.spec.in_repository = Some(repo);
        self
    }

    /// Require original installation from a repository.
    #[must_use]
    pub fn from_repository(mut self, repo: RepositoryName) -> Self {
        self.spec.from_repository = Some(repo);
        self
    }

    /// Require installation at a root path.
    #[must_use]
    pub fn installed_at_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.spec.installed_at_path = Some(path.into());
        self
    }

    /// Require installability into a repository.
    #[must_use]
    pub fn installable_to_repository(mut self, repo: RepositoryName) -> Self {
        self.spec.installable_to_repository = Some(repo);
        self
    }

    /// Require installability to a root path.
    #[must_use]
    pub fn installable_to_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.spec.installable_to_path = Some(path.into());
        self
    }

    /// Add a choice requirement.
    #[must_use]
    pub fn choice(mut self, requirement: ChoiceRequirement) -> Self {
        self.spec.choice_requirements.push(requirement);
        self
    }

    /// Add a `[.key=value]` requirement.
    #[must_use]
    pub fn key(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.key_requirements.push(KeyRequirement {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Finish, producing the immutable spec.
    #[must_use]
    pub fn build(self) -> PackageDepSpec {
        self.spec
    }
}

/// A block on another package: the blocked spec must not be installed at
/// the same time. Weak blocks may be deferred to uninstall ordering;
/// strong blocks may not.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockDepSpec {
    /// The spec describing what is blocked.
    pub blocked: PackageDepSpec,
    /// Whether the block is strong (`!!`) rather than weak (`!`).
    pub strong: bool,
}

impl fmt::Display for BlockDepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", if self.strong { "!!" } else { "!" }, self.blocked)
    }
}
