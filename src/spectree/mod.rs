//! Spec trees: structured metadata values with conditional subtrees.
//!
//! Dependency, URI, license and plain-text metadata are trees whose inner
//! nodes are `All`, `Any`, `ExactlyOne` and `Conditional` groups and whose
//! leaves are kind-specific. Conditional subtrees are resolved against a
//! package's choice configuration; `Any` requires at least one child met,
//! `ExactlyOne` exactly one.

mod flatten;
mod sanitise;

pub use flatten::{evaluate, flatten};
pub use sanitise::{sanitise_dependencies, DependencyAlternative, SanitisedDependency, SanitisedSpec};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::choices::{ChangedChoices, Choices};
use crate::types::name::{ChoiceNameWithPrefix, SetName};
use crate::types::spec::{BlockDepSpec, PackageDepSpec};

/// A use-flag condition guarding a subtree (`flag? ( ... )` or
/// `!flag? ( ... )`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceCondition {
    /// The flag inspected by the condition.
    pub flag: ChoiceNameWithPrefix,
    /// Whether the condition is inverted (`!flag?`).
    pub inverse: bool,
}

impl ChoiceCondition {
    /// What: Evaluate the condition against a choice configuration.
    ///
    /// Inputs:
    /// - `choices`: The owning package's choices.
    /// - `changed`: Optional "what if" overlay.
    ///
    /// Output:
    /// - Returns `true` when the guarded subtree is active. A flag the
    ///   package does not declare reads as disabled.
    #[must_use]
    pub fn is_met(&self, choices: &Choices, changed: Option<&ChangedChoices>) -> bool {
        let state = match changed {
            Some(overlay) => overlay.effective(choices, &self.flag),
            None => choices.enabled(&self.flag),
        }
        .unwrap_or(false);
        state != self.inverse
    }
}

impl fmt::Display for ChoiceCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}?", if self.inverse { "!" } else { "" }, self.flag)
    }
}

/// A tree of kind-specific leaves under `All` / `Any` / `ExactlyOne` /
/// `Conditional` groups.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecTree<L> {
    /// Every child must be met.
    All(Vec<SpecTree<L>>),
    /// At least one child must be met.
    Any(Vec<SpecTree<L>>),
    /// Exactly one child must be met.
    ExactlyOne(Vec<SpecTree<L>>),
    /// Children apply only when the condition holds.
    Conditional {
        /// The guarding condition.
        condition: ChoiceCondition,
        /// The guarded children.
        children: Vec<SpecTree<L>>,
    },
    /// A kind-specific leaf.
    Leaf(L),
}

impl<L> SpecTree<L> {
    /// An empty tree (an `All` group with no children).
    #[must_use]
    pub const fn empty() -> Self {
        Self::All(Vec::new())
    }

    /// Whether the tree has no leaves at all, regardless of conditions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Leaf(_) => false,
            Self::All(c) | Self::Any(c) | Self::ExactlyOne(c) | Self::Conditional { children: c, .. } => {
                c.iter().all(Self::is_empty)
            }
        }
    }
}

impl<L: fmt::Display> fmt::Display for SpecTree<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn group<L: fmt::Display>(
            f: &mut fmt::Formatter<'_>,
            head: &str,
            children: &[SpecTree<L>],
        ) -> fmt::Result {
            f.write_str(head)?;
            f.write_str("( ")?;
            for child in children {
                write!(f, "{child} ")?;
            }
            f.write_str(")")
        }
        match self {
            Self::All(children) => group(f, "", children),
            Self::Any(children) => group(f, "|| ", children),
            Self::ExactlyOne(children) => group(f, "^^ ", children),
            Self::Conditional { condition, children } => {
                group(f, &format!("{condition} "), children)
            }
            Self::Leaf(leaf) => write!(f, "{leaf}"),
        }
    }
}

/// A dependency label: sets the context (build-time, run-time, ...) for
/// the leaves that follow it within its block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DependenciesLabel {
    /// Needed to build the package.
    Build,
    /// Needed while the package runs.
    Run,
    /// May be satisfied after the package itself.
    Post,
    /// Headers/libraries compiled against.
    CompileAgainst,
    /// Needed to fetch the package's sources.
    Fetch,
    /// Needed on the build host at install time.
    Install,
    /// Suggested, never required.
    Suggestion,
    /// Recommended, not required.
    Recommendation,
    /// Needed only when running tests.
    Test,
}

impl DependenciesLabel {
    /// The label's text form as written in dependency metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Run => "run",
            Self::Post => "post",
            Self::CompileAgainst => "compile-against",
            Self::Fetch => "fetch",
            Self::Install => "install",
            Self::Suggestion => "suggestion",
            Self::Recommendation => "recommendation",
            Self::Test => "test",
        }
    }

    /// Whether dependencies under this label must be ready before the
    /// depending package builds (a strict ordering arrow).
    #[must_use]
    pub const fn is_strict(self) -> bool {
        matches!(
            self,
            Self::Build | Self::CompileAgainst | Self::Fetch | Self::Install | Self::Test
        )
    }

    /// Whether this label marks an optional (never required) dependency.
    #[must_use]
    pub const fn is_optional(self) -> bool {
        matches!(self, Self::Suggestion | Self::Recommendation)
    }
}

impl fmt::Display for DependenciesLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A leaf of a dependency tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyLeaf {
    /// A package dependency.
    Package(PackageDepSpec),
    /// A block on another package.
    Block(BlockDepSpec),
    /// A label changing the context of following siblings.
    Label(Vec<DependenciesLabel>),
    /// A reference to a named set.
    NamedSet(SetName),
}

impl fmt::Display for DependencyLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Package(p) => write!(f, "{p}"),
            Self::Block(b) => write!(f, "{b}"),
            Self::Label(labels) => {
                let joined = labels
                    .iter()
                    .map(|l| l.as_str())
                    .collect::<Vec<_>>()
                    .join("+");
                write!(f, "{joined}:")
            }
            Self::NamedSet(s) => write!(f, "@{s}"),
        }
    }
}

/// How fetchable URIs following a fetch label are retrieved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchLabel {
    /// Try mirrors first, then the listed URI.
    MirrorsThenListed,
    /// Only the listed URI.
    ListedOnly,
    /// Must be fetched manually by the user.
    Manual,
}

/// A leaf of a fetchable-URI tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchableUriLeaf {
    /// A fetchable URI, optionally renamed on disk (`uri -> name`).
    Uri {
        /// The source URI.
        uri: String,
        /// Optional local filename.
        rename: Option<String>,
    },
    /// A label changing how following URIs are fetched.
    Label(FetchLabel),
}

impl fmt::Display for FetchableUriLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uri { uri, rename: Some(name) } => write!(f, "{uri} -> {name}"),
            Self::Uri { uri, rename: None } => write!(f, "{uri}"),
            Self::Label(FetchLabel::MirrorsThenListed) => f.write_str("mirrors-first:"),
            Self::Label(FetchLabel::ListedOnly) => f.write_str("listed-only:"),
            Self::Label(FetchLabel::Manual) => f.write_str("manual:"),
        }
    }
}

/// A leaf of a set tree: a package spec or a nested set reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetLeaf {
    /// A concrete package spec.
    Package(PackageDepSpec),
    /// A nested named set.
    Set(SetName),
}

impl fmt::Display for SetLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Package(p) => write!(f, "{p}"),
            Self::Set(s) => write!(f, "@{s}"),
        }
    }
}

/// Dependency metadata.
pub type DependencySpecTree = SpecTree<DependencyLeaf>;
/// Source URIs with fetch semantics.
pub type FetchableUriSpecTree = SpecTree<FetchableUriLeaf>;
/// Plain URIs (homepages).
pub type SimpleUriSpecTree = SpecTree<String>;
/// License metadata.
pub type LicenseSpecTree = SpecTree<String>;
/// Free-text metadata with conditional structure.
pub type PlainTextSpecTree = SpecTree<String>;
/// Legacy provided-virtuals metadata.
pub type ProvideSpecTree = SpecTree<PackageDepSpec>;
/// Named set contents.
pub type SetSpecTree = SpecTree<SetLeaf>;
