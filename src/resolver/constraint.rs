//! Constraints: the conditions a resolution must satisfy.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::resolver::reason::Reason;
use crate::resolver::resolvent::DestinationType;
use crate::selection::{match_package_in, MatchContext};
use crate::types::package::PackageId;
use crate::types::spec::{BlockDepSpec, PackageDepSpec};

/// When an already-installed id may satisfy a constraint instead of a
/// fresh install. Ordered from least to most permissive; composed
/// constraints use the least permissive value present.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UseExisting {
    /// Never reuse; always reinstall or upgrade.
    Never,
    /// Reuse only transient (temporarily-provided) installs.
    OnlyIfTransient,
    /// Reuse only an install equal to what would be chosen.
    IfSame,
    /// Reuse only an install of the same version (revisions ignored).
    IfSameVersion,
    /// Reuse whenever something installed satisfies the spec.
    IfPossible,
}

/// The spec position of a constraint: a requirement or a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintSpec {
    /// Something matching this must be present.
    Package(PackageDepSpec),
    /// Nothing matching this may remain installed.
    Block(BlockDepSpec),
}

impl ConstraintSpec {
    /// The underlying package spec, for either polarity.
    #[must_use]
    pub const fn spec(&self) -> &PackageDepSpec {
        match self {
            Self::Package(spec) => spec,
            Self::Block(block) => &block.blocked,
        }
    }

    /// Whether this is a block.
    #[must_use]
    pub const fn is_block(&self) -> bool {
        matches!(self, Self::Block(_))
    }
}

impl fmt::Display for ConstraintSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Package(spec) => write!(f, "{spec}"),
            Self::Block(block) => write!(f, "{block}"),
        }
    }
}

/// One condition on a resolvent's decision, with its cause. Constraints
/// for a resolvent compose by *and*.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    /// The requirement or block.
    pub spec: ConstraintSpec,
    /// Whether deciding "nothing" also satisfies this constraint.
    pub nothing_is_fine_too: bool,
    /// When an existing install may satisfy this constraint.
    pub use_existing: UseExisting,
    /// The destination the constraint applies to.
    pub to_destination: DestinationType,
    /// Whether a decision driven by this constraint will be executed
    /// (as opposed to merely reported, e.g. an untaken suggestion).
    pub taken: bool,
    /// Where the constraint came from.
    pub reason: Reason,
}

impl Constraint {
    /// What: Whether a candidate id satisfies this constraint.
    ///
    /// Details:
    /// - A package constraint is satisfied by ids matching its spec; a
    ///   block constraint by ids *not* matching. Dependency reasons
    ///   supply the consumer context for `[flag?]` / `[flag=]`
    ///   requirements.
    #[must_use]
    pub fn allows_id(&self, env: &Environment, id: &PackageId) -> bool {
        let context = self.reason.dependency().map(|(from_id, ..)| MatchContext {
            consumer: from_id,
            changed: None,
        });
        let matched = match_package_in(env, self.spec.spec(), id, context.as_ref());
        match self.spec {
            ConstraintSpec::Package(_) => matched,
            ConstraintSpec::Block(_) => !matched,
        }
    }
}

/// Compose the effective `use_existing` of a constraint set: the least
/// permissive value present, or the default when there are none.
#[must_use]
pub fn effective_use_existing(constraints: &[Constraint], default: UseExisting) -> UseExisting {
    constraints
        .iter()
        .map(|c| c.use_existing)
        .min()
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_use_existing_permissiveness_order() {
        assert!(UseExisting::Never < UseExisting::OnlyIfTransient);
        assert!(UseExisting::OnlyIfTransient < UseExisting::IfSame);
        assert!(UseExisting::IfSame < UseExisting::IfSameVersion);
        assert!(UseExisting::IfSameVersion < UseExisting::IfPossible);
    }

    #[test]
    fn test_effective_use_existing_takes_least_permissive() {
        let mk = |use_existing| Constraint {
            spec: ConstraintSpec::Package(PackageDepSpec::builder().build()),
            nothing_is_fine_too: false,
            use_existing,
            to_destination: DestinationType::InstallToSlash,
            taken: true,
            reason: Reason::target("test"),
        };
        let constraints = vec![mk(UseExisting::IfPossible), mk(UseExisting::IfSame)];
        assert_eq!(
            effective_use_existing(&constraints, UseExisting::IfPossible),
            UseExisting::IfSame
        );
        assert_eq!(
            effective_use_existing(&[], UseExisting::IfSameVersion),
            UseExisting::IfSameVersion
        );
    }
}
