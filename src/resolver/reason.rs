//! Reasons: the provenance of a constraint.

use serde::{Deserialize, Serialize};

use crate::resolver::resolvent::Resolvent;
use crate::spectree::SanitisedDependency;
use crate::types::name::SetName;
use crate::types::package::PackageId;

/// Why a constraint exists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reason {
    /// The user asked for it.
    Target {
        /// The target as the user wrote it.
        text: String,
    },
    /// A dependency of something being resolved.
    Dependency {
        /// The id whose dependency this is.
        from_id: PackageId,
        /// The resolvent the id was chosen for.
        from_resolvent: Resolvent,
        /// The sanitised dependency that produced the constraint.
        dependency: SanitisedDependency,
        /// Whether the dependency was already satisfied by an installed
        /// id when the constraint was made.
        already_met: bool,
    },
    /// Removal forced because a removed id is depended upon.
    Dependent {
        /// The id being removed that this package depends on.
        id_being_removed: PackageId,
    },
    /// Removal of something only the removed ids were using.
    WasUsedBy {
        /// The ids that used this package.
        ids: Vec<PackageId>,
    },
    /// Preloaded by the driver (e.g. after a restart).
    Preset {
        /// Human explanation.
        explanation: String,
        /// The reason the preload stands in for, when known.
        inner: Option<Box<Reason>>,
    },
    /// Came from expanding a named set.
    Set {
        /// The set being expanded.
        set: SetName,
        /// The reason the set itself was pulled in.
        inner: Box<Reason>,
    },
}

impl Reason {
    /// A target reason from user-facing text.
    #[must_use]
    pub fn target(text: impl Into<String>) -> Self {
        Self::Target { text: text.into() }
    }

    /// Whether this reason chain bottoms out at an explicit target.
    #[must_use]
    pub fn is_target(&self) -> bool {
        match self {
            Self::Target { .. } => true,
            Self::Set { inner, .. } => inner.is_target(),
            Self::Preset { inner, .. } => inner.as_deref().is_some_and(Self::is_target),
            _ => false,
        }
    }

    /// The dependency details, when this is a dependency reason.
    #[must_use]
    pub const fn dependency(&self) -> Option<(&PackageId, &Resolvent, &SanitisedDependency, bool)> {
        match self {
            Self::Dependency {
                from_id,
                from_resolvent,
                dependency,
                already_met,
            } => Some((from_id, from_resolvent, dependency, *already_met)),
            _ => None,
        }
    }
}
