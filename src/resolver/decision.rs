//! Decisions: the resolver's conclusion for one resolvent.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::name::RepositoryName;
use crate::types::package::PackageId;

/// The destination chosen for a changes-to-make decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChosenDestination {
    /// The repository to merge into.
    pub repository: RepositoryName,
    /// Installed ids the merge replaces.
    pub replacing: Vec<PackageId>,
}

/// One candidate the decider rejected, with the constraints it violated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsuitableCandidate {
    /// The rejected id.
    pub id: PackageId,
    /// Human-readable descriptions of what it violated.
    pub unmet_constraints: Vec<String>,
}

/// The resolver's conclusion for one resolvent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// Install (or reinstall/upgrade/downgrade) the origin id.
    ChangesToMake {
        /// The id to build and merge.
        origin: PackageId,
        /// Whether the origin was the best candidate seen (as opposed to
        /// a constrained fallback).
        best: bool,
        /// The chosen destination, when one was found.
        destination: Option<ChosenDestination>,
        /// Why the decision needs user confirmation, when it does
        /// (e.g. a downgrade).
        confirmation_needed: Vec<String>,
        /// Whether the decision will be executed.
        taken: bool,
    },
    /// Keep an existing install.
    ExistingNoChange {
        /// The installed id being kept.
        existing: PackageId,
        /// Whether it equals what a fresh resolution would install.
        is_same: bool,
        /// Whether it has the same version as what would be installed.
        is_same_version: bool,
        /// Whether it is transient.
        is_transient: bool,
        /// Whether the decision will be executed (kept decisions execute
        /// nothing, but taken-ness still drives reporting).
        taken: bool,
    },
    /// Nothing needs to be present.
    NothingNoChange {
        /// Whether the decision will be executed.
        taken: bool,
    },
    /// Remove installed ids.
    Remove {
        /// The ids to remove, in decision order.
        ids: Vec<PackageId>,
        /// Whether the decision will be executed.
        taken: bool,
    },
    /// An installed id is left broken (a dependent that cannot be
    /// removed or rebuilt).
    Break {
        /// The id left broken.
        existing: PackageId,
        /// Whether the break will actually happen.
        taken: bool,
    },
    /// No decision consistent with the constraints exists.
    Unable {
        /// The candidates considered and why each failed.
        unsuitable: Vec<UnsuitableCandidate>,
        /// Whether the unresolved resolvent was on the taken path.
        taken: bool,
    },
}

impl Decision {
    /// Whether the decision will be executed.
    #[must_use]
    pub const fn taken(&self) -> bool {
        match self {
            Self::ChangesToMake { taken, .. }
            | Self::ExistingNoChange { taken, .. }
            | Self::NothingNoChange { taken }
            | Self::Remove { taken, .. }
            | Self::Break { taken, .. }
            | Self::Unable { taken, .. } => *taken,
        }
    }

    /// Whether this is a change-or-remove decision (the kind that turns
    /// into jobs).
    #[must_use]
    pub const fn is_change_or_remove(&self) -> bool {
        matches!(self, Self::ChangesToMake { .. } | Self::Remove { .. })
    }

    /// The id this decision installs, when it installs one.
    #[must_use]
    pub const fn origin_id(&self) -> Option<&PackageId> {
        match self {
            Self::ChangesToMake { origin, .. } => Some(origin),
            _ => None,
        }
    }

    /// Why the decision needs confirmation; empty when it does not.
    #[must_use]
    pub fn confirmation_needed(&self) -> &[String] {
        match self {
            Self::ChangesToMake { confirmation_needed, .. } => confirmation_needed,
            _ => &[],
        }
    }

    /// Whether the decision needs user confirmation before execution.
    #[must_use]
    pub fn needs_confirmation(&self) -> bool {
        match self {
            Self::Break { .. } => true,
            _ => !self.confirmation_needed().is_empty(),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChangesToMake { origin, .. } => write!(f, "install {origin}"),
            Self::ExistingNoChange { existing, .. } => write!(f, "keep {existing}"),
            Self::NothingNoChange { .. } => f.write_str("nothing"),
            Self::Remove { ids, .. } => {
                let names = ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
                write!(f, "remove {names}")
            }
            Self::Break { existing, .. } => write!(f, "break {existing}"),
            Self::Unable { .. } => f.write_str("unable to decide"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::name::QualifiedPackageName;
    use crate::types::version::VersionSpec;

    fn id() -> PackageId {
        PackageId::builder(
            RepositoryName::new("repo").unwrap(),
            QualifiedPackageName::new("cat/pkg").unwrap(),
            VersionSpec::new("1.0").unwrap(),
        )
        .build()
    }

    #[test]
    fn test_taken_and_kind_accessors() {
        let change = Decision::ChangesToMake {
            origin: id(),
            best: true,
            destination: None,
            confirmation_needed: Vec::new(),
            taken: true,
        };
        assert!(change.taken());
        assert!(change.is_change_or_remove());
        assert!(!change.needs_confirmation());
        assert!(change.origin_id().is_some());

        let nothing = Decision::NothingNoChange { taken: false };
        assert!(!nothing.taken());
        assert!(!nothing.is_change_or_remove());
    }

    #[test]
    fn test_confirmation() {
        let downgrade = Decision::ChangesToMake {
            origin: id(),
            best: true,
            destination: None,
            confirmation_needed: vec!["downgrade from 2.0 to 1.0".to_string()],
            taken: true,
        };
        assert!(downgrade.needs_confirmation());

        let broken = Decision::Break { existing: id(), taken: true };
        assert!(broken.needs_confirmation());
    }
}
