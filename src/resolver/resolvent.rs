//! Resolvents: the unit the resolver makes a decision about.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::name::{QualifiedPackageName, SlotName};
use crate::types::package::PackageId;

/// Where an installation is destined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DestinationType {
    /// The live root filesystem.
    #[default]
    InstallToSlash,
    /// A chroot root.
    InstallToChroot,
    /// A binary-package repository.
    InstallToBinaries,
}

impl DestinationType {
    /// The destination's text form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InstallToSlash => "/",
            Self::InstallToChroot => "chroot",
            Self::InstallToBinaries => "binaries",
        }
    }
}

impl fmt::Display for DestinationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(package name, slot, destination)` triple. Each resolvent gets at
/// most one resolution in a resolver run.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Resolvent {
    /// The package name being decided.
    pub name: QualifiedPackageName,
    /// The slot, when the decision is slot-specific; `None` decides for
    /// whichever slot the chosen id occupies.
    pub slot: Option<SlotName>,
    /// Where the result is destined.
    pub destination: DestinationType,
}

impl Resolvent {
    /// A resolvent for a name with no slot constraint, destined for the
    /// live root.
    #[must_use]
    pub const fn unslotted(name: QualifiedPackageName) -> Self {
        Self {
            name,
            slot: None,
            destination: DestinationType::InstallToSlash,
        }
    }

    /// The resolvent an id naturally belongs to.
    #[must_use]
    pub fn for_id(id: &PackageId, destination: DestinationType) -> Self {
        Self {
            name: id.name().clone(),
            slot: id.slot().cloned(),
            destination,
        }
    }

    /// Whether an id falls under this resolvent (same name, compatible
    /// slot).
    #[must_use]
    pub fn covers(&self, id: &PackageId) -> bool {
        self.name == *id.name()
            && match &self.slot {
                Some(slot) => id.slot() == Some(slot),
                None => true,
            }
    }
}

impl fmt::Display for Resolvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(slot) = &self.slot {
            write!(f, ":{slot}")?;
        }
        write!(f, "->{}", self.destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::name::RepositoryName;
    use crate::types::version::VersionSpec;

    #[test]
    fn test_covers() {
        let id = PackageId::builder(
            RepositoryName::new("repo").unwrap(),
            QualifiedPackageName::new("cat/pkg").unwrap(),
            VersionSpec::new("1.0").unwrap(),
        )
        .slot(SlotName::new("2").unwrap())
        .build();

        let unslotted = Resolvent::unslotted(QualifiedPackageName::new("cat/pkg").unwrap());
        assert!(unslotted.covers(&id));

        let slotted = Resolvent::for_id(&id, DestinationType::InstallToSlash);
        assert!(slotted.covers(&id));
        assert_eq!(slotted.slot.as_ref().unwrap().as_str(), "2");

        let other_slot = Resolvent {
            slot: Some(SlotName::new("3").unwrap()),
            ..slotted
        };
        assert!(!other_slot.covers(&id));
    }

    #[test]
    fn test_display() {
        let resolvent = Resolvent::unslotted(QualifiedPackageName::new("cat/pkg").unwrap());
        assert_eq!(resolvent.to_string(), "cat/pkg->/");
    }
}
