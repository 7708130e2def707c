//! Named package sets.
//!
//! A set registry maps set names to their contents trees. The
//! environment seeds the built-in sets (`world`, `system`, `everything`)
//! and repositories may populate additional ones.

use indexmap::IndexMap;

use crate::error::{CinderError, Result};
use crate::spectree::{SetLeaf, SetSpecTree, SpecTree};
use crate::types::name::SetName;
use crate::types::spec::PackageDepSpec;

/// Registry of named sets.
#[derive(Clone, Debug, Default)]
pub struct SetRegistry {
    sets: IndexMap<SetName, SetSpecTree>,
}

impl SetRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// What: Register or replace a set.
    ///
    /// Inputs:
    /// - `name`: The set's name.
    /// - `contents`: The set's contents tree.
    ///
    /// Details:
    /// - Later registrations replace earlier ones of the same name;
    ///   repositories populate before user configuration so user sets
    ///   win.
    pub fn register(&mut self, name: SetName, contents: SetSpecTree) {
        self.sets.insert(name, contents);
    }

    /// Look up a set's contents.
    pub fn get(&self, name: &SetName) -> Result<&SetSpecTree> {
        self.sets
            .get(name)
            .ok_or_else(|| CinderError::NoSuchSet(name.to_string()))
    }

    /// Whether a set exists.
    #[must_use]
    pub fn contains(&self, name: &SetName) -> bool {
        self.sets.contains_key(name)
    }

    /// The registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &SetName> {
        self.sets.keys()
    }
}

/// Build a flat set tree from package specs.
#[must_use]
pub fn set_of_specs(specs: impl IntoIterator<Item = PackageDepSpec>) -> SetSpecTree {
    SpecTree::All(
        specs
            .into_iter()
            .map(|s| SpecTree::Leaf(SetLeaf::Package(s)))
            .collect(),
    )
}
