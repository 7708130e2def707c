//! The repository abstraction.
//!
//! A repository is an unordered container of package ids with a
//! format-specific backend. The core consumes this interface; concrete
//! on-disk formats are external collaborators. Optional capabilities
//! (being a merge destination) surface as accessor methods returning
//! `Option<&dyn …>` rather than as separate base classes.

mod memory;

pub use memory::MemoryRepository;

use std::path::Path;

use crate::error::Result;
use crate::output::OutputManager;
use crate::sets::SetRegistry;
use crate::types::name::{CategoryNamePart, QualifiedPackageName, RepositoryName};
use crate::types::package::{ActionKind, PackageId};
use crate::types::spec::PackageDepSpec;

/// Parameters for merging one built package into a destination
/// repository.
pub struct MergeParams<'a> {
    /// The origin package being merged.
    pub id: &'a PackageId,
    /// The image directory holding the built artifacts.
    pub image_dir: &'a Path,
    /// Specs of installed packages this merge replaces.
    pub replacing: &'a [PackageDepSpec],
    /// Where the merge's textual output goes.
    pub output: &'a mut dyn OutputManager,
}

/// The destination capability: a repository into which packages can be
/// merged.
pub trait Destination: Send + Sync {
    /// Whether this repository can receive the given package.
    fn is_suitable_destination_for(&self, id: &PackageId) -> bool;

    /// Whether this repository is the default destination for new
    /// installs.
    fn is_default_destination(&self) -> bool;

    /// Merge a built package into this repository.
    fn merge(&self, params: MergeParams<'_>) -> Result<()>;
}

/// An unordered container of package ids.
///
/// Repositories are owned by the environment; package ids refer back to
/// their repository by name only.
pub trait Repository: Send + Sync {
    /// The repository's name.
    fn name(&self) -> &RepositoryName;

    /// Whether the repository has the given category.
    fn has_category(&self, category: &CategoryNamePart) -> bool;

    /// Whether the repository has the given package.
    fn has_package(&self, name: &QualifiedPackageName) -> bool;

    /// All category names, in sorted order.
    fn category_names(&self) -> Vec<CategoryNamePart>;

    /// All package names within a category, in sorted order.
    fn package_names(&self, category: &CategoryNamePart) -> Vec<QualifiedPackageName>;

    /// All ids for a qualified name, in version order.
    fn package_ids(&self, name: &QualifiedPackageName) -> Vec<PackageId>;

    /// Quick filter: whether any id here might support the action kind.
    /// `true` is always safe; `false` lets the selection pipeline skip
    /// the repository without materialising ids.
    fn some_ids_might_support_action(&self, kind: ActionKind) -> bool;

    /// Quick filter: whether any id here might be unmasked.
    fn some_ids_might_not_be_masked(&self) -> bool {
        true
    }

    /// The live root this repository represents, when it is an installed
    /// tree rather than an installable source.
    fn installed_root(&self) -> Option<&Path> {
        None
    }

    /// Synchronise with the upstream source. Returns whether anything
    /// changed.
    fn sync(&self, output: &mut dyn OutputManager) -> Result<bool>;

    /// Contribute named sets (e.g. `system`) to the registry.
    fn populate_sets(&self, sets: &mut SetRegistry) {
        let _ = sets;
    }

    /// The destination capability, when this repository can be merged
    /// into.
    fn destination(&self) -> Option<&dyn Destination> {
        None
    }
}
