//! Core engine for a source-based package manager.
//!
//! This crate models package repositories, computes which versions of
//! which packages satisfy a request, and drives an installer/uninstaller
//! that merges built artifacts into a live filesystem. It is the engine
//! only: concrete repository formats, the build tool itself, and user
//! interfaces are external collaborators behind the interfaces defined
//! here.
//!
//! # Architecture
//!
//! - [`types`]: validated names, structured versions, dependency specs,
//!   choices (flags), masks, contents, and the [`types::PackageId`]
//!   handle.
//! - [`spectree`]: dependency/URI/license trees with conditional
//!   subtrees, flattening and sanitisation.
//! - [`repository`]: the repository abstraction and an in-memory
//!   implementation.
//! - [`environment`]: the process-wide context (repositories, user
//!   configuration, sets, hooks, masking).
//! - [`selection`]: generator/filter/selection queries over all
//!   repositories.
//! - [`resolver`]: targets and constraints in, ordered decisions and
//!   job lists out.
//! - [`executor`]: runs job lists through an external build driver with
//!   continue-on-failure semantics.
//! - [`merger`]: atomic per-entry filesystem install and uninstall.
//! - [`world`]: the persisted top-level target set.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use cinder::environment::Environment;
//! use cinder::repository::MemoryRepository;
//! use cinder::resolver::Resolver;
//! use cinder::types::{
//!     ActionKind, PackageId, PackageDepSpec, QualifiedPackageName, RepositoryName, VersionSpec,
//! };
//!
//! # fn main() -> cinder::Result<()> {
//! let repo = MemoryRepository::new(RepositoryName::new("demo")?);
//! repo.add(
//!     PackageId::builder(
//!         RepositoryName::new("demo")?,
//!         QualifiedPackageName::new("app/hello")?,
//!         VersionSpec::new("1.0")?,
//!     )
//!     .supports(ActionKind::Install)
//!     .build(),
//! );
//! let installed = MemoryRepository::installed(RepositoryName::new("installed")?, "/");
//!
//! let env = Environment::builder()
//!     .repository(Arc::new(repo))
//!     .repository(Arc::new(installed))
//!     .build()?;
//!
//! let mut resolver = Resolver::new(&env);
//! resolver.add_target(PackageDepSpec::simple(QualifiedPackageName::new("app/hello")?));
//! let resolved = resolver.resolve()?;
//! assert_eq!(resolved.taken_change_or_remove_decisions.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod env;
pub mod environment;
pub mod error;
pub mod executor;
pub mod merger;
pub mod output;
pub mod repository;
pub mod resolver;
pub mod selection;
pub mod sets;
pub mod spectree;
pub mod types;
pub mod world;

// Re-export commonly used types
pub use error::{CinderError as Error, Result};
pub use types::{PackageDepSpec, PackageId, QualifiedPackageName, VersionSpec};

pub use environment::Environment;
pub use executor::{BuildDriver, ContinueOnFailure, Executor};
pub use repository::{MemoryRepository, Repository};
pub use resolver::{Resolved, Resolver, ResolverPolicy};
pub use selection::{match_package, Filter, FilteredGenerator, Generator, Selection};
pub use world::{World, WorldEntry};
