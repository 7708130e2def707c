//! Resolve a small dependency graph over in-memory repositories and
//! walk the resulting job list through a printing build driver.
//!
//! Run with: `cargo run --example resolve`

use std::sync::Arc;

use cinder::environment::Environment;
use cinder::executor::{BuildDriver, ContinueOnFailure, Executor};
use cinder::repository::MemoryRepository;
use cinder::resolver::{FetchJob, InstallJob, Resolver, UninstallJob};
use cinder::spectree::{DependencyLeaf, SpecTree};
use cinder::types::package::keys;
use cinder::types::{
    ActionKind, MetadataValue, PackageDepSpec, PackageId, QualifiedPackageName, RepositoryName,
    VersionSpec,
};

struct PrintingDriver;

impl BuildDriver for PrintingDriver {
    fn fetch(&self, job: &FetchJob) -> cinder::Result<()> {
        println!("  fetching   {}", job.origin_id_spec);
        Ok(())
    }

    fn install(&self, job: &InstallJob) -> cinder::Result<()> {
        println!(
            "  installing {} -> {}",
            job.origin_id_spec, job.destination_repository
        );
        Ok(())
    }

    fn uninstall(&self, job: &UninstallJob) -> cinder::Result<()> {
        for spec in &job.ids_to_remove_specs {
            println!("  removing   {spec}");
        }
        Ok(())
    }
}

fn add_package(
    repo: &MemoryRepository,
    name: &str,
    version: &str,
    deps: &[&str],
) -> cinder::Result<()> {
    let mut leaves = Vec::new();
    for dep in deps {
        leaves.push(SpecTree::Leaf(DependencyLeaf::Package(PackageDepSpec::simple(
            QualifiedPackageName::new(dep)?,
        ))));
    }
    repo.add(
        PackageId::builder(
            RepositoryName::new("demo")?,
            QualifiedPackageName::new(name)?,
            VersionSpec::new(version)?,
        )
        .metadata(
            keys::BUILD_DEPENDENCIES,
            MetadataValue::Dependencies(SpecTree::All(leaves)),
        )
        .supports(ActionKind::Fetch)
        .supports(ActionKind::Install)
        .supports(ActionKind::Pretend)
        .build(),
    );
    Ok(())
}

fn main() -> cinder::Result<()> {
    let repo = MemoryRepository::new(RepositoryName::new("demo")?);
    add_package(&repo, "app/editor", "2.1", &["dev-libs/ui", "dev-libs/syntax"])?;
    add_package(&repo, "dev-libs/ui", "1.4", &["dev-libs/glue"])?;
    add_package(&repo, "dev-libs/syntax", "0.9", &[])?;
    add_package(&repo, "dev-libs/glue", "1.0", &[])?;

    let installed = MemoryRepository::installed(RepositoryName::new("installed")?, "/");

    let env = Environment::builder()
        .repository(Arc::new(repo))
        .repository(Arc::new(installed))
        .build()?;

    let mut resolver = Resolver::new(&env);
    resolver.add_target(PackageDepSpec::simple(QualifiedPackageName::new("app/editor")?));
    let resolved = resolver.resolve()?;

    println!("plan:");
    for resolution in &resolved.taken_change_or_remove_decisions {
        if let Some(decision) = &resolution.decision {
            println!("  {decision}");
        }
    }

    println!("executing {} jobs:", resolved.job_lists.execute_jobs.len());
    let driver = PrintingDriver;
    let result = Executor::new(&driver, ContinueOnFailure::Never).execute(&resolved.job_lists);
    println!("success: {}", result.success);
    Ok(())
}
