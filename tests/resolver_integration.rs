//! Integration tests for the resolver and the job-list executor.
//!
//! These tests exercise resolution end to end over in-memory
//! repositories: target seeding, dependency pulling, any-group
//! alternatives, suggestion policies, removal chains, restarts, and
//! the linearised job lists.

use std::sync::Arc;

use cinder::environment::Environment;
use cinder::error::Result;
use cinder::repository::MemoryRepository;
use cinder::resolver::{
    Decision, DestinationType, ExecuteJob, Resolver, ResolverPolicy, SuggestionsPolicy,
    UseExisting,
};
use cinder::spectree::{DependencyLeaf, DependencySpecTree, SpecTree};
use cinder::types::package::keys;
use cinder::types::{
    ActionKind, MetadataValue, PackageDepSpec, PackageId, QualifiedPackageName, RepositoryName,
    VersionOperator, VersionSpec,
};

fn qpn(s: &str) -> QualifiedPackageName {
    s.parse().unwrap()
}

fn spec(s: &str) -> PackageDepSpec {
    PackageDepSpec::simple(qpn(s))
}

fn deps_tree(names: &[&str]) -> DependencySpecTree {
    SpecTree::All(
        names
            .iter()
            .map(|n| SpecTree::Leaf(DependencyLeaf::Package(spec(n))))
            .collect(),
    )
}

fn installable(repo: &MemoryRepository, name: &str, version: &str, deps: &[&str]) -> PackageId {
    let id = PackageId::builder(
        RepositoryName::new("testrepo").unwrap(),
        qpn(name),
        VersionSpec::new(version).unwrap(),
    )
    .metadata(keys::BUILD_DEPENDENCIES, MetadataValue::Dependencies(deps_tree(deps)))
    .supports(ActionKind::Fetch)
    .supports(ActionKind::Install)
    .supports(ActionKind::Pretend)
    .supports(ActionKind::Info)
    .build();
    repo.add(id.clone());
    id
}

fn installed(repo: &MemoryRepository, name: &str, version: &str, deps: &[&str]) -> PackageId {
    let id = PackageId::builder(
        RepositoryName::new("installed").unwrap(),
        qpn(name),
        VersionSpec::new(version).unwrap(),
    )
    .metadata(keys::BUILD_DEPENDENCIES, MetadataValue::Dependencies(deps_tree(deps)))
    .supports(ActionKind::Uninstall)
    .supports(ActionKind::Config)
    .supports(ActionKind::Info)
    .build();
    repo.add(id.clone());
    id
}

struct Fixture {
    repo: Arc<MemoryRepository>,
    installed: Arc<MemoryRepository>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            repo: Arc::new(MemoryRepository::new(RepositoryName::new("testrepo").unwrap())),
            installed: Arc::new(MemoryRepository::installed(
                RepositoryName::new("installed").unwrap(),
                "/",
            )),
        }
    }

    fn env(&self) -> Environment {
        let repo: Arc<dyn cinder::Repository> = self.repo.clone();
        let installed: Arc<dyn cinder::Repository> = self.installed.clone();
        Environment::builder()
            .repository(repo)
            .repository(installed)
            .build()
            .unwrap()
    }
}

fn change_names(resolved: &cinder::Resolved) -> Vec<String> {
    resolved
        .taken_change_or_remove_decisions
        .iter()
        .map(|r| r.resolvent.name.to_string())
        .collect()
}

/// A target with no dependencies resolves to a single change decision
/// with a fetch job chained to its install job.
#[test]
fn test_no_deps_target() -> Result<()> {
    let fixture = Fixture::new();
    installable(&fixture.repo, "no-deps/target", "1", &[]);
    let env = fixture.env();

    let mut resolver = Resolver::new(&env);
    resolver.add_target(spec("no-deps/target"));
    let resolved = resolver.resolve()?;

    assert_eq!(change_names(&resolved), vec!["no-deps/target"]);
    let decision = resolved.taken_change_or_remove_decisions[0]
        .decision
        .as_ref()
        .unwrap();
    match decision {
        Decision::ChangesToMake { origin, destination, .. } => {
            assert_eq!(origin.version().to_string(), "1");
            let destination = destination.as_ref().unwrap();
            assert_eq!(destination.repository.as_str(), "installed");
            assert!(destination.replacing.is_empty());
        }
        other => panic!("expected a change decision, got {other:?}"),
    }

    let jobs = &resolved.job_lists.execute_jobs;
    assert_eq!(jobs.len(), 2);
    assert!(matches!(jobs[0], ExecuteJob::Fetch(_)));
    match &jobs[1] {
        ExecuteJob::Install(install) => {
            assert!(install.replacing_specs.is_empty());
            assert_eq!(install.requirements.len(), 1);
            let requirement = install.requirements[0];
            assert_eq!(requirement.job_index, 0);
            assert!(requirement.flags.always);
        }
        other => panic!("expected an install job, got {other:?}"),
    }
    assert_eq!(resolved.job_lists.pretend_jobs.len(), 1);
    assert!(resolved.job_lists.requirements_are_acyclic());
    Ok(())
}

/// Build dependencies all get change decisions, ordered before their
/// dependent.
#[test]
fn test_build_deps_ordering() -> Result<()> {
    let fixture = Fixture::new();
    installable(
        &fixture.repo,
        "build-deps/target",
        "1",
        &["build-deps/a-dep", "build-deps/b-dep", "build-deps/z-dep"],
    );
    installable(&fixture.repo, "build-deps/a-dep", "1", &[]);
    installable(&fixture.repo, "build-deps/b-dep", "1", &[]);
    installable(&fixture.repo, "build-deps/z-dep", "1", &[]);
    let env = fixture.env();

    let mut resolver = Resolver::new(&env);
    resolver.add_target(spec("build-deps/target"));
    let resolved = resolver.resolve()?;

    let names = change_names(&resolved);
    assert_eq!(names.len(), 4);
    assert_eq!(names[3], "build-deps/target", "deps precede the target");
    let mut deps = names[..3].to_vec();
    deps.sort();
    assert_eq!(deps, vec!["build-deps/a-dep", "build-deps/b-dep", "build-deps/z-dep"]);

    assert!(resolved.taken_unable_to_make_decisions.is_empty());
    assert!(resolved.taken_unconfirmed_decisions.is_empty());
    assert!(resolved.taken_unorderable_decisions.is_empty());
    assert!(resolved.untaken_change_or_remove_decisions.is_empty());
    Ok(())
}

fn any_group_tree() -> DependencySpecTree {
    SpecTree::All(vec![SpecTree::Any(vec![
        SpecTree::All(vec![]),
        SpecTree::Leaf(DependencyLeaf::Package(spec("test/dep"))),
    ])])
}

/// With nothing installed, the empty alternative of an or-group wins
/// and only the target is installed.
#[test]
fn test_empty_alternative_taken() -> Result<()> {
    let fixture = Fixture::new();
    let target = PackageId::builder(
        RepositoryName::new("testrepo").unwrap(),
        qpn("test/target"),
        VersionSpec::new("1").unwrap(),
    )
    .metadata(keys::BUILD_DEPENDENCIES, MetadataValue::Dependencies(any_group_tree()))
    .supports(ActionKind::Fetch)
    .supports(ActionKind::Install)
    .build();
    fixture.repo.add(target);
    installable(&fixture.repo, "test/dep", "1", &[]);
    let env = fixture.env();

    let mut resolver = Resolver::new(&env);
    resolver.add_target(spec("test/target"));
    let resolved = resolver.resolve()?;

    assert_eq!(change_names(&resolved), vec!["test/target"]);
    Ok(())
}

/// With the alternative already installed, it is kept up to date: the
/// dep is upgraded and the target installed.
#[test]
fn test_empty_alternative_with_usable_upgrade() -> Result<()> {
    let fixture = Fixture::new();
    let target = PackageId::builder(
        RepositoryName::new("testrepo").unwrap(),
        qpn("test/target"),
        VersionSpec::new("1").unwrap(),
    )
    .metadata(keys::BUILD_DEPENDENCIES, MetadataValue::Dependencies(any_group_tree()))
    .supports(ActionKind::Fetch)
    .supports(ActionKind::Install)
    .build();
    fixture.repo.add(target);
    installable(&fixture.repo, "test/dep", "2", &[]);
    installed(&fixture.installed, "test/dep", "1", &[]);
    let env = fixture.env();

    let mut resolver = Resolver::new(&env);
    resolver.add_target(spec("test/target"));
    let resolved = resolver.resolve()?;

    assert_eq!(change_names(&resolved), vec!["test/dep", "test/target"]);
    let dep_decision = resolved.taken_change_or_remove_decisions[0]
        .decision
        .as_ref()
        .unwrap();
    assert_eq!(dep_decision.origin_id().unwrap().version().to_string(), "2");
    Ok(())
}

fn suggestion_fixture() -> (Fixture, Environment) {
    let fixture = Fixture::new();
    let target = PackageId::builder(
        RepositoryName::new("testrepo").unwrap(),
        qpn("suggestion/target"),
        VersionSpec::new("1").unwrap(),
    )
    .metadata(
        keys::SUGGESTED_DEPENDENCIES,
        MetadataValue::Dependencies(deps_tree(&["unmeetable/pkg"])),
    )
    .supports(ActionKind::Fetch)
    .supports(ActionKind::Install)
    .build();
    fixture.repo.add(target);
    let env = fixture.env();
    (fixture, env)
}

/// An unmeetable suggestion is ignored by the default policy: the
/// target installs, nothing becomes unable.
#[test]
fn test_unmeetable_suggestion_ignored() -> Result<()> {
    let (_fixture, env) = suggestion_fixture();
    let mut resolver = Resolver::new(&env);
    resolver.add_target(spec("suggestion/target"));
    let resolved = resolver.resolve()?;

    assert_eq!(change_names(&resolved), vec!["suggestion/target"]);
    assert!(resolved.taken_unable_to_make_decisions.is_empty());
    assert!(resolved.untaken_unable_to_make_decisions.is_empty());
    assert!(resolved.untaken_change_or_remove_decisions.is_empty());
    Ok(())
}

/// Under the untaken policy, the unmeetable suggestion surfaces as an
/// untaken inability instead of being dropped.
#[test]
fn test_unmeetable_suggestion_untaken_policy() -> Result<()> {
    let (_fixture, env) = suggestion_fixture();
    let policy = ResolverPolicy {
        suggestions: SuggestionsPolicy::Untaken,
        ..ResolverPolicy::default()
    };
    let mut resolver = Resolver::with_policy(&env, policy);
    resolver.add_target(spec("suggestion/target"));
    let resolved = resolver.resolve()?;

    assert_eq!(change_names(&resolved), vec!["suggestion/target"]);
    assert!(resolved.taken_unable_to_make_decisions.is_empty());
    assert_eq!(resolved.untaken_unable_to_make_decisions.len(), 1);
    Ok(())
}

/// Uninstalling a target with purges enabled removes the dependent
/// first, then the target, then the no-longer-needed deps, with a
/// satisfied-requirement chain through the uninstall jobs.
#[test]
fn test_continue_on_failure_uninstall_chain() -> Result<()> {
    let fixture = Fixture::new();
    installed(&fixture.installed, "cof/dep-of-dep", "1", &[]);
    installed(&fixture.installed, "cof/dep", "1", &["cof/dep-of-dep"]);
    installed(&fixture.installed, "cof/target", "1", &["cof/dep"]);
    installed(&fixture.installed, "cof/needs-target", "1", &["cof/target"]);
    let env = fixture.env();

    let policy = ResolverPolicy {
        allowed_to_remove: vec![spec("cof/needs-target")],
        remove_if_dependent: vec![spec("cof/needs-target")],
        purge: vec![spec("cof/dep"), spec("cof/dep-of-dep")],
        ..ResolverPolicy::default()
    };
    let mut resolver = Resolver::with_policy(&env, policy);
    resolver.add_uninstall_target(spec("cof/target"));
    let resolved = resolver.resolve()?;

    assert_eq!(
        change_names(&resolved),
        vec!["cof/needs-target", "cof/target", "cof/dep", "cof/dep-of-dep"]
    );
    for resolution in &resolved.taken_change_or_remove_decisions {
        assert!(matches!(
            resolution.decision.as_ref().unwrap(),
            Decision::Remove { .. }
        ));
    }

    let jobs = &resolved.job_lists.execute_jobs;
    assert_eq!(jobs.len(), 4);
    for (index, job) in jobs.iter().enumerate() {
        let ExecuteJob::Uninstall(uninstall) = job else {
            panic!("expected uninstall at {index}, got {job:?}");
        };
        if index == 0 {
            assert!(uninstall.requirements.is_empty());
        } else {
            assert_eq!(uninstall.requirements.len(), 1);
            assert_eq!(uninstall.requirements[0].job_index, index - 1);
            assert!(uninstall.requirements[0].flags.for_satisfied);
        }
    }
    Ok(())
}

/// A constraint arriving after its resolvent was kept as-installed
/// triggers a restart; the rerun upgrades the kept package.
#[test]
fn test_restart_upgrades_kept_package() -> Result<()> {
    let fixture = Fixture::new();
    installable(&fixture.repo, "restart/a", "1", &["restart/pkg"]);
    installable(&fixture.repo, "restart/b", "1", &["restart/c"]);
    let c = PackageId::builder(
        RepositoryName::new("testrepo").unwrap(),
        qpn("restart/c"),
        VersionSpec::new("1").unwrap(),
    )
    .metadata(
        keys::BUILD_DEPENDENCIES,
        MetadataValue::Dependencies(SpecTree::All(vec![SpecTree::Leaf(DependencyLeaf::Package(
            PackageDepSpec::builder()
                .package(qpn("restart/pkg"))
                .version_requirement(VersionOperator::GreaterEqual, VersionSpec::new("2").unwrap())
                .build(),
        ))])),
    )
    .supports(ActionKind::Fetch)
    .supports(ActionKind::Install)
    .build();
    fixture.repo.add(c);
    installable(&fixture.repo, "restart/pkg", "1", &[]);
    installable(&fixture.repo, "restart/pkg", "2", &[]);
    installed(&fixture.installed, "restart/pkg", "1", &[]);
    let env = fixture.env();

    let policy = ResolverPolicy {
        use_existing_for_dependencies: UseExisting::IfPossible,
        ..ResolverPolicy::default()
    };
    let mut resolver = Resolver::with_policy(&env, policy);
    resolver.add_target(spec("restart/a"));
    resolver.add_target(spec("restart/b"));
    let resolved = resolver.resolve()?;

    let pkg = resolved
        .taken_change_or_remove_decisions
        .iter()
        .find(|r| r.resolvent.name.to_string() == "restart/pkg")
        .expect("restart/pkg must be upgraded after the restart");
    assert_eq!(
        pkg.decision.as_ref().unwrap().origin_id().unwrap().version().to_string(),
        "2"
    );
    Ok(())
}

/// Exhausting the restart bound is an error, not a loop.
#[test]
fn test_restart_bound() {
    let fixture = Fixture::new();
    installable(&fixture.repo, "restart/a", "1", &["restart/pkg"]);
    installable(&fixture.repo, "restart/b", "1", &["restart/c"]);
    let c = PackageId::builder(
        RepositoryName::new("testrepo").unwrap(),
        qpn("restart/c"),
        VersionSpec::new("1").unwrap(),
    )
    .metadata(
        keys::BUILD_DEPENDENCIES,
        MetadataValue::Dependencies(SpecTree::All(vec![SpecTree::Leaf(DependencyLeaf::Package(
            PackageDepSpec::builder()
                .package(qpn("restart/pkg"))
                .version_requirement(VersionOperator::GreaterEqual, VersionSpec::new("2").unwrap())
                .build(),
        ))])),
    )
    .supports(ActionKind::Fetch)
    .supports(ActionKind::Install)
    .build();
    fixture.repo.add(c);
    installable(&fixture.repo, "restart/pkg", "1", &[]);
    installable(&fixture.repo, "restart/pkg", "2", &[]);
    installed(&fixture.installed, "restart/pkg", "1", &[]);
    let env = fixture.env();

    let policy = ResolverPolicy {
        use_existing_for_dependencies: UseExisting::IfPossible,
        max_restarts: 0,
        ..ResolverPolicy::default()
    };
    let mut resolver = Resolver::with_policy(&env, policy);
    resolver.add_target(spec("restart/a"));
    resolver.add_target(spec("restart/b"));
    let err = resolver.resolve().unwrap_err();
    assert!(matches!(err, cinder::Error::TooManyRestarts { limit: 0 }));
}

/// No candidate satisfying the constraints yields an unable decision
/// carrying the rejected candidates, not an error.
#[test]
fn test_unable_to_make_decision_is_data() -> Result<()> {
    let fixture = Fixture::new();
    installable(&fixture.repo, "nope/pkg", "1", &[]);
    installable(&fixture.repo, "nope/pkg", "2", &[]);
    let env = fixture.env();

    let mut resolver = Resolver::new(&env);
    resolver.add_target(
        PackageDepSpec::builder()
            .package(qpn("nope/pkg"))
            .version_requirement(VersionOperator::GreaterEqual, VersionSpec::new("3").unwrap())
            .build(),
    );
    let resolved = resolver.resolve()?;

    assert!(resolved.taken_change_or_remove_decisions.is_empty());
    assert_eq!(resolved.taken_unable_to_make_decisions.len(), 1);
    match resolved.taken_unable_to_make_decisions[0].decision.as_ref().unwrap() {
        Decision::Unable { unsuitable, .. } => {
            assert_eq!(unsuitable.len(), 2);
            assert!(unsuitable
                .iter()
                .all(|u| !u.unmet_constraints.is_empty()));
        }
        other => panic!("expected unable, got {other:?}"),
    }
    Ok(())
}

/// Masked candidates are passed over for the best unmasked one.
#[test]
fn test_masked_candidate_passed_over() -> Result<()> {
    let fixture = Fixture::new();
    installable(&fixture.repo, "masked/pkg", "1", &[]);
    let newer = PackageId::builder(
        RepositoryName::new("testrepo").unwrap(),
        qpn("masked/pkg"),
        VersionSpec::new("2").unwrap(),
    )
    .supports(ActionKind::Fetch)
    .supports(ActionKind::Install)
    .mask(cinder::types::Mask::Repository {
        comment: "broken".to_string(),
        token: "package.mask".to_string(),
        mask_file: "/repo/profiles/package.mask".into(),
    })
    .build();
    fixture.repo.add(newer);
    let env = fixture.env();

    let mut resolver = Resolver::new(&env);
    resolver.add_target(spec("masked/pkg"));
    let resolved = resolver.resolve()?;

    let decision = resolved.taken_change_or_remove_decisions[0].decision.as_ref().unwrap();
    assert_eq!(decision.origin_id().unwrap().version().to_string(), "1");
    Ok(())
}

/// A blocked installed package the policy allows removing is removed
/// before the blocker installs.
#[test]
fn test_block_removes_installed() -> Result<()> {
    let fixture = Fixture::new();
    let target = PackageId::builder(
        RepositoryName::new("testrepo").unwrap(),
        qpn("block/target"),
        VersionSpec::new("1").unwrap(),
    )
    .metadata(
        keys::BUILD_DEPENDENCIES,
        MetadataValue::Dependencies(SpecTree::All(vec![SpecTree::Leaf(DependencyLeaf::Block(
            cinder::types::BlockDepSpec { blocked: spec("old/lib"), strong: false },
        ))])),
    )
    .supports(ActionKind::Fetch)
    .supports(ActionKind::Install)
    .build();
    fixture.repo.add(target);
    installed(&fixture.installed, "old/lib", "1", &[]);
    let env = fixture.env();

    let policy = ResolverPolicy {
        allowed_to_remove: vec![spec("old/lib")],
        ..ResolverPolicy::default()
    };
    let mut resolver = Resolver::with_policy(&env, policy);
    resolver.add_target(spec("block/target"));
    let resolved = resolver.resolve()?;

    assert_eq!(change_names(&resolved), vec!["old/lib", "block/target"]);
    assert!(matches!(
        resolved.taken_change_or_remove_decisions[0].decision.as_ref().unwrap(),
        Decision::Remove { .. }
    ));
    Ok(())
}

/// Downgrades are planned but flagged for confirmation.
#[test]
fn test_downgrade_needs_confirmation() -> Result<()> {
    let fixture = Fixture::new();
    installable(&fixture.repo, "down/pkg", "1", &[]);
    installed(&fixture.installed, "down/pkg", "2", &[]);
    let env = fixture.env();

    let mut resolver = Resolver::new(&env);
    resolver.add_target(spec("down/pkg"));
    let resolved = resolver.resolve()?;

    assert_eq!(resolved.taken_unconfirmed_decisions.len(), 1);
    let decision = resolved.taken_unconfirmed_decisions[0].decision.as_ref().unwrap();
    assert!(decision.needs_confirmation());
    assert!(decision.confirmation_needed()[0].contains("downgrade"));
    Ok(())
}

/// The resolver's output serialises; a driver can persist and reload
/// the plan.
#[test]
fn test_resolved_serialises() -> Result<()> {
    let fixture = Fixture::new();
    installable(&fixture.repo, "serde/target", "1", &[]);
    let env = fixture.env();

    let mut resolver = Resolver::new(&env);
    resolver.add_target(spec("serde/target"));
    let resolved = resolver.resolve()?;

    let json = serde_json::to_string(&resolved).expect("resolved serialises");
    assert!(json.contains("serde/target"));
    let back: cinder::Resolved = serde_json::from_str(&json).expect("resolved deserialises");
    assert_eq!(back.job_lists.execute_jobs.len(), 2);
    Ok(())
}

/// The destination type is carried through to install jobs.
#[test]
fn test_destination_type_on_jobs() -> Result<()> {
    let fixture = Fixture::new();
    installable(&fixture.repo, "dest/pkg", "1", &[]);
    let env = fixture.env();

    let mut resolver = Resolver::new(&env);
    resolver.add_target(spec("dest/pkg"));
    let resolved = resolver.resolve()?;
    match &resolved.job_lists.execute_jobs[1] {
        ExecuteJob::Install(install) => {
            assert_eq!(install.destination_type, DestinationType::InstallToSlash);
        }
        other => panic!("expected install, got {other:?}"),
    }
    Ok(())
}
