//! Integration tests for the selection pipeline and spec matching.

use std::sync::Arc;

use cinder::environment::Environment;
use cinder::error::Result;
use cinder::repository::MemoryRepository;
use cinder::selection::{Filter, FilteredGenerator, Generator, MaskKind, Selection};
use cinder::types::{
    ActionKind, Mask, PackageDepSpec, PackageId, QualifiedPackageName, RepositoryName, SlotName,
    VersionOperator, VersionSpec,
};

fn qpn(s: &str) -> QualifiedPackageName {
    s.parse().unwrap()
}

fn id(repo: &str, name: &str, version: &str, slot: &str) -> PackageId {
    PackageId::builder(
        RepositoryName::new(repo).unwrap(),
        qpn(name),
        VersionSpec::new(version).unwrap(),
    )
    .slot(SlotName::new(slot).unwrap())
    .supports(ActionKind::Install)
    .supports(ActionKind::Fetch)
    .build()
}

fn sample_env() -> Environment {
    let first = MemoryRepository::new(RepositoryName::new("first").unwrap());
    first.add(id("first", "dev-libs/openssl", "3.0", "0"));
    first.add(id("first", "dev-libs/openssl", "3.1", "0"));
    first.add(id("first", "dev-libs/openssl", "1.1.1", "1.1"));
    first.add(id("first", "dev-lang/python", "3.12", "3.12"));

    let second = MemoryRepository::new(RepositoryName::new("second").unwrap());
    second.add(id("second", "dev-libs/openssl", "3.1", "0"));
    second.add(
        PackageId::builder(
            RepositoryName::new("second").unwrap(),
            qpn("dev-libs/masked"),
            VersionSpec::new("1").unwrap(),
        )
        .supports(ActionKind::Install)
        .mask(Mask::Repository {
            comment: "never".to_string(),
            token: "package.mask".to_string(),
            mask_file: "/second/profiles/package.mask".into(),
        })
        .build(),
    );

    let installed = MemoryRepository::installed(RepositoryName::new("installed").unwrap(), "/");
    installed.add(
        PackageId::builder(
            RepositoryName::new("installed").unwrap(),
            qpn("dev-libs/openssl"),
            VersionSpec::new("3.0").unwrap(),
        )
        .slot(SlotName::new("0").unwrap())
        .supports(ActionKind::Uninstall)
        .build(),
    );

    Environment::builder()
        .repository(Arc::new(first))
        .repository(Arc::new(second))
        .repository(Arc::new(installed))
        .build()
        .unwrap()
}

fn versions(ids: &[PackageId]) -> Vec<String> {
    ids.iter().map(|i| i.version().to_string()).collect()
}

/// All versions of a package come back sorted by version.
#[test]
fn test_all_versions_sorted() -> Result<()> {
    let env = sample_env();
    let found = env.select(&Selection::AllVersionsSorted(
        FilteredGenerator::new(Generator::Package(qpn("dev-libs/openssl"))),
    ))?;
    assert_eq!(versions(&found), vec!["1.1.1", "3.0", "3.0", "3.1", "3.1"]);
    Ok(())
}

/// Best-version-only keeps the highest per (name, slot), preferring the
/// more important repository on ties.
#[test]
fn test_best_version_only() -> Result<()> {
    let env = sample_env();
    let found = env.select(&Selection::BestVersionOnly(
        FilteredGenerator::new(Generator::Package(qpn("dev-libs/openssl")))
            .filter(Filter::SupportsAction(ActionKind::Install)),
    ))?;
    // One per slot: 1.1 and 0.
    assert_eq!(found.len(), 2);
    let best = found
        .iter()
        .find(|i| i.slot().unwrap().as_str() == "0")
        .unwrap();
    assert_eq!(best.version().to_string(), "3.1");
    assert_eq!(best.repository_name().as_str(), "first");
    Ok(())
}

/// RequireExactlyOne succeeds on a unique match and errors otherwise.
#[test]
fn test_require_exactly_one() -> Result<()> {
    let env = sample_env();
    let matches = Generator::Matches(
        PackageDepSpec::builder()
            .package(qpn("dev-libs/openssl"))
            .version_requirement(VersionOperator::Equal, VersionSpec::new("1.1.1").unwrap())
            .build(),
    );
    let found = env.select(&Selection::RequireExactlyOne(FilteredGenerator::new(matches)))?;
    assert_eq!(found.len(), 1);

    let missing = env.select(&Selection::RequireExactlyOne(FilteredGenerator::new(
        Generator::Package(qpn("dev-libs/nonexistent")),
    )));
    assert!(matches!(missing, Err(cinder::Error::NoSuchPackage(_))));

    let many = env.select(&Selection::RequireExactlyOne(FilteredGenerator::new(
        Generator::Package(qpn("dev-libs/openssl")),
    )));
    assert!(matches!(many, Err(cinder::Error::AmbiguousPackage(_))));
    Ok(())
}

/// The installed-at-root filter narrows to the installed tree without
/// touching installable repositories.
#[test]
fn test_installed_at_root_filter() -> Result<()> {
    let env = sample_env();
    let found = env.select(&Selection::AllVersionsSorted(
        FilteredGenerator::new(Generator::Package(qpn("dev-libs/openssl")))
            .filter(Filter::InstalledAtRoot("/".into())),
    ))?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].repository_name().as_str(), "installed");
    Ok(())
}

/// Mask filters split the masked and unmasked views.
#[test]
fn test_mask_filters() -> Result<()> {
    let env = sample_env();
    let unmasked = env.select(&Selection::AllVersionsSorted(
        FilteredGenerator::new(Generator::Package(qpn("dev-libs/masked")))
            .filter(Filter::NotMasked),
    ))?;
    assert!(unmasked.is_empty());

    let with_mask = env.select(&Selection::AllVersionsSorted(
        FilteredGenerator::new(Generator::All).filter(Filter::WithMask(MaskKind::Repository)),
    ))?;
    assert_eq!(with_mask.len(), 1);
    assert_eq!(with_mask[0].name().to_string(), "dev-libs/masked");
    Ok(())
}

/// Category and repository generators narrow before ids materialise.
#[test]
fn test_category_and_repository_generators() -> Result<()> {
    let env = sample_env();
    let python = env.select(&Selection::AllVersionsSorted(FilteredGenerator::new(
        Generator::Category("dev-lang".parse().unwrap()),
    )))?;
    assert_eq!(python.len(), 1);

    let second_only = env.select(&Selection::AllVersionsSorted(FilteredGenerator::new(
        Generator::InRepository(RepositoryName::new("second").unwrap()),
    )))?;
    assert_eq!(second_only.len(), 2);
    assert!(second_only
        .iter()
        .all(|i| i.repository_name().as_str() == "second"));
    Ok(())
}

/// SameSlot and ByFunction filters compose with generators.
#[test]
fn test_same_slot_and_by_function() -> Result<()> {
    let env = sample_env();
    let reference = id("first", "dev-libs/openssl", "3.0", "0");
    let same_slot = env.select(&Selection::AllVersionsSorted(
        FilteredGenerator::new(Generator::Package(qpn("dev-libs/openssl")))
            .filter(Filter::SameSlot(reference)),
    ))?;
    assert!(same_slot.iter().all(|i| i.slot().unwrap().as_str() == "0"));

    let new_enough = env.select(&Selection::AllVersionsSorted(
        FilteredGenerator::new(Generator::Package(qpn("dev-libs/openssl"))).filter(
            Filter::ByFunction(Arc::new(|_env, id| {
                id.version() >= &VersionSpec::new("3.1").unwrap()
            })),
        ),
    ))?;
    assert_eq!(versions(&new_enough), vec!["3.1", "3.1"]);
    Ok(())
}

/// Matching honours slot, repository and version requirements together.
#[test]
fn test_match_package_requirements() -> Result<()> {
    let env = sample_env();
    let candidate = id("first", "dev-libs/openssl", "3.0", "0");

    let full = PackageDepSpec::builder()
        .package(qpn("dev-libs/openssl"))
        .version_requirement(VersionOperator::GreaterEqual, VersionSpec::new("3").unwrap())
        .slot(SlotName::new("0").unwrap())
        .in_repository(RepositoryName::new("first").unwrap())
        .build();
    assert!(cinder::match_package(&env, &full, &candidate));

    let wrong_slot = full.rebuild().slot(SlotName::new("1.1").unwrap()).build();
    assert!(!cinder::match_package(&env, &wrong_slot, &candidate));

    let wrong_repo = full
        .rebuild()
        .in_repository(RepositoryName::new("second").unwrap())
        .build();
    assert!(!cinder::match_package(&env, &wrong_repo, &candidate));
    Ok(())
}

/// SomeArbitraryVersion returns a single id matching the query.
#[test]
fn test_some_arbitrary_version() -> Result<()> {
    let env = sample_env();
    let found = env.select(&Selection::SomeArbitraryVersion(FilteredGenerator::new(
        Generator::Package(qpn("dev-libs/openssl")),
    )))?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name().to_string(), "dev-libs/openssl");
    Ok(())
}
