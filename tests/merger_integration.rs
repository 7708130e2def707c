//! Integration tests for the filesystem merger and unmerger, run
//! against real temporary directories.

#![cfg(unix)]

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use cinder::environment::Environment;
use cinder::error::Result;
use cinder::merger::{FsMerger, FsMergerParams, MergerOptions, Unmerger, UnmergerParams};

fn env() -> Environment {
    Environment::builder().build().unwrap()
}

fn params<'a>(env: &'a Environment, image: &Path, root: &Path) -> FsMergerParams<'a> {
    FsMergerParams {
        env,
        image: image.to_path_buf(),
        root: root.to_path_buf(),
        install_under: PathBuf::new(),
        options: MergerOptions::default(),
        fix_mtimes_before: None,
        no_chown: true,
        get_new_ids_or_minus_one: Box::new(|_| (-1, -1)),
        config_protected: Box::new(|_, _| false),
        used_this_for_config_protect: Box::new(|_| {}),
    }
}

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// Everything under a root, relative paths, for comparisons.
fn tree_of(root: &Path) -> BTreeSet<PathBuf> {
    let mut out = BTreeSet::new();
    for entry in walkdir::WalkDir::new(root).min_depth(1) {
        let entry = entry.unwrap();
        out.insert(entry.path().strip_prefix(root).unwrap().to_path_buf());
    }
    out
}

/// A merge installs files, directories and symlinks, recording the
/// contents in merge order.
#[test]
fn test_basic_merge_records_contents() -> Result<()> {
    let dirs = tempfile::tempdir().unwrap();
    let image = dirs.path().join("image");
    let root = dirs.path().join("root");
    write(&image.join("usr/bin/tool"), "#!/bin/sh\n");
    write(&image.join("usr/share/doc/tool.txt"), "docs\n");
    std::os::unix::fs::symlink("tool", image.join("usr/bin/tool-alias")).unwrap();
    fs::create_dir_all(&root).unwrap();

    let environment = env();
    let mut merger = FsMerger::new(params(&environment, &image, &root));
    merger.check()?;
    merger.merge()?;

    assert_eq!(
        fs::read_to_string(root.join("usr/bin/tool")).unwrap(),
        "#!/bin/sh\n"
    );
    assert_eq!(
        fs::read_link(root.join("usr/bin/tool-alias")).unwrap(),
        PathBuf::from("tool")
    );

    let locations: Vec<&Path> = merger
        .contents()
        .entries()
        .iter()
        .map(|e| e.location())
        .collect();
    assert!(locations.contains(&Path::new("/usr/bin/tool")));
    assert!(locations.contains(&Path::new("/usr/bin/tool-alias")));
    assert!(locations.contains(&Path::new("/usr/share/doc")));
    assert!(merger.merged_entries().contains(Path::new("/usr/bin/tool")));
    Ok(())
}

/// Check never mutates the root and is idempotent.
#[test]
fn test_check_is_pure() -> Result<()> {
    let dirs = tempfile::tempdir().unwrap();
    let image = dirs.path().join("image");
    let root = dirs.path().join("root");
    write(&image.join("etc/app.conf"), "new\n");
    write(&root.join("etc/app.conf"), "old\n");

    let environment = env();
    let before = tree_of(&root);
    let mut merger = FsMerger::new(params(&environment, &image, &root));
    merger.check()?;
    let first = merger.contents().clone();
    merger.check()?;
    assert_eq!(&first, merger.contents(), "two checks agree");
    assert_eq!(before, tree_of(&root), "check mutated the root");
    assert_eq!(fs::read_to_string(root.join("etc/app.conf")).unwrap(), "old\n");
    Ok(())
}

/// Installing then uninstalling returns the root to its previous state.
#[test]
fn test_merge_unmerge_round_trip() -> Result<()> {
    let dirs = tempfile::tempdir().unwrap();
    let image = dirs.path().join("image");
    let root = dirs.path().join("root");
    write(&image.join("usr/bin/tool"), "x\n");
    write(&image.join("usr/lib/libtool.so.1"), "elf\n");
    std::os::unix::fs::symlink("libtool.so.1", image.join("usr/lib/libtool.so")).unwrap();
    write(&root.join("usr/bin/existing"), "keep me\n");

    let environment = env();
    let before = tree_of(&root);

    let mut merger = FsMerger::new(params(&environment, &image, &root));
    merger.check()?;
    merger.merge()?;
    assert!(root.join("usr/lib/libtool.so").exists() || fs::symlink_metadata(root.join("usr/lib/libtool.so")).is_ok());

    let contents = merger.contents().clone();
    let unmerger = Unmerger::new(UnmergerParams {
        env: &environment,
        root: root.clone(),
        contents: &contents,
        ignore_for_unmerge: Box::new(|_| false),
        config_protected: Box::new(|_| false),
    });
    let removed = unmerger.unmerge()?;
    assert!(!removed.is_empty());

    assert_eq!(before, tree_of(&root), "round trip must restore the root");
    assert_eq!(
        fs::read_to_string(root.join("usr/bin/existing")).unwrap(),
        "keep me\n"
    );
    Ok(())
}

/// Overwriting a protected config file diverts to a generated
/// `._cfgNNNN_` name and reports it.
#[test]
fn test_config_protection() -> Result<()> {
    let dirs = tempfile::tempdir().unwrap();
    let image = dirs.path().join("image");
    let root = dirs.path().join("root");
    write(&image.join("etc/app.conf"), "new\n");
    write(&root.join("etc/app.conf"), "old\n");

    let environment = env();
    let mut reported = Vec::new();
    let mut merger_params = params(&environment, &image, &root);
    merger_params.config_protected = Box::new(|_, dst| dst.to_string_lossy().contains("/etc/"));
    merger_params.used_this_for_config_protect = Box::new(|p| reported.push(p.to_path_buf()));
    let mut merger = FsMerger::new(merger_params);
    merger.check()?;
    merger.merge()?;
    drop(merger);

    assert_eq!(fs::read_to_string(root.join("etc/app.conf")).unwrap(), "old\n");
    assert_eq!(
        fs::read_to_string(root.join("etc/._cfg0000_app.conf")).unwrap(),
        "new\n"
    );
    assert_eq!(reported.len(), 1);
    assert!(reported[0].ends_with("._cfg0000_app.conf"));
    Ok(())
}

/// A second protected overwrite picks the next free generated name.
#[test]
fn test_config_protection_next_slot() -> Result<()> {
    let dirs = tempfile::tempdir().unwrap();
    let image = dirs.path().join("image");
    let root = dirs.path().join("root");
    write(&image.join("etc/app.conf"), "newer\n");
    write(&root.join("etc/app.conf"), "old\n");
    write(&root.join("etc/._cfg0000_app.conf"), "new\n");

    let environment = env();
    let mut merger_params = params(&environment, &image, &root);
    merger_params.config_protected = Box::new(|_, _| true);
    let mut merger = FsMerger::new(merger_params);
    merger.merge()?;

    assert_eq!(
        fs::read_to_string(root.join("etc/._cfg0001_app.conf")).unwrap(),
        "newer\n"
    );
    Ok(())
}

/// Symlinks pointing into the image are an error unless rewriting is
/// on, in which case they are rebased to the root.
#[test]
fn test_symlink_rewriting() -> Result<()> {
    let dirs = tempfile::tempdir().unwrap();
    let image = dirs.path().join("image");
    let root = dirs.path().join("root");
    write(&image.join("usr/lib/libreal.so"), "elf\n");
    std::os::unix::fs::symlink(image.join("usr/lib/libreal.so"), image.join("usr/lib/libabs.so"))
        .unwrap();
    fs::create_dir_all(&root).unwrap();

    let environment = env();
    let mut merger = FsMerger::new(params(&environment, &image, &root));
    assert!(merger.check().is_err(), "image-absolute target must fail");

    let mut merger_params = params(&environment, &image, &root);
    merger_params.options.rewrite_symlinks = true;
    let mut merger = FsMerger::new(merger_params);
    merger.check()?;
    merger.merge()?;
    assert_eq!(
        fs::read_link(root.join("usr/lib/libabs.so")).unwrap(),
        PathBuf::from("/usr/lib/libreal.so")
    );
    Ok(())
}

/// Empty source directories are an error unless permitted.
#[test]
fn test_empty_dir_policy() -> Result<()> {
    let dirs = tempfile::tempdir().unwrap();
    let image = dirs.path().join("image");
    let root = dirs.path().join("root");
    fs::create_dir_all(image.join("var/empty")).unwrap();
    fs::create_dir_all(&root).unwrap();

    let environment = env();
    let mut merger = FsMerger::new(params(&environment, &image, &root));
    assert!(merger.check().is_err());

    let mut merger_params = params(&environment, &image, &root);
    merger_params.options.allow_empty_dirs = true;
    let mut merger = FsMerger::new(merger_params);
    merger.check()?;
    merger.merge()?;
    assert!(root.join("var/empty").is_dir());
    Ok(())
}

/// A file landing on a directory is an error both ways around.
#[test]
fn test_kind_conflicts() -> Result<()> {
    let dirs = tempfile::tempdir().unwrap();
    let image = dirs.path().join("image");
    let root = dirs.path().join("root");
    write(&image.join("usr/thing"), "file\n");
    fs::create_dir_all(root.join("usr/thing")).unwrap();

    let environment = env();
    let mut merger = FsMerger::new(params(&environment, &image, &root));
    assert!(merger.check().is_err(), "file over directory");

    let dirs = tempfile::tempdir().unwrap();
    let image = dirs.path().join("image");
    let root = dirs.path().join("root");
    fs::create_dir_all(image.join("usr/thing")).unwrap();
    write(&image.join("usr/thing/keep"), "x\n");
    write(&root.join("usr/thing"), "file\n");

    let mut merger = FsMerger::new(params(&environment, &image, &root));
    assert!(merger.check().is_err(), "directory over file");
    Ok(())
}

/// Old mtimes are pulled forward to the configured floor; newer ones
/// are preserved.
#[test]
fn test_mtime_fixup() -> Result<()> {
    let dirs = tempfile::tempdir().unwrap();
    let image = dirs.path().join("image");
    let root = dirs.path().join("root");
    write(&image.join("usr/old"), "old\n");
    write(&image.join("usr/new"), "new\n");
    fs::create_dir_all(&root).unwrap();

    let floor = SystemTime::now() - Duration::from_secs(3600);
    let ancient = filetime::FileTime::from_system_time(floor - Duration::from_secs(86400));
    filetime::set_file_mtime(image.join("usr/old"), ancient).unwrap();
    let recent = fs::metadata(image.join("usr/new")).unwrap().modified().unwrap();

    let environment = env();
    let mut merger_params = params(&environment, &image, &root);
    merger_params.fix_mtimes_before = Some(floor);
    let mut merger = FsMerger::new(merger_params);
    merger.merge()?;

    let old_mtime = fs::metadata(root.join("usr/old")).unwrap().modified().unwrap();
    assert!(old_mtime >= floor - Duration::from_secs(1), "old mtime pulled forward");
    let new_mtime = fs::metadata(root.join("usr/new")).unwrap().modified().unwrap();
    let delta = new_mtime
        .duration_since(recent)
        .unwrap_or_else(|e| e.duration());
    assert!(delta < Duration::from_secs(2), "recent mtime preserved");
    Ok(())
}

/// Unmerge preserves config-protected files and keeps shared
/// directories that still have other occupants.
#[test]
fn test_unmerge_preserves_protected_and_shared() -> Result<()> {
    let dirs = tempfile::tempdir().unwrap();
    let image = dirs.path().join("image");
    let root = dirs.path().join("root");
    write(&image.join("etc/app.conf"), "conf\n");
    write(&image.join("usr/share/app/data"), "data\n");
    fs::create_dir_all(&root).unwrap();

    let environment = env();
    let mut merger = FsMerger::new(params(&environment, &image, &root));
    merger.merge()?;
    // Another package drops a file into the shared directory.
    write(&root.join("usr/share/app/other"), "other\n");

    let contents = merger.contents().clone();
    let unmerger = Unmerger::new(UnmergerParams {
        env: &environment,
        root: root.clone(),
        contents: &contents,
        ignore_for_unmerge: Box::new(|_| false),
        config_protected: Box::new(|p| p.starts_with("/etc")),
    });
    unmerger.unmerge()?;

    assert!(root.join("etc/app.conf").exists(), "protected config stays");
    assert!(!root.join("usr/share/app/data").exists());
    assert!(root.join("usr/share/app/other").exists(), "shared dir kept");
    assert!(root.join("usr/share/app").is_dir());
    Ok(())
}
