//! Merge a built image into a throwaway root, then unmerge it again.
//!
//! Run with: `cargo run --example merge`

use std::fs;
use std::path::PathBuf;

use cinder::environment::Environment;
use cinder::merger::{FsMerger, FsMergerParams, MergerOptions, Unmerger, UnmergerParams};

fn main() -> cinder::Result<()> {
    let dirs = tempfile::tempdir()?;
    let image = dirs.path().join("image");
    let root = dirs.path().join("root");

    fs::create_dir_all(image.join("usr/bin"))?;
    fs::write(image.join("usr/bin/hello"), "#!/bin/sh\necho hello\n")?;
    fs::create_dir_all(image.join("etc"))?;
    fs::write(image.join("etc/hello.conf"), "greeting=hello\n")?;
    fs::create_dir_all(&root)?;

    let env = Environment::builder().build()?;
    let mut merger = FsMerger::new(FsMergerParams {
        env: &env,
        image: image.clone(),
        root: root.clone(),
        install_under: PathBuf::new(),
        options: MergerOptions::default(),
        fix_mtimes_before: None,
        no_chown: true,
        get_new_ids_or_minus_one: Box::new(|_| (-1, -1)),
        config_protected: Box::new(|_, dst| dst.to_string_lossy().contains("/etc/")),
        used_this_for_config_protect: Box::new(|path| {
            println!("config-protected write: {}", path.display());
        }),
    });

    merger.check()?;
    merger.merge()?;

    println!("merged entries:");
    for entry in merger.contents().entries() {
        println!("  {}", entry.location().display());
    }

    let contents = merger.contents().clone();
    let unmerger = Unmerger::new(UnmergerParams {
        env: &env,
        root: root.clone(),
        contents: &contents,
        ignore_for_unmerge: Box::new(|_| false),
        config_protected: Box::new(|_| false),
    });
    let removed = unmerger.unmerge()?;
    println!("removed {} entries again", removed.len());
    Ok(())
}
