//! The filesystem merger: install an image directory into a live root.
//!
//! Operation is two-phase: [`FsMerger::check`] walks the image and
//! validates every entry against the destination without touching the
//! root; [`FsMerger::merge`] repeats the walk performing the work. Each
//! entry is classified (file, directory, symlink, other) and dispatched
//! on the `(source kind, destination kind)` pair. Regular files landing
//! on protected configuration files are written under a generated
//! `._cfgNNNN_` name instead.

mod unmerge;

pub use unmerge::{Unmerger, UnmergerParams};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use indexmap::IndexSet;
use walkdir::WalkDir;

use crate::environment::Environment;
use crate::error::{CinderError, Result};
use crate::types::contents::{Contents, ContentsEntry};

/// Behaviour switches for one merge.
#[derive(Clone, Copy, Debug, Default)]
pub struct MergerOptions {
    /// Permit empty directories in the image.
    pub allow_empty_dirs: bool,
    /// Rewrite symlink targets that point into the image to be rooted at
    /// the destination instead; without this such targets are an error.
    pub rewrite_symlinks: bool,
}

/// What the merger did for one entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeStatusFlags {
    /// The destination existed and was replaced.
    pub replaced: bool,
    /// The file was diverted to a config-protect name.
    pub config_protected: bool,
    /// The symlink target was rewritten.
    pub rewrote_symlink: bool,
    /// Ownership was changed.
    pub fixed_ownership: bool,
    /// The mtime was pulled forward.
    pub fixed_mtime: bool,
}

/// Callback returning the uid/gid to give an installed entry; `-1`
/// means "leave alone".
pub type GetNewIds<'a> = Box<dyn Fn(&Path) -> (i64, i64) + 'a>;
/// Callback deciding whether a destination file is config-protected.
pub type ConfigProtected<'a> = Box<dyn Fn(&Path, &Path) -> bool + 'a>;
/// Callback told which generated name a protected file was written to.
pub type UsedForConfigProtect<'a> = Box<dyn FnMut(&Path) + 'a>;

/// Parameters for one merge.
pub struct FsMergerParams<'a> {
    /// Environment, for hooks.
    pub env: &'a Environment,
    /// The image directory holding the built artifacts.
    pub image: PathBuf,
    /// The live root to merge into.
    pub root: PathBuf,
    /// Subdirectory of the root to install under (empty for the root
    /// itself).
    pub install_under: PathBuf,
    /// Behaviour switches.
    pub options: MergerOptions,
    /// Entries with an mtime before this time get it instead.
    pub fix_mtimes_before: Option<SystemTime>,
    /// Disable ownership changes entirely (also forced by
    /// `CINDER_NO_CHOWN`).
    pub no_chown: bool,
    /// Ownership decision per source path.
    pub get_new_ids_or_minus_one: GetNewIds<'a>,
    /// Config-protection decision per (source, destination).
    pub config_protected: ConfigProtected<'a>,
    /// Receiver for generated config-protect names.
    pub used_this_for_config_protect: UsedForConfigProtect<'a>,
}

enum EntryKind {
    Nothing,
    File,
    Dir,
    Sym,
    Misc,
}

fn classify(path: &Path) -> EntryKind {
    match fs::symlink_metadata(path) {
        Err(_) => EntryKind::Nothing,
        Ok(meta) => {
            let file_type = meta.file_type();
            if file_type.is_symlink() {
                EntryKind::Sym
            } else if file_type.is_dir() {
                EntryKind::Dir
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                EntryKind::Misc
            }
        }
    }
}

/// Handles merging an image into a live root.
pub struct FsMerger<'a> {
    params: FsMergerParams<'a>,
    merged_entries: IndexSet<PathBuf>,
    contents: Contents,
}

impl<'a> FsMerger<'a> {
    /// Construct for one merge.
    #[must_use]
    pub fn new(params: FsMergerParams<'a>) -> Self {
        Self {
            params,
            merged_entries: IndexSet::new(),
            contents: Contents::new(),
        }
    }

    /// The destination paths this merger created (or, after a check,
    /// would create), in merge order.
    #[must_use]
    pub fn merged_entries(&self) -> &IndexSet<PathBuf> {
        &self.merged_entries
    }

    /// The recorded contents, for the installed-package database.
    #[must_use]
    pub fn contents(&self) -> &Contents {
        &self.contents
    }

    /// What: Validate the whole merge without mutating the root.
    ///
    /// Details:
    /// - Walks the image exactly as `merge` would and raises
    ///   `CinderError::Merger` on the first violation (file over
    ///   directory, directory over file, forbidden symlink target,
    ///   empty source directory, unmergeable special file).
    /// - Idempotent: repeated checks of the same inputs yield the same
    ///   outcome.
    pub fn check(&mut self) -> Result<()> {
        self.merged_entries.clear();
        self.contents = Contents::new();
        self.walk(true)
    }

    /// Perform the merge. Call [`FsMerger::check`] first; `merge`
    /// assumes the image is valid.
    pub fn merge(&mut self) -> Result<()> {
        self.merged_entries.clear();
        self.contents = Contents::new();
        fs::create_dir_all(self.destination_base())?;
        self.walk(false)
    }

    fn destination_base(&self) -> PathBuf {
        join_under(&self.params.root, &self.params.install_under)
    }

    /// The logical (under-root) path of a relative image path.
    fn logical_path(&self, rel: &Path) -> PathBuf {
        join_under(Path::new("/"), &join_under(&self.params.install_under, rel))
    }

    fn walk(&mut self, is_check: bool) -> Result<()> {
        let image = self.params.image.clone();
        for entry in WalkDir::new(&image).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| CinderError::Merger(format!("walking image: {e}")))?;
            let rel = entry
                .path()
                .strip_prefix(&image)
                .map_err(|e| CinderError::Merger(format!("image path escapes image: {e}")))?
                .to_path_buf();
            let src = entry.path().to_path_buf();
            let dst = join_under(&self.destination_base(), &rel);

            match classify(&src) {
                EntryKind::File => self.on_file(is_check, &src, &dst, &rel)?,
                EntryKind::Dir => self.on_dir(is_check, &src, &dst, &rel)?,
                EntryKind::Sym => self.on_sym(is_check, &src, &dst, &rel)?,
                EntryKind::Misc => {
                    return Err(CinderError::Merger(format!(
                        "cannot merge special file {}",
                        src.display()
                    )));
                }
                EntryKind::Nothing => {}
            }
        }
        Ok(())
    }

    fn hook(&self, is_check: bool, phase: &str, src: &Path, dst: &Path) -> Result<bool> {
        if is_check {
            return Ok(true);
        }
        let result = self.params.env.perform_hook(
            phase,
            &[
                ("INSTALL_SOURCE".to_string(), src.display().to_string()),
                ("INSTALL_DESTINATION".to_string(), dst.display().to_string()),
            ],
        )?;
        if result.requests_skip() {
            tracing::debug!("{phase} hook skipped {}", dst.display());
            return Ok(false);
        }
        if result.requests_abort() {
            return Err(CinderError::Merger(format!(
                "{phase} hook aborted merge of {} (status {})",
                dst.display(),
                result.max_exit_status
            )));
        }
        Ok(true)
    }

    fn on_file(&mut self, is_check: bool, src: &Path, dst: &Path, rel: &Path) -> Result<()> {
        if !self.hook(is_check, "merger_install_file_pre", src, dst)? {
            return Ok(());
        }
        let mut flags = MergeStatusFlags::default();
        let mut target = dst.to_path_buf();
        match classify(dst) {
            EntryKind::Dir => {
                return Err(CinderError::Merger(format!(
                    "cannot install file {} over directory {}",
                    src.display(),
                    dst.display()
                )));
            }
            EntryKind::File => {
                flags.replaced = true;
                if (self.params.config_protected)(src, dst) {
                    flags.config_protected = true;
                    target = self.config_protect_name(dst)?;
                    if !is_check {
                        (self.params.used_this_for_config_protect)(&target);
                    }
                }
            }
            EntryKind::Sym | EntryKind::Misc => {
                flags.replaced = true;
                if !is_check {
                    fs::remove_file(dst)?;
                }
            }
            EntryKind::Nothing => {}
        }

        if !is_check {
            fs::copy(src, &target)?;
            self.apply_ownership(src, &target, &mut flags)?;
            self.apply_mtime(src, &target, &mut flags)?;
            copy_xattrs(src, &target);
        }

        self.record(rel, ContentsEntry::File { location: self.logical_path(rel) });
        self.hook(is_check, "merger_install_file_post", src, dst)?;
        Ok(())
    }

    fn on_dir(&mut self, is_check: bool, src: &Path, dst: &Path, rel: &Path) -> Result<()> {
        if !self.hook(is_check, "merger_install_dir_pre", src, dst)? {
            return Ok(());
        }
        let empty = fs::read_dir(src)?.next().is_none();
        if empty && !self.params.options.allow_empty_dirs {
            return Err(CinderError::Merger(format!(
                "empty directory {} in image",
                src.display()
            )));
        }
        match classify(dst) {
            EntryKind::File | EntryKind::Misc => {
                return Err(CinderError::Merger(format!(
                    "cannot install directory {} over non-directory {}",
                    src.display(),
                    dst.display()
                )));
            }
            EntryKind::Sym => {
                // Replace the link with a real directory and descend.
                if !is_check {
                    fs::remove_file(dst)?;
                    fs::create_dir(dst)?;
                }
            }
            EntryKind::Nothing => {
                if !is_check {
                    fs::create_dir(dst)?;
                }
            }
            EntryKind::Dir => {}
        }
        if !is_check {
            let mut flags = MergeStatusFlags::default();
            self.apply_ownership(src, dst, &mut flags)?;
        }
        self.record(rel, ContentsEntry::Dir { location: self.logical_path(rel) });
        self.hook(is_check, "merger_install_dir_post", src, dst)?;
        Ok(())
    }

    fn on_sym(&mut self, is_check: bool, src: &Path, dst: &Path, rel: &Path) -> Result<()> {
        if !self.hook(is_check, "merger_install_sym_pre", src, dst)? {
            return Ok(());
        }
        let mut flags = MergeStatusFlags::default();
        let mut link_target = fs::read_link(src)?;

        if link_target.starts_with(&self.params.image) {
            if self.params.options.rewrite_symlinks {
                let rebased = link_target
                    .strip_prefix(&self.params.image)
                    .map_err(|e| CinderError::Merger(format!("rebasing symlink: {e}")))?;
                link_target = join_under(Path::new("/"), rebased);
                flags.rewrote_symlink = true;
            } else {
                return Err(CinderError::Merger(format!(
                    "symlink {} points into the image ({})",
                    src.display(),
                    link_target.display()
                )));
            }
        }

        match classify(dst) {
            EntryKind::Dir => {
                return Err(CinderError::Merger(format!(
                    "cannot install symlink {} over directory {}",
                    src.display(),
                    dst.display()
                )));
            }
            EntryKind::File | EntryKind::Sym | EntryKind::Misc => {
                flags.replaced = true;
                if !is_check {
                    fs::remove_file(dst)?;
                }
            }
            EntryKind::Nothing => {}
        }

        if !is_check {
            make_symlink(&link_target, dst)?;
            self.apply_ownership(src, dst, &mut flags)?;
        }

        self.record(
            rel,
            ContentsEntry::Sym {
                location: self.logical_path(rel),
                target: link_target,
            },
        );
        self.hook(is_check, "merger_install_sym_post", src, dst)?;
        Ok(())
    }

    /// Find a free `._cfgNNNN_<name>` slot beside the destination.
    fn config_protect_name(&self, dst: &Path) -> Result<PathBuf> {
        let dir = dst.parent().unwrap_or_else(|| Path::new("/"));
        let name = dst
            .file_name()
            .ok_or_else(|| CinderError::Merger(format!("no file name in {}", dst.display())))?
            .to_string_lossy()
            .into_owned();
        for n in 0..10000 {
            let candidate = dir.join(format!("._cfg{n:04}_{name}"));
            if !candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(CinderError::Merger(format!(
            "no free config-protect name for {}",
            dst.display()
        )))
    }

    fn apply_ownership(&self, src: &Path, dst: &Path, flags: &mut MergeStatusFlags) -> Result<()> {
        if self.params.no_chown || crate::env::env_no_chown() {
            return Ok(());
        }
        let (uid, gid) = (self.params.get_new_ids_or_minus_one)(src);
        if uid < 0 && gid < 0 {
            return Ok(());
        }
        lchown(dst, uid, gid)?;
        flags.fixed_ownership = true;
        Ok(())
    }

    fn apply_mtime(&self, src: &Path, dst: &Path, flags: &mut MergeStatusFlags) -> Result<()> {
        let src_mtime = fs::metadata(src)?.modified()?;
        let wanted = match self.params.fix_mtimes_before {
            Some(floor) if src_mtime < floor => {
                flags.fixed_mtime = true;
                floor
            }
            _ => src_mtime,
        };
        filetime::set_file_mtime(dst, filetime::FileTime::from_system_time(wanted))?;
        Ok(())
    }

    fn record(&mut self, rel: &Path, entry: ContentsEntry) {
        self.merged_entries.insert(self.logical_path(rel));
        self.contents.add(entry);
    }
}

/// Join `below` under `base`, treating an absolute `below` as relative.
fn join_under(base: &Path, below: &Path) -> PathBuf {
    let rel = below.strip_prefix("/").unwrap_or(below);
    if rel.as_os_str().is_empty() {
        base.to_path_buf()
    } else {
        base.join(rel)
    }
}

#[cfg(unix)]
fn make_symlink(target: &Path, dst: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, dst)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_symlink(_target: &Path, dst: &Path) -> Result<()> {
    Err(CinderError::Merger(format!(
        "symlinks unsupported on this platform ({})",
        dst.display()
    )))
}

#[cfg(unix)]
fn lchown(path: &Path, uid: i64, gid: i64) -> Result<()> {
    use std::os::unix::ffi::OsStrExt;
    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| CinderError::Merger(format!("path {} contains NUL", path.display())))?;
    let uid = if uid < 0 { u32::MAX } else { uid as u32 };
    let gid = if gid < 0 { u32::MAX } else { gid as u32 };
    // SAFETY: c_path is a valid NUL-terminated path.
    let rc = unsafe { libc::lchown(c_path.as_ptr(), uid, gid) };
    if rc != 0 {
        return Err(CinderError::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(not(unix))]
fn lchown(_path: &Path, _uid: i64, _gid: i64) -> Result<()> {
    Ok(())
}

/// Best-effort extended-attribute copy; failures are logged and
/// ignored.
#[cfg(target_os = "linux")]
fn copy_xattrs(src: &Path, dst: &Path) {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_src) = CString::new(src.as_os_str().as_bytes()) else {
        return;
    };
    let Ok(c_dst) = CString::new(dst.as_os_str().as_bytes()) else {
        return;
    };

    // SAFETY: both strings are valid NUL-terminated paths; the buffer
    // sizes passed match the allocations.
    unsafe {
        let len = libc::llistxattr(c_src.as_ptr(), std::ptr::null_mut(), 0);
        if len <= 0 {
            return;
        }
        let mut names = vec![0u8; len as usize];
        let len = libc::llistxattr(c_src.as_ptr(), names.as_mut_ptr().cast(), names.len());
        if len <= 0 {
            return;
        }
        names.truncate(len as usize);
        for name in names.split(|b| *b == 0).filter(|n| !n.is_empty()) {
            let Ok(c_name) = CString::new(name) else {
                continue;
            };
            let value_len = libc::lgetxattr(c_src.as_ptr(), c_name.as_ptr(), std::ptr::null_mut(), 0);
            if value_len < 0 {
                continue;
            }
            let mut value = vec![0u8; value_len as usize];
            let value_len =
                libc::lgetxattr(c_src.as_ptr(), c_name.as_ptr(), value.as_mut_ptr().cast(), value.len());
            if value_len < 0 {
                continue;
            }
            if libc::lsetxattr(
                c_dst.as_ptr(),
                c_name.as_ptr(),
                value.as_ptr().cast(),
                value_len as usize,
                0,
            ) != 0
            {
                tracing::debug!(
                    "could not copy xattr {:?} to {}",
                    String::from_utf8_lossy(name),
                    dst.display()
                );
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn copy_xattrs(_src: &Path, _dst: &Path) {}
