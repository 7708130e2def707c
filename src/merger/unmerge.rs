//! The unmerger: remove a previously installed set of entries.

use std::fs;
use std::path::{Path, PathBuf};

use crate::environment::Environment;
use crate::error::Result;
use crate::types::contents::{Contents, ContentsEntry};

/// Callback deciding whether a recorded path stays behind.
pub type IgnoreForUnmerge<'a> = Box<dyn Fn(&Path) -> bool + 'a>;
/// Callback deciding whether a recorded path is protected configuration.
pub type ConfigProtectedPath<'a> = Box<dyn Fn(&Path) -> bool + 'a>;

/// Parameters for one unmerge.
pub struct UnmergerParams<'a> {
    /// Environment, for hooks.
    pub env: &'a Environment,
    /// The live root the contents were merged into.
    pub root: PathBuf,
    /// The recorded contents of the installed package.
    pub contents: &'a Contents,
    /// Paths to leave alone.
    pub ignore_for_unmerge: IgnoreForUnmerge<'a>,
    /// Paths preserved as protected configuration.
    pub config_protected: ConfigProtectedPath<'a>,
}

/// Removes a recorded contents set from a live root.
pub struct Unmerger<'a> {
    params: UnmergerParams<'a>,
}

impl<'a> Unmerger<'a> {
    /// Construct for one unmerge.
    #[must_use]
    pub const fn new(params: UnmergerParams<'a>) -> Self {
        Self { params }
    }

    /// What: Remove the recorded entries from the root.
    ///
    /// Output:
    /// - The logical paths actually removed.
    ///
    /// Details:
    /// - Walks the contents in *reverse* merge order, so files and
    ///   symlinks go before the directories containing them.
    /// - Files and symlinks are removed unconditionally unless ignored
    ///   or config-protected.
    /// - A directory is removed only when it is empty once its children
    ///   are gone.
    /// - Entries already missing from the root are logged and skipped.
    pub fn unmerge(&self) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for entry in self.params.contents.reverse_iter() {
            let location = entry.location();
            if (self.params.ignore_for_unmerge)(location) {
                tracing::debug!("ignoring {} for unmerge", location.display());
                continue;
            }
            let on_disk = self.physical(location);
            let gone = match entry {
                ContentsEntry::Dir { .. } => self.unlink_dir(&on_disk)?,
                ContentsEntry::File { .. } => {
                    if (self.params.config_protected)(location) {
                        tracing::debug!("preserving protected config {}", location.display());
                        false
                    } else {
                        self.unlink(&on_disk)?
                    }
                }
                ContentsEntry::Sym { .. }
                | ContentsEntry::Fifo { .. }
                | ContentsEntry::Dev { .. }
                | ContentsEntry::Other { .. } => self.unlink(&on_disk)?,
            };
            if gone {
                removed.push(location.to_path_buf());
            }
        }
        Ok(removed)
    }

    fn physical(&self, location: &Path) -> PathBuf {
        let rel = location.strip_prefix("/").unwrap_or(location);
        self.params.root.join(rel)
    }

    fn unlink(&self, path: &Path) -> Result<bool> {
        self.hook("unmerger_unlink_pre", path)?;
        match fs::remove_file(path) {
            Ok(()) => {
                self.hook("unmerger_unlink_post", path)?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("{} was already gone", path.display());
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn unlink_dir(&self, path: &Path) -> Result<bool> {
        match fs::remove_dir(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e)
                if e.kind() == std::io::ErrorKind::DirectoryNotEmpty
                    || e.raw_os_error() == Some(39) =>
            {
                tracing::debug!("keeping non-empty directory {}", path.display());
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn hook(&self, phase: &str, path: &Path) -> Result<()> {
        let result = self.params.env.perform_hook(
            phase,
            &[("UNLINK_TARGET".to_string(), path.display().to_string())],
        )?;
        if result.requests_abort() {
            return Err(crate::error::CinderError::Merger(format!(
                "{phase} hook aborted unmerge of {} (status {})",
                path.display(),
                result.max_exit_status
            )));
        }
        Ok(())
    }
}
