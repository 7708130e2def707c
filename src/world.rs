//! The world file: the user's persisted top-level target set.
//!
//! Line-oriented text; each non-empty, non-comment line is either a
//! qualified package name or `@setname`. The file is a set: `add` is
//! idempotent, `remove` reports whether the line existed. Comments,
//! blank lines and ordering are preserved under modification. Changes
//! are written by atomic replace (write a temp file in the same
//! directory, persist over the original) under a scoped lock; reads are
//! lockless snapshots.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{CinderError, Result};
use crate::sets::SetRegistry;
use crate::spectree::{SetLeaf, SetSpecTree, SpecTree};
use crate::types::name::{QualifiedPackageName, SetName};
use crate::types::spec::PackageDepSpec;

/// One parsed world entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorldEntry {
    /// A qualified package name.
    Package(QualifiedPackageName),
    /// A named set (`@setname`).
    Set(SetName),
}

impl fmt::Display for WorldEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Package(q) => write!(f, "{q}"),
            Self::Set(s) => write!(f, "@{s}"),
        }
    }
}

impl WorldEntry {
    /// What: Parse one world-file line.
    ///
    /// Inputs:
    /// - `line`: The raw line.
    ///
    /// Output:
    /// - `Some(WorldEntry)` for a package or `@set` line.
    /// - `None` for blank lines, comments, and lines that parse as
    ///   neither (those are preserved verbatim but contribute nothing).
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }
        if let Some(set) = trimmed.strip_prefix('@') {
            return SetName::new(set).ok().map(Self::Set);
        }
        QualifiedPackageName::new(trimmed).ok().map(Self::Package)
    }
}

/// The world file handle.
pub struct World {
    file: PathBuf,
    write_lock: Mutex<()>,
}

impl World {
    /// Construct for a world file location. The file need not exist yet.
    #[must_use]
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The configured location.
    #[must_use]
    pub fn location(&self) -> &Path {
        &self.file
    }

    /// What: A lockless snapshot of the current entries.
    ///
    /// Output:
    /// - Parsed entries in file order. A missing file reads as empty.
    pub fn entries(&self) -> Result<Vec<WorldEntry>> {
        Ok(self
            .read_lines()?
            .iter()
            .filter_map(|l| WorldEntry::parse(l))
            .collect())
    }

    /// What: Add an entry; idempotent.
    ///
    /// Inputs:
    /// - `entry`: The entry to add.
    ///
    /// Output:
    /// - Returns `true` when the file changed, `false` when the entry was
    ///   already present.
    pub fn add(&self, entry: &WorldEntry) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut lines = self.read_lines()?;
        if lines.iter().any(|l| WorldEntry::parse(l).as_ref() == Some(entry)) {
            return Ok(false);
        }
        tracing::debug!("adding {} to world file {}", entry, self.file.display());
        lines.push(entry.to_string());
        self.rewrite(&lines)?;
        Ok(true)
    }

    /// What: Remove an entry.
    ///
    /// Output:
    /// - Returns `true` when the line existed and was removed.
    pub fn remove(&self, entry: &WorldEntry) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let lines = self.read_lines()?;
        let kept: Vec<String> = lines
            .iter()
            .filter(|l| WorldEntry::parse(l).as_ref() != Some(entry))
            .cloned()
            .collect();
        if kept.len() == lines.len() {
            return Ok(false);
        }
        tracing::debug!("removing {} from world file {}", entry, self.file.display());
        self.rewrite(&kept)?;
        Ok(true)
    }

    /// What: Rewrite a moved package's entry in one locked operation.
    ///
    /// Inputs:
    /// - `from`: The old qualified name.
    /// - `to`: The name the package moved to.
    ///
    /// Output:
    /// - Returns `true` when an entry was rewritten.
    pub fn update_for_package_move(
        &self,
        from: &QualifiedPackageName,
        to: &QualifiedPackageName,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut changed = false;
        let lines: Vec<String> = self
            .read_lines()?
            .into_iter()
            .map(|l| {
                if WorldEntry::parse(&l) == Some(WorldEntry::Package(from.clone())) {
                    changed = true;
                    to.to_string()
                } else {
                    l
                }
            })
            .collect();
        if changed {
            tracing::debug!(
                "world file {}: {from} moved to {to}",
                self.file.display()
            );
            self.rewrite(&lines)?;
        }
        Ok(changed)
    }

    /// The world contents as a set tree for the resolver.
    pub fn as_set_tree(&self) -> Result<SetSpecTree> {
        let leaves = self
            .entries()?
            .into_iter()
            .map(|entry| match entry {
                WorldEntry::Package(q) => SpecTree::Leaf(SetLeaf::Package(PackageDepSpec::simple(q))),
                WorldEntry::Set(s) => SpecTree::Leaf(SetLeaf::Set(s)),
            })
            .collect();
        Ok(SpecTree::All(leaves))
    }

    /// Register the world set into a registry.
    pub fn populate_sets(&self, sets: &mut SetRegistry) -> Result<()> {
        sets.register(SetName::new("world")?, self.as_set_tree()?);
        Ok(())
    }

    fn read_lines(&self) -> Result<Vec<String>> {
        match std::fs::read_to_string(&self.file) {
            Ok(text) => Ok(text.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(CinderError::Io(e)),
        }
    }

    /// Atomic replace: write a temp file next to the target, then
    /// persist it over the original.
    fn rewrite(&self, lines: &[String]) -> Result<()> {
        let parent = self.file.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        for line in lines {
            writeln!(temp, "{line}")?;
        }
        temp.flush()?;
        temp.persist(&self.file)
            .map_err(|e| CinderError::Io(e.error))?;
        Ok(())
    }
}
