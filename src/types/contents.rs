//! Recorded on-disk contents of an installed package.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One filesystem entry recorded for an installed package. Locations are
/// absolute and canonical relative to the owning repository's installed
/// root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentsEntry {
    /// A regular file.
    File {
        /// Absolute location under the installed root.
        location: PathBuf,
    },
    /// A directory.
    Dir {
        /// Absolute location under the installed root.
        location: PathBuf,
    },
    /// A symbolic link.
    Sym {
        /// Absolute location under the installed root.
        location: PathBuf,
        /// The link target as recorded at install time.
        target: PathBuf,
    },
    /// A named pipe.
    Fifo {
        /// Absolute location under the installed root.
        location: PathBuf,
    },
    /// A device node.
    Dev {
        /// Absolute location under the installed root.
        location: PathBuf,
    },
    /// Anything else.
    Other {
        /// Absolute location under the installed root.
        location: PathBuf,
    },
}

impl ContentsEntry {
    /// The entry's absolute location.
    #[must_use]
    pub fn location(&self) -> &Path {
        match self {
            Self::File { location }
            | Self::Dir { location }
            | Self::Sym { location, .. }
            | Self::Fifo { location }
            | Self::Dev { location }
            | Self::Other { location } => location,
        }
    }

    /// Whether this entry is a directory.
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        matches!(self, Self::Dir { .. })
    }
}

/// What is present on disk for one installed package, in merge order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contents {
    entries: Vec<ContentsEntry>,
}

impl Contents {
    /// An empty contents record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry in merge order.
    pub fn add(&mut self, entry: ContentsEntry) {
        self.entries.push(entry);
    }

    /// The entries in merge order.
    #[must_use]
    pub fn entries(&self) -> &[ContentsEntry] {
        &self.entries
    }

    /// Iterate the entries in reverse merge order, the order uninstall
    /// walks them (files and symlinks before their containing dirs).
    pub fn reverse_iter(&self) -> impl Iterator<Item = &ContentsEntry> {
        self.entries.iter().rev()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<ContentsEntry> for Contents {
    fn from_iter<T: IntoIterator<Item = ContentsEntry>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
