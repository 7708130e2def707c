//! Masks: the reasons a package is not installable.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One reason a package is not installable. A package is masked iff at
/// least one mask applies to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mask {
    /// Imposed by user configuration.
    User {
        /// Configuration token identifying the masking entry.
        token: String,
    },
    /// The package carries a metadata value the user has not accepted
    /// (typically a keyword or a license).
    Unaccepted {
        /// The raw name of the offending metadata key.
        key: String,
    },
    /// Imposed by the repository.
    Repository {
        /// The mask comment as written in the repository.
        comment: String,
        /// Token identifying the mask entry.
        token: String,
        /// The file the mask came from.
        mask_file: PathBuf,
    },
    /// The package cannot be used at all (e.g. unreadable metadata or an
    /// unknown format version).
    Unsupported {
        /// Free-form explanation.
        explanation: String,
    },
    /// Masked because an associated package is masked.
    Association {
        /// Uniquely identifying spec of the associated package.
        associated: String,
    },
}

impl Mask {
    /// A one-word description of the mask kind, for display.
    #[must_use]
    pub const fn key(&self) -> char {
        match self {
            Self::User { .. } => 'U',
            Self::Unaccepted { .. } => 'K',
            Self::Repository { .. } => 'R',
            Self::Unsupported { .. } => 'E',
            Self::Association { .. } => 'A',
        }
    }

    /// A short human description of the mask.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::User { token } => format!("masked by user ({token})"),
            Self::Unaccepted { key } => format!("{key} not accepted"),
            Self::Repository { comment, .. } => format!("masked by repository: {comment}"),
            Self::Unsupported { explanation } => format!("unsupported: {explanation}"),
            Self::Association { associated } => format!("associated package {associated} is masked"),
        }
    }
}

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// Why a mask was overridden. The override is recorded but the
/// underlying mask stays visible for display.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskOverrideReason {
    /// The user accepted an unstable keyword for this package.
    AcceptedUnstableKeyword,
    /// The user explicitly unmasked the package.
    OverriddenByUser,
}

/// A mask together with the reason it no longer blocks installation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverriddenMask {
    /// The underlying mask.
    pub mask: Mask,
    /// Why it was overridden.
    pub override_reason: MaskOverrideReason,
}
