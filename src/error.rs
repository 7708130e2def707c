//! Unified error type for cinder.

use thiserror::Error;

/// Unified error type for all cinder operations.
///
/// This error type covers all failure modes across the crate's modules.
/// Error variants correspond to error *kinds*: a name that violates its
/// grammar, malformed user configuration, a failed or aborted action, an
/// unsupported action, an unrecoverable merger failure, and internal
/// invariant violations. Resolver inability to choose is never an error;
/// it flows through the result model as data.
#[derive(Error, Debug)]
pub enum CinderError {
    /// A string did not match the grammar for a name.
    #[error("Invalid {role} name: {input:?}")]
    Name {
        /// Which name grammar was violated (e.g. "category", "slot").
        role: &'static str,
        /// The offending input string.
        input: String,
    },

    /// A string did not parse as a version.
    #[error("Invalid version {input:?}: {reason}")]
    Version {
        /// The offending input string.
        input: String,
        /// Why the input was rejected.
        reason: String,
    },

    /// User configuration is malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A requested action could not complete.
    #[error("Action failed: {0}")]
    ActionFailed(String),

    /// An action was interrupted or forbidden before completion.
    #[error("Action aborted: {0}")]
    ActionAborted(String),

    /// A package does not implement the requested action kind.
    #[error("{id} does not support the {action} action")]
    UnsupportedAction {
        /// Uniquely identifying spec of the package.
        id: String,
        /// The action kind that was requested.
        action: String,
    },

    /// Unrecoverable filesystem merger failure.
    #[error("Merger error: {0}")]
    Merger(String),

    /// No package matched where one was required.
    #[error("No package matches {0:?}")]
    NoSuchPackage(String),

    /// More than one package matched where exactly one was required.
    #[error("{0:?} is ambiguous: more than one package matches")]
    AmbiguousPackage(String),

    /// A repository name did not resolve.
    #[error("No repository named {0:?}")]
    NoSuchRepository(String),

    /// A set name did not resolve.
    #[error("No set named {0:?}")]
    NoSuchSet(String),

    /// The resolver exceeded its restart bound.
    #[error("Resolver restarted more than {limit} times; giving up")]
    TooManyRestarts {
        /// The configured restart bound.
        limit: u32,
    },

    /// Invariant violation inside the core. Always fatal.
    #[error("Internal error at {location}: {message}")]
    Internal {
        /// Source location (file:line) where the invariant broke.
        location: String,
        /// Description of the broken invariant.
        message: String,
    },

    /// Filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for cinder operations.
pub type Result<T> = std::result::Result<T, CinderError>;

/// Construct a fatal [`CinderError::Internal`] carrying the current source
/// location.
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::error::CinderError::Internal {
            location: format!("{}:{}", file!(), line!()),
            message: format!($($arg)*),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_error_display() {
        let err = CinderError::Name {
            role: "category",
            input: "bad cat".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid category name: \"bad cat\"");
    }

    #[test]
    fn test_internal_error_macro_carries_location() {
        let err = internal_error!("resolvent {} decided twice", "x/y");
        match err {
            CinderError::Internal { location, message } => {
                assert!(location.contains("error.rs"));
                assert_eq!(message, "resolvent x/y decided twice");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
