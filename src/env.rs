//! Environment variable configuration for cinder.
//!
//! This module provides utilities for reading configuration from
//! environment variables, allowing zero-code configuration of the core
//! by runners and wrapper clients.

use std::path::PathBuf;

/// What: Read the no-chown flag from `CINDER_NO_CHOWN`.
///
/// Inputs: None
///
/// Output:
/// - Returns `true` when the variable holds a truthy value.
///
/// Details:
/// - Accepts "1", "true", "yes", "on" (case-insensitive) as truthy.
/// - Unset or any other value reads as `false`.
/// - When set, the filesystem merger leaves ownership of installed
///   entries alone.
#[must_use]
pub fn env_no_chown() -> bool {
    std::env::var("CINDER_NO_CHOWN")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// What: Read the calling client's name from `CINDER_CLIENT`.
///
/// Inputs: None
///
/// Output:
/// - `Option<String>` containing the client name if set and non-empty.
///
/// Details:
/// - Set by runners to identify the front-end on whose behalf the core
///   is acting; surfaces in hook environments.
#[must_use]
pub fn env_client() -> Option<String> {
    std::env::var("CINDER_CLIENT").ok().filter(|s| !s.is_empty())
}

/// What: Read the distribution selector from `CINDER_DISTRIBUTION`.
///
/// Inputs: None
///
/// Output:
/// - `Option<String>` containing the distribution name if set and
///   non-empty.
///
/// Details:
/// - Selects a distribution-defaults profile by name.
#[must_use]
pub fn env_distribution() -> Option<String> {
    std::env::var("CINDER_DISTRIBUTION").ok().filter(|s| !s.is_empty())
}

/// What: Read the fetcher search directory from `CINDER_FETCHERS_DIR`.
///
/// Inputs: None
///
/// Output:
/// - `Option<PathBuf>` if the variable is set and non-empty.
#[must_use]
pub fn env_fetchers_dir() -> Option<PathBuf> {
    std::env::var_os("CINDER_FETCHERS_DIR")
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

/// What: Read the syncer search directory from `CINDER_SYNCERS_DIR`.
///
/// Inputs: None
///
/// Output:
/// - `Option<PathBuf>` if the variable is set and non-empty.
#[must_use]
pub fn env_syncers_dir() -> Option<PathBuf> {
    std::env::var_os("CINDER_SYNCERS_DIR")
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

/// What: Read the repository plugin directory from
/// `CINDER_REPOSITORY_SO_DIR`.
///
/// Inputs: None
///
/// Output:
/// - `Option<PathBuf>` if the variable is set and non-empty.
///
/// Details:
/// - Only meaningful to builds with pluggable repository formats; the
///   core merely reports the configured location.
#[must_use]
pub fn env_repository_so_dir() -> Option<PathBuf> {
    std::env::var_os("CINDER_REPOSITORY_SO_DIR")
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}
