//! Error taxonomy for sync, publish, and install operations.
//!
//! Errors are classified by blast radius: most are fatal only for the skill
//! being processed, while auth failures and lockfile corruption abort the
//! whole invocation.

use std::path::PathBuf;

/// Errors produced by the core sync/publish/install logic.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Local filesystem unreadable or unwritable.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Registry unreachable or transport-level failure.
    ///
    /// `retryable` distinguishes transient transport faults from permanent
    /// ones (e.g., an unparseable response body).
    #[error("network error: {message}")]
    Network { message: String, retryable: bool },

    /// Credential invalid or expired. Fatal for the entire invocation.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Malformed local skill content (e.g., no eligible files, bad slug).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Downloaded content hash does not match the version manifest.
    #[error("integrity check failed for '{path}': expected {expected}, got {actual}")]
    Integrity {
        path: String,
        expected: String,
        actual: String,
    },

    /// Install target contains local edits that do not match any known version.
    #[error("local files in {dir} do not match the installed version (use --force to overwrite)")]
    LocalMismatch { dir: PathBuf },

    /// Divergent or racing remote state; requires manual resolution.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Lockfile unreadable or corrupt. Fatal for the entire invocation.
    #[error("lockfile error: {0}")]
    Lockfile(String),

    /// Requested skill or version does not exist on the registry.
    #[error("not found: {0}")]
    NotFound(String),
}

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn network(message: impl Into<String>, retryable: bool) -> Self {
        Self::Network {
            message: message.into(),
            retryable,
        }
    }

    /// True if this error should abort the whole invocation rather than
    /// just the skill currently being processed.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Lockfile(_))
    }

    /// True if a bounded retry with backoff is permitted for this error.
    ///
    /// Only transient network faults qualify; callers must additionally
    /// restrict retries to idempotent read operations.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { retryable: true, .. })
    }
}

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, SyncError>;
