//! Core error types for orgsync-core.
//!
//! One enum per concern, composed into [`SyncError`]. Per-record failures
//! during a run are collected into the run report instead of propagating;
//! these types cover the run-level failures that do propagate.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for orgsync-core.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Local store (orgplan file) errors
    #[error("Orgplan store error: {0}")]
    Store(#[from] StoreError),

    /// Remote backend errors
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Run lock errors
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// One or more invalid/missing settings, collected in one pass
    #[error("Invalid configuration:\n{}", .0.iter().map(|e| format!("  - {e}")).collect::<Vec<_>>().join("\n"))]
    Invalid(Vec<String>),

    /// Unknown backend name
    #[error("Unknown backend '{0}'. Supported backends: microsoft, google")]
    UnknownBackend(String),
}

/// Local store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Scope file could not be read at all
    #[error("Failed to read orgplan file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Scope file could not be written
    #[error("Failed to write orgplan file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A referenced task no longer exists in the store
    #[error("Task no longer present in store: {0}")]
    MissingTask(String),
}

/// Remote backend errors.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Network-level failure (DNS, connect, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// API returned an error status
    #[error("API request failed: {status} - {message}")]
    Api { status: u16, message: String },

    /// API rate limit hit
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed or required
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Named task list does not exist on the backend
    #[error("Task list '{0}' not found")]
    ListNotFound(String),

    /// Response body did not have the expected shape
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// A record reached the backend without the identity it needs
    #[error("Record has no identity for this backend: {0}")]
    MissingIdentity(String),
}

impl BackendError {
    /// Whether a retry with backoff is worthwhile.
    ///
    /// Transient transport failures, server errors and rate limiting are
    /// retryable; auth failures and client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Network(_) => true,
            BackendError::RateLimited(_) => true,
            BackendError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Network(err.to_string())
    }
}

/// Run lock errors.
#[derive(Error, Debug)]
pub enum LockError {
    /// Another sync process holds the lock
    #[error("Another sync is already running (lock file: {0})")]
    Held(PathBuf),

    /// Lock file could not be created or removed
    #[error("Lock file operation failed on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for SyncError
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
