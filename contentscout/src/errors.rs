//! This module defines the error types for contentscout.
//!
//! # Where errors stop
//!
//! A single-file operation (fetch, backup, write, revert) reports failure with
//! a `ScoutError`. Batch operations never let one of those escape: each file's
//! error is captured into its own outcome and the batch keeps going.
//!
//! ```rust,ignore
//! match store.read(&api, path, true).await {
//!     FetchOutcome::Fetched(content) => // search it,
//!     FetchOutcome::Failed(reason) => // log it, the page is NOT blank,
//! }
//!
//! let report = replace_selected(&ctx, &mut session).await?;
//! for outcome in report.failures() {
//!     // Err(ScoutError::BackupFailed { .. }) => write was skipped
//! }
//! ```
//!
//! Only configuration, validation and whole-operation problems (cancellation,
//! timeout) are returned as `Err` from the top-level calls.

use thiserror::Error;

/// Result type for contentscout operations
pub type ScoutResult<T> = Result<T, ScoutError>;

/// Errors that can occur while crawling, matching, writing or publishing
#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("Fetch failed for {path}: {reason}")]
    FetchFailed { path: String, reason: String },
    #[error("Could not parse content structure: {0}")]
    ParseFailed(String),
    #[error("Backup could not be created for {path}; write skipped")]
    BackupFailed { path: String },
    #[error("Write failed for {path}: {reason}")]
    WriteFailed { path: String, reason: String },
    #[error("Revert failed for {path}: {reason}")]
    RevertFailed { path: String, reason: String },
    #[error("Lifecycle request failed for {path}: {reason}")]
    LifecycleFailed { path: String, reason: String },
    #[error("Search configuration changed since the scan (expected {expected:016x}, found {found:016x})")]
    ConfigMismatch { expected: u64, found: u64 },
    #[error("Match {id} no longer lines up with the content of {path}")]
    MatchDrift { path: String, id: usize },
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl From<regex::Error> for ScoutError {
    fn from(err: regex::Error) -> Self {
        Self::InvalidPattern(err.to_string())
    }
}

impl From<config::ConfigError> for ScoutError {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl ScoutError {
    pub fn fetch_failed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FetchFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn parse_failed(msg: impl Into<String>) -> Self {
        Self::ParseFailed(msg.into())
    }

    pub fn backup_failed(path: impl Into<String>) -> Self {
        Self::BackupFailed { path: path.into() }
    }

    pub fn write_failed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn revert_failed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RevertFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn lifecycle_failed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LifecycleFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_pattern(pattern: impl Into<String>) -> Self {
        Self::InvalidPattern(pattern.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether this error belongs to a single file rather than the whole run
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            Self::FetchFailed { .. }
                | Self::BackupFailed { .. }
                | Self::WriteFailed { .. }
                | Self::RevertFailed { .. }
                | Self::LifecycleFailed { .. }
                | Self::MatchDrift { .. }
        )
    }
}
