//! Error types for debforge
//!
//! This module provides error handling for the library, including:
//! - Admission errors (duplicate keys, shutdown in progress)
//! - Worker launch and staging errors with filesystem context
//! - Configuration validation errors
//!
//! Errors raised before a worker exists (admission, staging, spawn) are
//! returned synchronously to the requester. Errors discovered mid-stream are
//! reported asynchronously as `Failed` terminal events instead.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::JobKey;

/// Result type alias for debforge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for debforge
///
/// This is the primary error type used throughout the library. Each variant
/// includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "limits.event_buffer")
        key: Option<String>,
    },

    /// A job with the same key is already running
    ///
    /// Admission is rejected with no side effect on the running job. The
    /// duplicate request is never queued or merged.
    #[error("job already running for key: {key}")]
    AlreadyRunning {
        /// The key that is already active in the registry
        key: JobKey,
    },

    /// Job not found in the registry
    #[error("job not found: {0}")]
    NotFound(JobKey),

    /// The worker program could not be launched
    ///
    /// Surfaces immediately; no partial job remains registered.
    #[error("failed to launch worker '{program}': {source}")]
    Spawn {
        /// The worker program that failed to launch
        program: PathBuf,
        /// The underlying OS error (executable missing, permission denied, ...)
        source: std::io::Error,
    },

    /// Writing staged input data failed before the worker was started
    #[error("failed to stage input at '{path}': {source}")]
    Staging {
        /// The staging path that could not be written
        path: PathBuf,
        /// The underlying I/O error (disk full, permission denied, ...)
        source: std::io::Error,
    },

    /// No worker binary was configured and none was found on PATH
    #[error("worker binary not found: {0}")]
    WorkerMissing(String),

    /// A request URL could not be parsed
    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        /// The URL string that failed to parse
        url: String,
        /// The underlying parse error
        source: url::ParseError,
    },

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error is an admission rejection for a key that is
    /// already active
    ///
    /// Rejections are expected during normal operation (a consumer clicking
    /// twice) and are typically not worth surfacing as failures.
    pub fn is_already_running(&self) -> bool {
        matches!(self, Error::AlreadyRunning { .. })
    }
}
