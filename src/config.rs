//! Configuration types for debforge

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// Default name of the worker binary searched for on PATH
pub const DEFAULT_WORKER_BINARY: &str = "debmaster";

/// Worker program configuration (binary location and invocation flags)
///
/// Groups settings for the external conversion/patching program. Used as a
/// nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Path to the worker executable (auto-detected if None)
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    /// Whether to search PATH for the worker binary if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Pass `--verbose` to every worker invocation (default: true)
    #[serde(default = "default_true")]
    pub verbose: bool,

    /// Extra arguments appended to every worker invocation
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            search_path: true,
            verbose: true,
            extra_args: Vec::new(),
        }
    }
}

/// Staging configuration (scratch files handed to workers)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Scratch directory for staged worker inputs (default: platform temp dir + "debforge")
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
        }
    }
}

/// Runtime limits and buffer sizes
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Event broadcast buffer size (default: 1000)
    ///
    /// Subscribers falling behind by more than this many events receive a
    /// lag error and skip ahead.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Maximum wall-clock time a job may run before being killed (default: None = unlimited)
    ///
    /// When set, a worker exceeding the limit is killed and its job is
    /// finished with a `Failed` terminal event. A hung worker otherwise
    /// holds its registry slot indefinitely, blocking any new request for
    /// the same key.
    #[serde(default)]
    pub job_timeout: Option<Duration>,

    /// How long `shutdown()` waits for cancelled jobs to drain (default: 30s)
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: Duration,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
            job_timeout: None,
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

/// Main configuration for [`DebForge`](crate::DebForge)
///
/// Works out of the box with zero configuration as long as the worker
/// binary is on PATH:
///
/// ```
/// use debforge::Config;
///
/// let config = Config::default();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Worker program configuration
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Staging configuration
    #[serde(default)]
    pub staging: StagingConfig,

    /// Runtime limits and buffer sizes
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Config {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending key when a setting is
    /// out of range. Worker binary existence is checked at orchestrator
    /// construction, not here, so a config can be validated on a machine
    /// that does not have the worker installed.
    pub fn validate(&self) -> Result<()> {
        if self.limits.event_buffer == 0 {
            return Err(Error::Config {
                message: "event buffer size must be at least 1".to_string(),
                key: Some("limits.event_buffer".to_string()),
            });
        }

        if let Some(timeout) = self.limits.job_timeout
            && timeout.is_zero()
        {
            return Err(Error::Config {
                message: "job timeout must be greater than zero when set".to_string(),
                key: Some("limits.job_timeout".to_string()),
            });
        }

        if self.limits.shutdown_grace.is_zero() {
            return Err(Error::Config {
                message: "shutdown grace period must be greater than zero".to_string(),
                key: Some("limits.shutdown_grace".to_string()),
            });
        }

        if self.staging.scratch_dir.as_os_str().is_empty() {
            return Err(Error::Config {
                message: "scratch directory must not be empty".to_string(),
                key: Some("staging.scratch_dir".to_string()),
            });
        }

        Ok(())
    }

    /// Resolve the worker binary path
    ///
    /// Uses the explicit `worker.binary_path` if set, otherwise searches
    /// PATH for [`DEFAULT_WORKER_BINARY`] when `worker.search_path` is
    /// enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerMissing`] if no binary could be resolved.
    pub fn resolve_worker_binary(&self) -> Result<PathBuf> {
        if let Some(path) = &self.worker.binary_path {
            return Ok(path.clone());
        }

        if self.worker.search_path
            && let Ok(found) = which::which(DEFAULT_WORKER_BINARY)
        {
            return Ok(found);
        }

        Err(Error::WorkerMissing(format!(
            "no worker.binary_path configured and '{}' was not found on PATH",
            DEFAULT_WORKER_BINARY
        )))
    }
}

fn default_true() -> bool {
    true
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("debforge")
}

fn default_event_buffer() -> usize {
    1000
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(30)
}
