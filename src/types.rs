//! Core types for debforge

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Opaque key uniquely identifying one logical job
///
/// Keys partition the job space: two requests sharing a key are the same
/// logical job, and at most one job per key may be running at any time.
/// By convention the key is a repository URL (fetch), a download URL
/// (download + convert), or a caller-chosen identifier (patch).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(pub String);

impl JobKey {
    /// Create a new JobKey
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for JobKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of work a job performs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Fetch the release list for a repository
    Fetch,
    /// Download a package and convert it
    DownloadConvert,
    /// Patch a staged archive with tweak data
    Patch,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Fetch => write!(f, "fetch"),
            JobKind::DownloadConvert => write!(f, "download_convert"),
            JobKind::Patch => write!(f, "patch"),
        }
    }
}

/// Job lifecycle state
///
/// A job transitions out of `Running` exactly once and is removed from the
/// registry in the same transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Worker process is alive (or being launched)
    Running,
    /// Terminal: finished successfully
    Completed,
    /// Terminal: finished with an error
    Failed,
}

/// Final outcome of a job or worker-reported operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The operation completed successfully
    Completed,
    /// The operation failed
    Failed,
}

impl Outcome {
    /// Derive an outcome from a worker process exit code
    ///
    /// Zero maps to `Completed`; any other code, or termination by signal
    /// (no code at all), maps to `Failed`.
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => Outcome::Completed,
            _ => Outcome::Failed,
        }
    }
}

/// Read-only snapshot of a registered job, for diagnostics and tests
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobInfo {
    /// The job's key
    pub key: JobKey,
    /// The kind of work being performed
    pub kind: JobKind,
    /// Current lifecycle state
    pub state: JobState,
    /// When the job was admitted
    pub admitted_at: DateTime<Utc>,
}

/// One release of a repository, as reported by the worker
///
/// Only releases carrying at least one `.deb` asset are reported.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Release {
    /// Release display name
    #[serde(default)]
    pub name: String,
    /// Release tag
    #[serde(default)]
    pub tag_name: String,
    /// Publication timestamp, if the hosting API provided one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Downloadable `.deb` assets attached to the release
    #[serde(default)]
    pub deb_assets: Vec<ReleaseAsset>,
}

/// One downloadable asset of a release
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    /// Asset filename
    pub name: String,
    /// Direct download URL
    pub download_url: String,
}

/// Events emitted by the orchestrator
///
/// Subscribe via [`DebForge::subscribe`](crate::DebForge::subscribe).
/// Events for a single job are delivered in the order the worker wrote
/// them; the [`Event::Finished`] dispatch is always the last event for a
/// job's identifier. No ordering is guaranteed across distinct jobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A job was admitted and its worker is being launched
    Admitted {
        /// The job's key
        key: JobKey,
        /// The kind of work being performed
        kind: JobKind,
    },

    /// A worker reported progress on a job
    Progress {
        /// Routable identifier (the message's own identifier, or the job key)
        identifier: String,
        /// The stage reporting progress (e.g. "download", "conversion", "patch")
        phase: String,
        /// Stage-specific status text (e.g. "started", "extracting_ipa")
        status: String,
        /// Numeric progress (0.0 to 100.0), when the worker reported one
        #[serde(skip_serializing_if = "Option::is_none")]
        percent: Option<f32>,
    },

    /// A fetch job produced its release list
    ///
    /// Not terminal: the job still finishes through its exit status. A
    /// failed fetch carries `outcome: Failed` and the worker's error text.
    ReleasesFetched {
        /// Routable identifier (the repository URL)
        identifier: String,
        /// Whether the fetch succeeded
        outcome: Outcome,
        /// Releases carrying `.deb` assets (empty on failure)
        releases: Vec<Release>,
        /// Worker error text, if the fetch failed
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Conversion determined the package is a tweak and paused for input
    ///
    /// The job's worker has already exited and its registry slot is
    /// released. The consumer is expected to later issue a patch request
    /// for the same identifier, supplying the decrypted archive to patch.
    /// This is not a failure and no `Finished` event follows.
    AwaitingInput {
        /// Routable identifier
        identifier: String,
        /// Download URL of the tweak package
        download_url: String,
        /// Path to the extracted tweak data the patch will consume
        tweak_path: PathBuf,
    },

    /// A job reached its terminal state
    ///
    /// Dispatched exactly once per job, whether the outcome came from an
    /// explicit worker result message or was synthesized from the process
    /// exit code.
    Finished {
        /// Routable identifier
        identifier: String,
        /// Final outcome
        outcome: Outcome,
        /// Worker error text, if the job failed
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// The orchestrator has shut down
    Shutdown,
}
