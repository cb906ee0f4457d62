//! Job registry - at most one running job per logical key
//!
//! The registry is the only shared mutable state in the crate: a key-to-job
//! map mutated under a single mutex, with admission-and-insert performed as
//! one atomic step so two concurrent requests for the same key can never
//! both observe "absent". It is an explicit object passed by reference, not
//! process-wide state, so tests can run multiple independent registries.

use chrono::Utc;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::staging::StagedFile;
use crate::types::{JobInfo, JobKey, JobKind, JobState};

/// One admitted unit of work
///
/// Owned by the registry while running; handed back to the supervision task
/// on release so it controls cleanup ordering. Dropping the entry releases
/// the staged file (if any) through its own `Drop`.
#[derive(Debug)]
pub(crate) struct Job {
    pub(crate) kind: JobKind,
    pub(crate) state: JobState,
    pub(crate) admitted_at: chrono::DateTime<Utc>,
    /// Fired by cancel(), shutdown(), or the job timeout
    pub(crate) cancel: CancellationToken,
    /// Staged worker input, present for patch jobs only
    pub(crate) staged: Option<StagedFile>,
}

/// Maps a logical job key to at most one in-flight job
///
/// See the crate-level docs for the concurrency model. All operations are
/// async because the map is guarded by a [`tokio::sync::Mutex`].
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: tokio::sync::Mutex<HashMap<JobKey, Job>>,
}

impl JobRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a new job for `key`
    ///
    /// Registers the job only if no entry for `key` exists and returns its
    /// cancellation token. Check-and-insert happens inside one critical
    /// section.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] if the key is active. The running
    /// job is unaffected; the duplicate request is never queued or merged.
    pub async fn admit(&self, key: &JobKey, kind: JobKind) -> Result<CancellationToken> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(key) {
            return Err(Error::AlreadyRunning { key: key.clone() });
        }

        let cancel = CancellationToken::new();
        jobs.insert(
            key.clone(),
            Job {
                kind,
                state: JobState::Running,
                admitted_at: Utc::now(),
                cancel: cancel.clone(),
                staged: None,
            },
        );
        tracing::debug!(key = %key, kind = %kind, "Admitted job");
        Ok(cancel)
    }

    /// Attach a staged input file to an admitted job
    ///
    /// The file is released together with the job. No-op if the key is no
    /// longer registered (the file is then dropped, deleting it).
    pub(crate) async fn attach_staging(&self, key: &JobKey, staged: StagedFile) {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(key) {
            job.staged = Some(staged);
        }
    }

    /// Remove and return the entry for `key`, recording its final state
    ///
    /// Idempotent: removing an absent key is a no-op, never an error. The
    /// returned entry carries the staged file so the caller can release it
    /// after the registry slot is already free.
    pub(crate) async fn take(&self, key: &JobKey, final_state: JobState) -> Option<Job> {
        let mut jobs = self.jobs.lock().await;
        let mut job = jobs.remove(key)?;
        job.state = final_state;
        tracing::debug!(key = %key, state = ?final_state, "Released job");
        Some(job)
    }

    /// Remove the entry for `key`
    ///
    /// Idempotent: releasing an absent key is a no-op. Returns whether an
    /// entry existed. Any staged file attached to the entry is deleted.
    pub async fn release(&self, key: &JobKey) -> bool {
        self.take(key, JobState::Completed).await.is_some()
    }

    /// Read-only query for a single job
    pub async fn lookup(&self, key: &JobKey) -> Option<JobInfo> {
        let jobs = self.jobs.lock().await;
        jobs.get(key).map(|job| snapshot(key, job))
    }

    /// Cancellation token for a running job, if any
    pub(crate) async fn cancel_token(&self, key: &JobKey) -> Option<CancellationToken> {
        let jobs = self.jobs.lock().await;
        jobs.get(key).map(|job| job.cancel.clone())
    }

    /// Snapshots of every registered job
    pub async fn active(&self) -> Vec<JobInfo> {
        let jobs = self.jobs.lock().await;
        jobs.iter().map(|(key, job)| snapshot(key, job)).collect()
    }

    /// Number of registered jobs
    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    /// Whether no jobs are registered
    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }
}

fn snapshot(key: &JobKey, job: &Job) -> JobInfo {
    JobInfo {
        key: key.clone(),
        kind: job.kind,
        state: job.state,
        admitted_at: job.admitted_at,
    }
}
