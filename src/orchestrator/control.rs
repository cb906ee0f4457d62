//! Job control - cancellation and diagnostics.

use crate::error::{Error, Result};
use crate::types::{JobInfo, JobKey};

use super::DebForge;

impl DebForge {
    /// Cancel a running job
    ///
    /// Signals the job's supervision task, which kills the worker process,
    /// dispatches a `Failed` terminal event (`error: "cancelled"`), frees
    /// the registry slot, and deletes any staged input. A new request for
    /// the same key is admissible as soon as that terminal event has been
    /// dispatched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no job with this key is running.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use debforge::{DebForge, JobKey};
    /// # async fn example(forge: DebForge) -> debforge::Result<()> {
    /// forge.cancel(&JobKey::from("https://host/app.deb")).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn cancel(&self, key: &JobKey) -> Result<()> {
        match self.registry.cancel_token(key).await {
            Some(token) => {
                tracing::info!(key = %key, "Cancellation requested");
                token.cancel();
                Ok(())
            }
            None => Err(Error::NotFound(key.clone())),
        }
    }

    /// Snapshots of all currently registered jobs
    pub async fn active_jobs(&self) -> Vec<JobInfo> {
        self.registry.active().await
    }

    /// Read-only query for a single job
    pub async fn lookup(&self, key: &JobKey) -> Option<JobInfo> {
        self.registry.lookup(key).await
    }

    /// Whether a job with this key is currently registered
    pub async fn is_active(&self, key: &JobKey) -> bool {
        self.registry.lookup(key).await.is_some()
    }
}
