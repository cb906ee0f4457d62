//! Job admission - fetch, download-convert, and patch requests.
//!
//! Each request follows the same path: refuse during shutdown, validate the
//! input, atomically admit the key, stage input data if needed, launch the
//! worker, and hand the job to a supervision task. Failures before the
//! worker exists undo admission, surface a `Failed` terminal event for the
//! job, and return the error synchronously - no partial job is ever left
//! registered.

use std::path::Path;
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{Error, Result};
use crate::types::{Event, JobKey, JobKind, Outcome};
use crate::utils::filename_from_url;
use crate::worker::WorkerOp;

use super::DebForge;

impl DebForge {
    /// Fetch the release list for a repository
    ///
    /// The job is keyed by the repository URL. The worker queries the
    /// hosting API and reports the releases through a
    /// [`Event::ReleasesFetched`] event, followed by a terminal
    /// [`Event::Finished`].
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] if `repo_url` does not parse
    /// - [`Error::AlreadyRunning`] if a fetch for this URL is in flight
    /// - [`Error::Spawn`] if the worker could not be launched
    /// - [`Error::ShuttingDown`] once shutdown has begun
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use debforge::DebForge;
    /// # async fn example(forge: DebForge) -> debforge::Result<()> {
    /// let key = forge.fetch_releases("https://github.com/owner/repo").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn fetch_releases(&self, repo_url: &str) -> Result<JobKey> {
        self.ensure_accepting()?;
        validate_url(repo_url)?;

        let key = JobKey::from(repo_url);
        let cancel = self.registry.admit(&key, JobKind::Fetch).await?;
        let op = WorkerOp::FetchReleases {
            repo_url: repo_url.to_string(),
        };
        self.launch_admitted(key, op, cancel).await
    }

    /// Download a package and convert it
    ///
    /// The job is keyed by the download URL. Progress is reported through
    /// [`Event::Progress`] events. If conversion determines the package is
    /// a tweak rather than an app, the job ends with
    /// [`Event::AwaitingInput`] instead of a terminal event and the
    /// consumer is expected to follow up with [`DebForge::patch`].
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] if `download_url` does not parse
    /// - [`Error::AlreadyRunning`] if this URL is already being processed
    /// - [`Error::Spawn`] if the worker could not be launched
    /// - [`Error::ShuttingDown`] once shutdown has begun
    pub async fn download_convert(&self, download_url: &str) -> Result<JobKey> {
        self.ensure_accepting()?;
        validate_url(download_url)?;

        let key = JobKey::from(download_url);
        let cancel = self.registry.admit(&key, JobKind::DownloadConvert).await?;
        let op = WorkerOp::DownloadConvert {
            download_url: download_url.to_string(),
        };
        self.launch_admitted(key, op, cancel).await
    }

    /// Patch a staged archive with tweak data
    ///
    /// `identifier` keys the job and is chosen by the requester (typically
    /// derived from the download URL of the earlier
    /// [`Event::AwaitingInput`]). `ipa_bytes` is written to a scratch file
    /// named after `suggested_name` (or, when that is empty, after the last
    /// path segment of the identifier URL); the file lives exactly as long
    /// as the job and is deleted whichever way the job ends.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyRunning`] if a job with this identifier is in flight
    /// - [`Error::Staging`] if the input could not be written (also
    ///   surfaced as a `Failed` terminal event; no worker is spawned)
    /// - [`Error::Spawn`] if the worker could not be launched
    /// - [`Error::ShuttingDown`] once shutdown has begun
    pub async fn patch(
        &self,
        identifier: &str,
        ipa_bytes: &[u8],
        suggested_name: &str,
        tweak_path: &Path,
    ) -> Result<JobKey> {
        self.ensure_accepting()?;

        let key = JobKey::from(identifier);
        let cancel = self.registry.admit(&key, JobKind::Patch).await?;

        let name = if suggested_name.is_empty() {
            filename_from_url(identifier).unwrap_or_else(|| "staged.ipa".to_string())
        } else {
            suggested_name.to_string()
        };
        let staged = match self.staging.stage(ipa_bytes, &name).await {
            Ok(staged) => staged,
            Err(e) => {
                self.finish_job(&key, Outcome::Failed, Some(e.to_string()))
                    .await;
                return Err(e);
            }
        };

        let op = WorkerOp::Patch {
            ipa_path: staged.path().to_path_buf(),
            tweak_path: tweak_path.to_path_buf(),
        };
        // From here the staged file is owned by the job and released with it
        self.registry.attach_staging(&key, staged).await;

        self.launch_admitted(key, op, cancel).await
    }

    /// Launch the worker for an admitted job and start its supervision task
    async fn launch_admitted(
        &self,
        key: JobKey,
        op: WorkerOp,
        cancel: CancellationToken,
    ) -> Result<JobKey> {
        let kind = op.kind();
        match self.launcher.launch(&op).await {
            Ok(handle) => {
                tracing::info!(key = %key, kind = %kind, pid = handle.id(), "Worker launched");
                self.emit_event(Event::Admitted {
                    key: key.clone(),
                    kind,
                });

                let forge = self.clone();
                let job_key = key.clone();
                tokio::spawn(async move {
                    forge.supervise(job_key, handle, cancel).await;
                });

                Ok(key)
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Worker launch failed");
                self.finish_job(&key, Outcome::Failed, Some(e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.accepting_new.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::ShuttingDown)
        }
    }
}

fn validate_url(url: &str) -> Result<()> {
    Url::parse(url).map_err(|source| Error::InvalidUrl {
        url: url.to_string(),
        source,
    })?;
    Ok(())
}
