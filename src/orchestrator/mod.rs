//! Core orchestrator implementation split into focused submodules.
//!
//! The `DebForge` struct and its methods are organized by domain:
//! - [`requests`] - Job admission (fetch / download-convert / patch)
//! - [`router`] - Per-job worker supervision and event routing
//! - [`control`] - Job control (cancel, diagnostics)
//! - [`lifecycle`] - Shutdown coordination

mod control;
mod lifecycle;
mod requests;
mod router;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::config::Config;
use crate::error::Result;
use crate::registry::JobRegistry;
use crate::staging::StagingArea;
use crate::types::Event;
use crate::worker::{CliWorkerLauncher, WorkerLauncher};

/// Main orchestrator instance (cloneable - all fields are Arc-wrapped)
///
/// Supervises external conversion/patching workers, multiplexes their
/// progress into [`Event`]s, guarantees at-most-one active job per logical
/// key, and cleans up staged inputs when jobs finish.
#[derive(Clone)]
pub struct DebForge {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Key-to-job registry; the only shared mutable state
    pub(crate) registry: Arc<JobRegistry>,
    /// Scratch-file staging for patch inputs
    pub(crate) staging: Arc<StagingArea>,
    /// Worker launcher (trait object for pluggable implementations)
    pub(crate) launcher: Arc<dyn WorkerLauncher>,
    /// Flag to indicate whether new jobs are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl std::fmt::Debug for DebForge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebForge")
            .field("config", &self.config)
            .field(
                "accepting_new",
                &self.accepting_new.load(std::sync::atomic::Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

impl DebForge {
    /// Create a new DebForge instance
    ///
    /// This initializes all core components:
    /// - Validates the configuration
    /// - Creates the scratch directory for staged inputs
    /// - Resolves the worker binary (explicit path or PATH search)
    /// - Sets up the event broadcast channel
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the scratch
    /// directory cannot be created, or no worker binary could be resolved.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let binary = config.resolve_worker_binary()?;
        let launcher = CliWorkerLauncher::new(binary)
            .verbose(config.worker.verbose)
            .extra_args(config.worker.extra_args.clone());

        Self::with_launcher(config, Arc::new(launcher)).await
    }

    /// Create a DebForge instance with a custom worker launcher
    ///
    /// Skips worker binary resolution; everything else matches
    /// [`DebForge::new`]. Intended for embedding alternative worker
    /// implementations and for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the scratch
    /// directory cannot be created.
    pub async fn with_launcher(config: Config, launcher: Arc<dyn WorkerLauncher>) -> Result<Self> {
        config.validate()?;

        let staging = StagingArea::new(config.staging.scratch_dir.clone());
        staging.ensure_dir().await?;

        // Broadcast channel sized from config; subscribers falling behind
        // receive a lag error and skip ahead
        let (event_tx, _rx) = tokio::sync::broadcast::channel(config.limits.event_buffer);

        tracing::info!(
            scratch_dir = %staging.scratch_dir().display(),
            launcher = launcher.name(),
            "Orchestrator initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            event_tx,
            registry: Arc::new(JobRegistry::new()),
            staging: Arc::new(staging),
            launcher,
            accepting_new: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Subscribe to orchestrator events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all
    /// events independently. Events are buffered, but if a subscriber falls
    /// behind by more than the configured buffer size, it will receive a
    /// `RecvError::Lagged` error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use debforge::{DebForge, Config};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let forge = DebForge::new(Config::default()).await?;
    ///
    ///     let mut events = forge.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             println!("Event: {:?}", event);
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Subscribe to orchestrator events as a `Stream`
    ///
    /// Wraps [`DebForge::subscribe`] in a
    /// [`BroadcastStream`](tokio_stream::wrappers::BroadcastStream) for
    /// consumers that prefer stream combinators over `recv()` loops.
    pub fn event_stream(&self) -> tokio_stream::wrappers::BroadcastStream<Event> {
        tokio_stream::wrappers::BroadcastStream::new(self.subscribe())
    }

    /// Get the current configuration
    ///
    /// The configuration is wrapped in an Arc, so this is a cheap clone
    /// operation.
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Short name of the active worker launcher, for diagnostics
    pub fn launcher_name(&self) -> &'static str {
        self.launcher.name()
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped
    /// (ok() converts Err to None). Orchestration continues even if no one
    /// is listening.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
