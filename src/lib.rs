//! # debforge
//!
//! Embeddable orchestration backend for DEB to IPA conversion applications.
//!
//! ## Design Philosophy
//!
//! debforge is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//! - **Worker-agnostic** - The conversion program is an opaque external
//!   process speaking newline-delimited JSON; anything implementing
//!   [`WorkerLauncher`] can stand in for it
//! - **Deduplicating** - At most one running job per logical key, enforced
//!   atomically
//!
//! ## Quick Start
//!
//! ```no_run
//! use debforge::{DebForge, Config, Event};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let forge = DebForge::new(Config::default()).await?;
//!
//!     // Subscribe to events
//!     let mut events = forge.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Kick off a download + conversion, keyed by the URL
//!     forge
//!         .download_convert("https://host/releases/app.deb")
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Core orchestrator implementation (decomposed into focused submodules)
pub mod orchestrator;
/// Worker line protocol decoding
pub mod protocol;
/// Job registry (at most one running job per key)
pub mod registry;
/// Scratch-file staging for worker inputs
pub mod staging;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;
/// Worker process management
pub mod worker;

// Re-export commonly used types
pub use config::{Config, LimitsConfig, StagingConfig, WorkerConfig};
pub use error::{Error, Result};
pub use orchestrator::DebForge;
pub use protocol::{LineDecoder, WorkerMessage};
pub use registry::JobRegistry;
pub use staging::{StagedFile, StagingArea};
pub use types::{Event, JobInfo, JobKey, JobKind, JobState, Outcome, Release, ReleaseAsset};
pub use worker::{CliWorkerLauncher, WorkerHandle, WorkerLauncher, WorkerOp};

/// Helper function to run the orchestrator with graceful signal handling.
///
/// Waits for a termination signal and then calls the orchestrator's
/// `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal
///   registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use debforge::{DebForge, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let forge = DebForge::new(Config::default()).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(forge).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(forge: DebForge) -> Result<()> {
    wait_for_signal().await;
    forge.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
