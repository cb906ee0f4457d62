//! Shutdown coordination.

use crate::error::Result;
use crate::types::Event;

use super::DebForge;

impl DebForge {
    /// Gracefully shut down the orchestrator
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new jobs (further requests return
    ///    [`Error::ShuttingDown`](crate::Error::ShuttingDown))
    /// 2. Cancels all active jobs (their workers are killed and each job
    ///    receives its `Failed` terminal event)
    /// 3. Waits for the registry to drain, up to the configured grace period
    /// 4. Emits [`Event::Shutdown`]
    ///
    /// # Errors
    ///
    /// The sequence itself is infallible; the `Result` is kept so callers
    /// can treat shutdown like other lifecycle operations.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new jobs
        self.accepting_new
            .store(false, std::sync::atomic::Ordering::SeqCst);
        tracing::info!("Stopped accepting new jobs");

        // 2. Cancel all active jobs
        let active = self.registry.active().await;
        tracing::debug!(active_count = active.len(), "Cancelling active jobs");
        for info in &active {
            if let Some(token) = self.registry.cancel_token(&info.key).await {
                tracing::debug!(key = %info.key, "Signalling cancellation");
                token.cancel();
            }
        }

        // 3. Wait for supervision tasks to resolve every job
        let grace = self.config.limits.shutdown_grace;
        match tokio::time::timeout(grace, self.wait_for_drain()).await {
            Ok(()) => {
                tracing::info!("All jobs resolved");
            }
            Err(_) => {
                tracing::warn!("Timeout waiting for jobs to resolve, proceeding with shutdown");
            }
        }

        // 4. Emit shutdown event
        self.emit_event(Event::Shutdown);

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Wait until no jobs remain registered
    async fn wait_for_drain(&self) {
        loop {
            if self.registry.is_empty().await {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }
}
