//! Shared test helpers for creating DebForge instances in tests.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

use crate::config::Config;
use crate::error::Result;
use crate::orchestrator::DebForge;
use crate::types::{Event, JobKey};
use crate::worker::{WorkerHandle, WorkerLauncher, WorkerOp, spawn_worker};

/// Launcher that runs a fixed shell script instead of the conversion binary.
///
/// The script receives no arguments; it just plays back whatever protocol
/// lines the test needs.
pub(crate) struct ScriptLauncher {
    script: String,
}

impl ScriptLauncher {
    pub(crate) fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

#[async_trait]
impl WorkerLauncher for ScriptLauncher {
    async fn launch(&self, _op: &WorkerOp) -> Result<WorkerHandle> {
        spawn_worker(
            Path::new("/bin/sh"),
            &[OsString::from("-c"), OsString::from(&self.script)],
        )
    }

    fn name(&self) -> &'static str {
        "script"
    }
}

/// Launcher whose spawn always fails (nonexistent binary).
pub(crate) struct BrokenLauncher;

#[async_trait]
impl WorkerLauncher for BrokenLauncher {
    async fn launch(&self, op: &WorkerOp) -> Result<WorkerHandle> {
        spawn_worker(Path::new("/nonexistent/debforge-test-worker"), &op.to_args())
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

/// Helper to create a test DebForge instance backed by a scripted worker.
/// Returns the forge and the tempdir (which must be kept alive).
pub(crate) async fn create_test_forge(script: &str) -> (DebForge, tempfile::TempDir) {
    create_test_forge_with(script, Config::default()).await
}

/// Like [`create_test_forge`], but with a caller-adjusted config.
/// The scratch directory is always redirected into the tempdir.
pub(crate) async fn create_test_forge_with(
    script: &str,
    mut config: Config,
) -> (DebForge, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    config.staging.scratch_dir = temp_dir.path().join("scratch");

    let forge = DebForge::with_launcher(config, Arc::new(ScriptLauncher::new(script)))
        .await
        .unwrap();
    (forge, temp_dir)
}

/// Helper to create a test DebForge instance whose launcher cannot spawn.
pub(crate) async fn create_broken_forge() -> (DebForge, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = Config::default();
    config.staging.scratch_dir = temp_dir.path().join("scratch");

    let forge = DebForge::with_launcher(config, Arc::new(BrokenLauncher))
        .await
        .unwrap();
    (forge, temp_dir)
}

/// Receive the next event, failing the test after a generous timeout.
pub(crate) async fn next_event(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Receive events until the first `Finished`, returning everything seen.
pub(crate) async fn events_until_finished(
    rx: &mut tokio::sync::broadcast::Receiver<Event>,
) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        let done = matches!(event, Event::Finished { .. });
        events.push(event);
        if done {
            return events;
        }
    }
}

/// Assert that no further event arrives within `for_ms` milliseconds.
pub(crate) async fn expect_silence(
    rx: &mut tokio::sync::broadcast::Receiver<Event>,
    for_ms: u64,
) {
    match tokio::time::timeout(Duration::from_millis(for_ms), rx.recv()).await {
        Err(_) => {}
        Ok(Ok(event)) => panic!("unexpected event: {:?}", event),
        Ok(Err(_)) => {}
    }
}

/// Poll until the key is no longer registered.
pub(crate) async fn wait_until_released(forge: &DebForge, key: &JobKey) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while forge.is_active(key).await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} was never released",
            key
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Names of all files currently in the forge's scratch directory.
pub(crate) fn scratch_entries(forge: &DebForge) -> Vec<String> {
    match std::fs::read_dir(forge.staging.scratch_dir()) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}
