//! Per-job worker supervision and event routing.
//!
//! One supervision task runs per job: it drains stderr to the logs, feeds
//! stdout chunks through a [`LineDecoder`], routes each decoded message to
//! the subscribers, and resolves the job's terminal state. Two terminal
//! sources exist - an explicit worker result message and the process exit -
//! and exactly one terminal dispatch reaches the consumer even when both
//! fire. The terminal dispatch is always the last event for the job's
//! identifier.

use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::protocol::{LineDecoder, WorkerMessage};
use crate::types::{Event, JobKey, JobState, Outcome};
use crate::worker::WorkerHandle;

use super::DebForge;

/// Read size for worker stdout; lines regularly straddle chunk boundaries
const READ_CHUNK: usize = 4096;

impl DebForge {
    /// Supervise one worker process until its job is resolved
    pub(crate) async fn supervise(
        self,
        key: JobKey,
        mut handle: WorkerHandle,
        cancel: CancellationToken,
    ) {
        if let Some(stderr) = handle.take_stderr() {
            tokio::spawn(drain_stderr(key.clone(), stderr));
        }

        let mut stdout = handle.take_stdout();
        let mut decoder = LineDecoder::new();
        let mut buf = [0u8; READ_CHUNK];
        // Set once the job's final dispatch (terminal or tweak pause) is out
        let mut finished = false;

        let deadline = self
            .config
            .limits
            .job_timeout
            .map(|timeout| tokio::time::Instant::now() + timeout);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(key = %key, "Job cancelled, killing worker");
                    handle.kill().await;
                    if !finished {
                        self.finish_job(&key, Outcome::Failed, Some("cancelled".to_string()))
                            .await;
                        finished = true;
                    }
                    break;
                }
                _ = deadline_elapsed(deadline) => {
                    tracing::warn!(key = %key, "Job timed out, killing worker");
                    handle.kill().await;
                    if !finished {
                        self.finish_job(&key, Outcome::Failed, Some("timed out".to_string()))
                            .await;
                        finished = true;
                    }
                    break;
                }
                result = read_some(&mut stdout, &mut buf) => match result {
                    Ok(0) => break,
                    Ok(n) => {
                        for message in decoder.feed(&buf[..n]) {
                            self.route_message(&key, message, &mut finished).await;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Error reading worker output");
                        break;
                    }
                }
            }
        }

        // The exit status is the authoritative signal that no further
        // protocol messages will arrive
        match handle.wait().await {
            Ok(status) => {
                tracing::debug!(key = %key, code = ?status.code(), "Worker exited");
                if !finished {
                    let outcome = Outcome::from_exit_code(status.code());
                    let error = match outcome {
                        Outcome::Completed => None,
                        Outcome::Failed => Some(exit_error_text(status.code())),
                    };
                    self.finish_job(&key, outcome, error).await;
                }
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to reap worker process");
                if !finished {
                    self.finish_job(
                        &key,
                        Outcome::Failed,
                        Some(format!("failed to reap worker: {}", e)),
                    )
                    .await;
                }
            }
        }
    }

    /// Route one decoded worker message to the consumer
    async fn route_message(&self, key: &JobKey, message: WorkerMessage, finished: &mut bool) {
        if *finished {
            // Terminal already dispatched; nothing further may follow it
            tracing::debug!(key = %key, ?message, "Dropping post-terminal worker message");
            return;
        }

        match message {
            WorkerMessage::Progress {
                identifier,
                phase,
                status,
                percent,
            } => {
                self.emit_event(Event::Progress {
                    identifier: identifier.unwrap_or_else(|| key.to_string()),
                    phase,
                    status,
                    percent,
                });
            }
            WorkerMessage::GithubReleases {
                outcome,
                releases,
                error,
            } => {
                self.emit_event(Event::ReleasesFetched {
                    identifier: key.to_string(),
                    outcome,
                    releases,
                    error,
                });
            }
            WorkerMessage::TweakDetected {
                identifier,
                download_url,
                tweak_path,
            } => {
                // Not terminal and not a failure: conversion stopped because
                // the package is a tweak. The slot is freed so the follow-up
                // patch request can be admitted, and the synthesized exit
                // terminal is suppressed - the pause is this job's final
                // dispatch.
                self.release_job(key, JobState::Completed).await;
                self.emit_event(Event::AwaitingInput {
                    identifier: identifier.unwrap_or_else(|| key.to_string()),
                    download_url,
                    tweak_path: PathBuf::from(tweak_path),
                });
                *finished = true;
            }
            WorkerMessage::OperationResult {
                identifier,
                outcome,
                error,
            } => {
                let state = match outcome {
                    Outcome::Completed => JobState::Completed,
                    Outcome::Failed => JobState::Failed,
                };
                self.release_job(key, state).await;
                self.emit_event(Event::Finished {
                    identifier: identifier.unwrap_or_else(|| key.to_string()),
                    outcome,
                    error,
                });
                *finished = true;
            }
            WorkerMessage::Unrecognized { raw } => {
                tracing::warn!(key = %key, line = %raw, "Discarding unrecognized worker message");
            }
        }
    }

    /// Resolve a job: release its registry slot and dispatch the terminal event
    pub(crate) async fn finish_job(&self, key: &JobKey, outcome: Outcome, error: Option<String>) {
        let state = match outcome {
            Outcome::Completed => JobState::Completed,
            Outcome::Failed => JobState::Failed,
        };
        self.release_job(key, state).await;
        self.emit_event(Event::Finished {
            identifier: key.to_string(),
            outcome,
            error,
        });
    }

    /// Remove the registry entry and release its staged input, exactly once
    async fn release_job(&self, key: &JobKey, state: JobState) {
        if let Some(job) = self.registry.take(key, state).await
            && let Some(staged) = job.staged
        {
            staged.remove().await;
        }
    }
}

async fn read_some(
    stdout: &mut Option<tokio::process::ChildStdout>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match stdout.as_mut() {
        Some(out) => out.read(buf).await,
        // No stdout pipe at all: treat as an immediately-closed stream
        None => Ok(0),
    }
}

/// Resolves when the job deadline passes; never resolves without a deadline
async fn deadline_elapsed(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

fn exit_error_text(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("worker exited with code {}", code),
        None => "worker terminated by signal".to_string(),
    }
}

/// Drain a worker's stderr into the logs
///
/// Stderr is diagnostic text only, never protocol-bearing, and may contain
/// binary noise - it is decoded lossily and never parsed. Draining keeps
/// the pipe from filling up and blocking the worker.
async fn drain_stderr(key: JobKey, mut stderr: tokio::process::ChildStderr) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                for line in String::from_utf8_lossy(&buf[..n]).lines() {
                    if !line.trim().is_empty() {
                        tracing::debug!(key = %key, line = %line, "worker stderr");
                    }
                }
            }
        }
    }
}
