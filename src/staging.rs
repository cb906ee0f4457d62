//! Scratch-file staging for worker inputs
//!
//! Workers expect file paths, not in-memory buffers. [`StagingArea`] writes
//! input bytes to a scratch file before the worker is spawned; the resulting
//! [`StagedFile`] is deleted exactly once when its job reaches a terminal
//! state, on every exit path (staging error, spawn error, worker failure,
//! success).

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::utils::sanitize_file_name;

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Creates and tracks scratch files inside a configured directory
#[derive(Clone, Debug)]
pub struct StagingArea {
    scratch_dir: PathBuf,
}

impl StagingArea {
    /// Create a staging area rooted at `scratch_dir`
    ///
    /// The directory is not created here; call [`StagingArea::ensure_dir`]
    /// once at startup.
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
        }
    }

    /// The directory staged files are written into
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Create the scratch directory if it does not exist
    ///
    /// # Errors
    ///
    /// Returns an I/O error annotated with the directory path if creation
    /// fails.
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create scratch directory '{}': {}",
                        self.scratch_dir.display(),
                        e
                    ),
                ))
            })
    }

    /// Write `bytes` to a new scratch file
    ///
    /// Uses the sanitized `suggested_name` when it does not collide,
    /// otherwise appends a ` (n)` counter before the extension until a free
    /// name is found.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Staging`] when the write fails (disk full,
    /// permission denied, missing scratch directory). Callers surface this
    /// to the consumer as a `Failed` terminal event; no worker is spawned.
    pub async fn stage(&self, bytes: &[u8], suggested_name: &str) -> Result<StagedFile> {
        let name = sanitize_file_name(suggested_name);
        let path = self.unique_path(&name);

        tokio::fs::write(&path, bytes).await.map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Failed to write staged input");
            Error::Staging { path: path.clone(), source: e }
        })?;

        tracing::debug!(
            path = %path.display(),
            bytes = bytes.len(),
            "Staged worker input"
        );
        Ok(StagedFile {
            path,
            released: false,
        })
    }

    /// Find a path under the scratch directory that does not exist yet
    fn unique_path(&self, name: &str) -> PathBuf {
        let candidate = self.scratch_dir.join(name);
        if !candidate.exists() {
            return candidate;
        }

        let stem = Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name);
        let extension = Path::new(name).extension().and_then(|s| s.to_str());

        for attempt in 1..=MAX_RENAME_ATTEMPTS {
            let renamed = match extension {
                Some(ext) => format!("{} ({}).{}", stem, attempt, ext),
                None => format!("{} ({})", stem, attempt),
            };
            let candidate = self.scratch_dir.join(renamed);
            if !candidate.exists() {
                return candidate;
            }
        }

        // Practically unreachable; the write itself will report the collision
        self.scratch_dir.join(name)
    }
}

/// A scratch file whose lifetime is bound to one job
///
/// Deleted exactly once: explicitly via [`StagedFile::remove`] on the
/// normal terminal path, or by `Drop` when the owning job is torn down
/// early. Deletion failures are logged and never escalated - the job's
/// outcome is already final by the time cleanup runs.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    released: bool,
}

impl StagedFile {
    /// Path to the staged file, passed to the worker on its command line
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the backing file
    pub async fn remove(mut self) {
        self.released = true;
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to delete staged file"
                );
            }
        } else {
            tracing::debug!(path = %self.path.display(), "Released staged file");
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to delete staged file on drop"
            );
        }
    }
}
