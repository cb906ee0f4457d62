//! Worker process management
//!
//! The conversion/patching worker is an external program treated as a black
//! box: it reads CLI arguments and writes newline-delimited JSON status
//! messages to its standard output. Standard error carries free-form
//! diagnostic text only and is never parsed.
//!
//! [`WorkerLauncher`] is the seam between the orchestrator and the worker
//! binary; [`CliWorkerLauncher`] is the production implementation, and tests
//! substitute scripted launchers.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::config::DEFAULT_WORKER_BINARY;
use crate::error::{Error, Result};
use crate::types::JobKind;

/// One operation the worker can be asked to perform
///
/// Maps one-to-one onto the worker's CLI surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerOp {
    /// Fetch the release list for a repository (`--github <repo-url>`)
    FetchReleases {
        /// Repository URL to query
        repo_url: String,
    },
    /// Download a package and convert it (`--download-url <url>`)
    DownloadConvert {
        /// Direct download URL of the `.deb` package
        download_url: String,
    },
    /// Patch a staged archive with tweak data
    /// (`--patch <ipa> --with-data-tar <tweak>`)
    Patch {
        /// Path to the staged archive to patch
        ipa_path: PathBuf,
        /// Path to the tweak data the worker injects
        tweak_path: PathBuf,
    },
}

impl WorkerOp {
    /// The job kind this operation corresponds to
    pub fn kind(&self) -> JobKind {
        match self {
            WorkerOp::FetchReleases { .. } => JobKind::Fetch,
            WorkerOp::DownloadConvert { .. } => JobKind::DownloadConvert,
            WorkerOp::Patch { .. } => JobKind::Patch,
        }
    }

    /// Build the argument vector for this operation
    pub fn to_args(&self) -> Vec<OsString> {
        match self {
            WorkerOp::FetchReleases { repo_url } => {
                vec![OsString::from("--github"), OsString::from(repo_url)]
            }
            WorkerOp::DownloadConvert { download_url } => {
                vec![OsString::from("--download-url"), OsString::from(download_url)]
            }
            WorkerOp::Patch {
                ipa_path,
                tweak_path,
            } => vec![
                OsString::from("--patch"),
                ipa_path.clone().into_os_string(),
                OsString::from("--with-data-tar"),
                tweak_path.clone().into_os_string(),
            ],
        }
    }
}

/// A spawned worker process
///
/// Wraps the child with piped stdout (the line protocol) and stderr
/// (diagnostics). The child is killed if the handle is dropped before it
/// exits, so an aborted supervision task cannot leak a process.
#[derive(Debug)]
pub struct WorkerHandle {
    child: Child,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl WorkerHandle {
    /// Take the protocol-bearing stdout stream
    ///
    /// Returns `None` on the second call.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Take the diagnostic stderr stream
    ///
    /// Returns `None` on the second call.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// OS process id, if the process is still running
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the process to exit
    ///
    /// This is the authoritative signal that no further protocol messages
    /// will arrive.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if waiting on the child fails.
    pub async fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        self.child.wait().await
    }

    /// Kill the process
    ///
    /// Waits for the OS to reap it so no zombie remains.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            // The process may have already exited; that is fine
            if e.kind() != std::io::ErrorKind::InvalidInput {
                tracing::warn!(error = %e, "Failed to kill worker process");
            }
        }
    }
}

/// Spawn `program` with `args`, wiring up the protocol pipes
///
/// # Errors
///
/// Returns [`Error::Spawn`] if the program could not be launched
/// (executable missing, permission denied).
pub fn spawn_worker(program: &Path, args: &[OsString]) -> Result<WorkerHandle> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Spawn {
            program: program.to_path_buf(),
            source: e,
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    tracing::debug!(
        program = %program.display(),
        pid = child.id(),
        "Spawned worker process"
    );

    Ok(WorkerHandle {
        child,
        stdout,
        stderr,
    })
}

/// Launches worker processes for the orchestrator
///
/// The seam that lets tests substitute scripted workers for the real
/// conversion binary.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Launch a worker performing `op`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] when the process could not be started. The
    /// caller guarantees no partial job remains registered in that case.
    async fn launch(&self, op: &WorkerOp) -> Result<WorkerHandle>;

    /// Short name of this launcher, for diagnostics
    fn name(&self) -> &'static str;
}

/// CLI-based launcher invoking the external conversion binary
///
/// # Examples
///
/// ```no_run
/// use debforge::worker::CliWorkerLauncher;
/// use std::path::PathBuf;
///
/// // Create with explicit path
/// let launcher = CliWorkerLauncher::new(PathBuf::from("/usr/local/bin/debmaster"));
///
/// // Or auto-discover from PATH
/// let launcher = CliWorkerLauncher::from_path()
///     .expect("worker binary not found in PATH");
/// ```
pub struct CliWorkerLauncher {
    binary_path: PathBuf,
    verbose: bool,
    extra_args: Vec<String>,
}

impl CliWorkerLauncher {
    /// Create a launcher with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            verbose: true,
            extra_args: Vec::new(),
        }
    }

    /// Attempt to find the worker binary in PATH
    ///
    /// Returns `None` if [`DEFAULT_WORKER_BINARY`] is not found.
    pub fn from_path() -> Option<Self> {
        which::which(DEFAULT_WORKER_BINARY).ok().map(Self::new)
    }

    /// Whether `--verbose` is appended to every invocation (default: true)
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Extra arguments appended to every invocation
    pub fn extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// The binary this launcher invokes
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    fn build_args(&self, op: &WorkerOp) -> Vec<OsString> {
        let mut args = op.to_args();
        if self.verbose {
            args.push(OsString::from("--verbose"));
        }
        args.extend(self.extra_args.iter().map(OsString::from));
        args
    }
}

#[async_trait]
impl WorkerLauncher for CliWorkerLauncher {
    async fn launch(&self, op: &WorkerOp) -> Result<WorkerHandle> {
        spawn_worker(&self.binary_path, &self.build_args(op))
    }

    fn name(&self) -> &'static str {
        "cli"
    }
}
