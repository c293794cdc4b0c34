//! Worker process spawner.
//!
//! Launches the lookup worker with:
//! - `kill_on_drop(true)` so the worker never outlives the relay.
//! - `env_clear()` + a safe variable allowlist so Slack tokens and other
//!   secrets are not visible to the worker.
//! - All three stdio streams piped.

use std::path::PathBuf;
use std::process::Stdio;

use futures_util::StreamExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::{AppError, Result};

/// Environment variables inherited by the worker process.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "LANG",
    "TZ",
    "RUST_LOG",
    // Windows-specific variables.
    "SystemRoot",
    "TEMP",
    "TMP",
];

/// Longest stderr line forwarded to the log.
const MAX_STDERR_LINE: usize = 64 * 1024;

/// Command line for the worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnConfig {
    /// Worker executable.
    pub program: PathBuf,
    /// Arguments, in order.
    pub args: Vec<String>,
}

impl From<&WorkerConfig> for SpawnConfig {
    /// `<program> --database=<path> --<output_format> [extra_args…]`.
    fn from(config: &WorkerConfig) -> Self {
        let mut args = vec![format!("--database={}", config.database_path.display())];
        if !config.output_format.is_empty() {
            args.push(format!("--{}", config.output_format));
        }
        args.extend(config.extra_args.iter().cloned());

        Self {
            program: config.program.clone(),
            args,
        }
    }
}

/// Live stdio handles of a spawned worker.
#[derive(Debug)]
pub struct WorkerConnection {
    /// Process handle; dropping it kills the worker.
    pub child: Child,
    /// Request sink.
    pub stdin: ChildStdin,
    /// Response source.
    pub stdout: ChildStdout,
    /// Diagnostic output.
    pub stderr: Option<ChildStderr>,
}

/// Spawn the worker process.
///
/// # Errors
///
/// - `AppError::Worker("failed to spawn worker: …")` on OS spawn failure.
/// - `AppError::Worker("failed to capture worker …")` if a pipe is missing.
pub fn spawn_worker(config: &SpawnConfig) -> Result<WorkerConnection> {
    let mut cmd = Command::new(&config.program);
    cmd.args(&config.args);

    cmd.env_clear();
    for &key in ALLOWED_ENV_VARS {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }

    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Worker(format!("failed to spawn worker: {err}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Worker("failed to capture worker stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Worker("failed to capture worker stdout".into()))?;
    let stderr = child.stderr.take();

    info!(
        program = %config.program.display(),
        args = ?config.args,
        pid = child.id(),
        "worker process started"
    );

    Ok(WorkerConnection {
        child,
        stdin,
        stdout,
        stderr,
    })
}

/// Forward worker stderr lines to the log until EOF or cancellation.
#[must_use]
pub fn spawn_stderr_drain(stderr: ChildStderr, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines =
            FramedRead::new(stderr, LinesCodec::new_with_max_length(MAX_STDERR_LINE));
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                item = lines.next() => match item {
                    Some(Ok(line)) => warn!(target: "worker", "{line}"),
                    Some(Err(err)) => debug!(%err, "worker stderr line skipped"),
                    None => {
                        debug!("worker stderr closed");
                        break;
                    }
                },
            }
        }
    })
}
