//! Worker subprocess plumbing.
//!
//! The worker is launched once and talks over its stdio for the lifetime of
//! the relay. Four tasks surround it:
//!
//! - `writer`: the only task that writes stdin; one request line at a time.
//! - `reader`: the only consumer of stdout; drives the line-group codec and
//!   parses every group into a [`WorkerEvent::Response`].
//! - `monitor`: awaits process exit and emits [`WorkerEvent::Exited`].
//! - stderr drain: forwards diagnostic lines to `tracing`.

pub mod monitor;
pub mod reader;
pub mod spawner;
pub mod writer;

use std::fmt::{Display, Formatter};
use std::num::NonZeroUsize;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::pipe::protocol::WorkerResponse;
use spawner::WorkerConnection;

/// Events produced by the worker-side tasks, consumed by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// A decoded response line group.
    Response(WorkerResponse),
    /// Worker stdout reached EOF or failed.
    StreamClosed {
        /// Human-readable cause.
        reason: String,
    },
    /// The worker process exited.
    Exited(WorkerExit),
}

/// How the worker process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
    /// Exit code, when the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal number (unix only).
    pub signal: Option<i32>,
    /// Human-readable summary.
    pub reason: String,
}

impl Display for WorkerExit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Channel ends connecting the orchestrator to a running worker.
#[derive(Debug)]
pub struct WorkerChannels {
    /// Encoded request lines, in acceptance order.
    pub request_tx: mpsc::Sender<String>,
    /// Responses and lifecycle events.
    pub event_rx: mpsc::Receiver<WorkerEvent>,
}

/// Join handles for the worker background tasks.
#[derive(Debug)]
pub struct WorkerTasks {
    /// Stdin writer.
    pub writer: JoinHandle<()>,
    /// Stdout reader.
    pub reader: JoinHandle<()>,
    /// Exit monitor.
    pub monitor: JoinHandle<()>,
    /// Stderr drain, when stderr was captured.
    pub stderr: Option<JoinHandle<()>>,
}

const EVENT_QUEUE_CAPACITY: usize = 256;

/// Start the writer, reader, monitor, and stderr tasks for `connection`.
#[must_use]
pub fn start(
    connection: WorkerConnection,
    group_size: NonZeroUsize,
    request_queue: usize,
    cancel: &CancellationToken,
) -> (WorkerChannels, WorkerTasks) {
    let (request_tx, request_rx) = mpsc::channel(request_queue.max(1));
    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

    let WorkerConnection {
        child,
        stdin,
        stdout,
        stderr,
    } = connection;

    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        if let Err(err) = writer::run_writer(stdin, request_rx, writer_cancel).await {
            error!(%err, "worker writer failed");
        }
    });

    let reader_cancel = cancel.clone();
    let reader_tx = event_tx.clone();
    let reader = tokio::spawn(async move {
        if let Err(err) = reader::run_reader(stdout, group_size, reader_tx, reader_cancel).await {
            error!(%err, "worker reader failed");
        }
    });

    let monitor = monitor::monitor_exit(child, event_tx, cancel.clone());
    let stderr = stderr.map(|stderr| spawner::spawn_stderr_drain(stderr, cancel.clone()));

    (
        WorkerChannels {
            request_tx,
            event_rx,
        },
        WorkerTasks {
            writer,
            reader,
            monitor,
            stderr,
        },
    )
}
