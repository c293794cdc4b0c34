//! Worker exit observer.

use std::process::ExitStatus;

use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::worker::{WorkerEvent, WorkerExit};

/// Spawn a task that awaits worker exit and emits [`WorkerEvent::Exited`].
///
/// When `cancel` fires first the task exits silently and the child is
/// dropped, which kills it.
#[must_use]
pub fn monitor_exit(
    mut child: Child,
    event_tx: mpsc::Sender<WorkerEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = child.wait() => {
                let exit = match result {
                    Ok(status) => describe_exit(status),
                    Err(err) => {
                        warn!(%err, "error waiting for worker process");
                        WorkerExit {
                            code: None,
                            signal: None,
                            reason: format!("wait error: {err}"),
                        }
                    }
                };

                warn!(code = ?exit.code, signal = ?exit.signal, reason = %exit.reason, "worker process exited");
                if event_tx.send(WorkerEvent::Exited(exit)).await.is_err() {
                    warn!("event_tx closed before worker exit could be delivered");
                }
            }
            () = cancel.cancelled() => {
                info!("worker monitor: cancellation received, exiting");
            }
        }
    })
}

/// Summarize an exit status.
#[must_use]
pub fn describe_exit(status: ExitStatus) -> WorkerExit {
    let code = status.code();
    let signal = exit_signal(status);
    let reason = match (code, signal) {
        (Some(c), _) => format!("worker exited with code {c}"),
        (None, Some(s)) => format!("worker terminated by signal {s}"),
        (None, None) => "worker terminated".to_owned(),
    };
    WorkerExit {
        code,
        signal,
        reason,
    }
}

#[cfg(unix)]
fn exit_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: ExitStatus) -> Option<i32> {
    None
}
