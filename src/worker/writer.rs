//! Worker stdin writer task.
//!
//! The single owner of the worker's stdin. Request lines arrive through a
//! FIFO channel and are written whole, newline-terminated, and flushed one
//! at a time, so concurrent requests can never interleave partial writes.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Writer task: drain `line_rx` into `stdin`.
///
/// Exits cleanly when `cancel` fires or every sender is dropped.
///
/// # Errors
///
/// Returns `AppError::Worker("write failed: …")` if writing or flushing
/// fails, typically because the worker has exited.
pub async fn run_writer<W>(
    mut stdin: W,
    mut line_rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("worker writer: cancellation received, stopping");
                break;
            }

            line = line_rx.recv() => {
                let Some(line) = line else {
                    debug!("worker writer: request channel closed, stopping");
                    break;
                };

                let mut bytes = line.into_bytes();
                bytes.push(b'\n');

                stdin.write_all(&bytes).await.map_err(|err| {
                    warn!(%err, "worker writer: write to stdin failed");
                    AppError::Worker(format!("write failed: {err}"))
                })?;
                stdin.flush().await.map_err(|err| {
                    warn!(%err, "worker writer: flush failed");
                    AppError::Worker(format!("write failed: {err}"))
                })?;
            }
        }
    }

    Ok(())
}
