//! Worker stdout reader task.
//!
//! The sole consumer of the worker's stdout. Bytes are grouped by
//! [`LineGroupCodec`](crate::pipe::aggregator::LineGroupCodec), each group is
//! parsed with [`parse_response`], and the result is forwarded as a
//! [`WorkerEvent::Response`].
//!
//! Groups that are not valid responses are logged with their raw text and
//! skipped; they never stop the loop.

use std::num::NonZeroUsize;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::pipe::aggregator::line_groups;
use crate::pipe::protocol::parse_response;
use crate::worker::WorkerEvent;
use crate::Result;

/// Reader task: turn `stdout` into [`WorkerEvent`]s on `event_tx`.
///
/// On EOF or an I/O error, sends [`WorkerEvent::StreamClosed`] and returns.
/// Cancellation exits without an event.
///
/// # Errors
///
/// Currently always returns `Ok(())`; stream failures are reported as events.
pub async fn run_reader<R>(
    stdout: R,
    group_size: NonZeroUsize,
    event_tx: mpsc::Sender<WorkerEvent>,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
{
    let mut groups = line_groups(stdout, group_size);

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("worker reader: cancellation received, stopping");
                break;
            }

            item = groups.next() => {
                match item {
                    None => {
                        debug!("worker reader: EOF detected");
                        send_closed(&event_tx, "stream closed").await;
                        break;
                    }

                    Some(Err(err)) => {
                        warn!(%err, "worker reader: IO error, stopping");
                        send_closed(&event_tx, &format!("stream error: {err}")).await;
                        break;
                    }

                    Some(Ok(group)) => match parse_response(&group) {
                        Ok(Some(response)) => {
                            if event_tx.send(WorkerEvent::Response(response)).await.is_err() {
                                debug!("worker reader: event_tx closed, stopping");
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(err) => {
                            warn!(
                                error = %err,
                                raw_group = %group,
                                "worker reader: unparseable response, skipping"
                            );
                        }
                    },
                }
            }
        }
    }

    Ok(())
}

async fn send_closed(event_tx: &mpsc::Sender<WorkerEvent>, reason: &str) {
    let event = WorkerEvent::StreamClosed {
        reason: reason.to_owned(),
    };
    if event_tx.send(event).await.is_err() {
        debug!("worker reader: event_tx closed before StreamClosed could be delivered");
    }
}
