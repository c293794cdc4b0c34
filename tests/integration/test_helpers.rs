//! Shared helpers for pipe-level integration tests.
//!
//! [`Harness`] wires a real [`PipeOrchestrator`], writer task, and reader
//! task to an in-memory worker built from `tokio::io::duplex` pairs. Tests
//! play the worker by reading request lines from [`Harness::next_request`]
//! and writing raw response bytes with [`Harness::worker_write`].

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use watershed_relay::delivery::{ChatDelivery, DeliveryFuture};
use watershed_relay::models::{GeoUriDecoder, RequesterId};
use watershed_relay::pipe::correlation::{CorrelationLimits, CorrelationStore};
use watershed_relay::pipe::protocol::ProtocolVersion;
use watershed_relay::pipe::PipeOrchestrator;
use watershed_relay::worker::{reader, writer, WorkerEvent};
use watershed_relay::Result;

/// How long a test waits for an expected message before failing.
pub const WAIT: Duration = Duration::from_secs(5);

/// Post-exit drain bound used by [`Harness`], well under [`WAIT`].
pub const EXIT_DRAIN: Duration = Duration::from_millis(200);

/// A message captured by [`RecordingDelivery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    /// Reply addressed to a requester.
    Direct {
        /// Recipient.
        to: RequesterId,
        /// Body.
        text: String,
    },
    /// Operator-channel notice.
    Operator(String),
}

/// Chat delivery fake that records every message in delivery order.
pub struct RecordingDelivery {
    tx: mpsc::UnboundedSender<Sent>,
    delay: Duration,
    operator_notices: AtomicUsize,
}

impl RecordingDelivery {
    /// Build a recorder; every delivery resolves only after `delay`.
    pub fn new(delay: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<Sent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let delivery = Arc::new(Self {
            tx,
            delay,
            operator_notices: AtomicUsize::new(0),
        });
        (delivery, rx)
    }

    /// Number of operator notices delivered so far.
    pub fn operator_notices(&self) -> usize {
        self.operator_notices.load(Ordering::SeqCst)
    }
}

impl ChatDelivery for RecordingDelivery {
    fn deliver<'a>(&'a self, to: &'a RequesterId, text: String) -> DeliveryFuture<'a> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            let _ = self.tx.send(Sent::Direct {
                to: to.clone(),
                text,
            });
            Ok(())
        })
    }

    fn notify_operator(&self, text: String) -> DeliveryFuture<'_> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.operator_notices.fetch_add(1, Ordering::SeqCst);
            let _ = self.tx.send(Sent::Operator(text));
            Ok(())
        })
    }
}

/// Orchestrator connected to an in-memory worker.
pub struct Harness {
    pub orchestrator: Arc<PipeOrchestrator>,
    pub delivery: Arc<RecordingDelivery>,
    pub sent: mpsc::UnboundedReceiver<Sent>,
    pub event_tx: mpsc::Sender<WorkerEvent>,
    pub dispatch: JoinHandle<Result<()>>,
    pub cancel: CancellationToken,
    requests: mpsc::UnboundedReceiver<String>,
    worker_stdout: DuplexStream,
}

impl Harness {
    /// Echo-id protocol, single-line groups, instant delivery.
    pub fn start() -> Self {
        Self::with(ProtocolVersion::EchoId, Duration::ZERO, false)
    }

    /// Fully parameterized harness.
    pub fn with(protocol: ProtocolVersion, delivery_delay: Duration, notify_on_request: bool) -> Self {
        let cancel = CancellationToken::new();
        let (stdin_relay, stdin_worker) = tokio::io::duplex(64 * 1024);
        let (stdout_worker, stdout_relay) = tokio::io::duplex(64 * 1024);

        let (request_tx, request_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(64);

        tokio::spawn(writer::run_writer(stdin_relay, request_rx, cancel.clone()));
        tokio::spawn(reader::run_reader(
            stdout_relay,
            NonZeroUsize::MIN,
            event_tx.clone(),
            cancel.clone(),
        ));

        // The fake worker's stdin: every line the relay writes.
        let (seen_tx, requests) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdin_worker).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if seen_tx.send(line).is_err() {
                    break;
                }
            }
        });

        let store = Arc::new(CorrelationStore::new(
            protocol.correlation_strategy(),
            CorrelationLimits::default(),
        ));
        let (delivery, sent) = RecordingDelivery::new(delivery_delay);
        let orchestrator = Arc::new(
            PipeOrchestrator::new(
                protocol,
                store,
                request_tx,
                Arc::clone(&delivery) as Arc<dyn ChatDelivery>,
                Arc::new(GeoUriDecoder::new().expect("pattern compiles")),
            )
            .with_request_notifications(notify_on_request)
            .with_exit_drain_timeout(EXIT_DRAIN),
        );

        let dispatcher = Arc::clone(&orchestrator);
        let dispatch = tokio::spawn(async move { dispatcher.run_dispatch(event_rx).await });

        Self {
            orchestrator,
            delivery,
            sent,
            event_tx,
            dispatch,
            cancel,
            requests,
            worker_stdout: stdout_worker,
        }
    }

    /// Next request line the worker received.
    pub async fn next_request(&mut self) -> String {
        tokio::time::timeout(WAIT, self.requests.recv())
            .await
            .expect("timed out waiting for a worker request")
            .expect("worker stdin closed")
    }

    /// Write raw bytes to the relay as worker stdout.
    pub async fn worker_write(&mut self, bytes: &[u8]) {
        self.worker_stdout.write_all(bytes).await.expect("worker write");
        self.worker_stdout.flush().await.expect("worker flush");
    }

    /// Next message the relay delivered.
    pub async fn next_sent(&mut self) -> Sent {
        tokio::time::timeout(WAIT, self.sent.recv())
            .await
            .expect("timed out waiting for a delivery")
            .expect("delivery channel closed")
    }

    /// Assert nothing is delivered within `window`.
    pub async fn assert_quiet(&mut self, window: Duration) {
        if let Ok(Some(extra)) = tokio::time::timeout(window, self.sent.recv()).await {
            panic!("unexpected delivery: {extra:?}");
        }
    }
}

/// Parse an echo-id request line into `(requestId, longitude, latitude)`.
pub fn parse_echo_request(line: &str) -> (String, f64, f64) {
    let value: serde_json::Value = serde_json::from_str(line).expect("request is JSON");
    (
        value["requestId"].as_str().expect("requestId").to_owned(),
        value["longitude"].as_f64().expect("longitude"),
        value["latitude"].as_f64().expect("latitude"),
    )
}
