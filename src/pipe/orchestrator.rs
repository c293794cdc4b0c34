//! Pipe orchestrator: request path, response dispatch, and fatal exit.
//!
//! The orchestrator owns the correlation store and the sending end of the
//! request channel. Inbound chat events become [`LocationRequest`]s, which are
//! acknowledged, registered, encoded, and queued for the single writer task.
//! Worker events come back through [`PipeOrchestrator::run_dispatch`], which
//! resolves each response to its requester and delivers the rendered report.
//!
//! A worker exit is fatal: the orchestrator stops accepting requests, keeps
//! delivering the responses the worker wrote before it died until its output
//! closes, sends exactly one operator notification, and returns an error so
//! the process can terminate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::delivery::ChatDelivery;
use crate::models::inbound::scan_locations;
use crate::models::{Coordinate, InboundEvent, LocationDecoder, LocationRequest, RequesterId};
use crate::pipe::correlation::CorrelationStore;
use crate::pipe::protocol::{ProtocolVersion, WorkerResponse};
use crate::worker::{WorkerEvent, WorkerExit};
use crate::{AppError, Result};

/// Acknowledgement sent before a location is forwarded to the worker.
pub const ACK_MESSAGE: &str = "Received your location, calculating your watershed!";

/// How long responses are still drained after the worker has exited.
pub const DEFAULT_EXIT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Coordinates requests to, and responses from, the worker.
pub struct PipeOrchestrator {
    protocol: ProtocolVersion,
    store: Arc<CorrelationStore>,
    request_tx: mpsc::Sender<String>,
    delivery: Arc<dyn ChatDelivery>,
    decoder: Arc<dyn LocationDecoder>,
    notify_on_request: bool,
    exit_drain_timeout: Duration,
    exit_notified: AtomicBool,
    shutdown: CancellationToken,
}

impl PipeOrchestrator {
    /// Create an orchestrator writing encoded requests to `request_tx`.
    #[must_use]
    pub fn new(
        protocol: ProtocolVersion,
        store: Arc<CorrelationStore>,
        request_tx: mpsc::Sender<String>,
        delivery: Arc<dyn ChatDelivery>,
        decoder: Arc<dyn LocationDecoder>,
    ) -> Self {
        Self {
            protocol,
            store,
            request_tx,
            delivery,
            decoder,
            notify_on_request: false,
            exit_drain_timeout: DEFAULT_EXIT_DRAIN_TIMEOUT,
            exit_notified: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    /// Ping the operator channel for every accepted location.
    #[must_use]
    pub fn with_request_notifications(mut self, enabled: bool) -> Self {
        self.notify_on_request = enabled;
        self
    }

    /// Bound the wait for remaining worker output after an exit.
    #[must_use]
    pub fn with_exit_drain_timeout(mut self, timeout: Duration) -> Self {
        self.exit_drain_timeout = timeout;
        self
    }

    /// Token cancelled once the worker has exited.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Whether the orchestrator still accepts requests.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Shared correlation store.
    #[must_use]
    pub fn store(&self) -> &Arc<CorrelationStore> {
        &self.store
    }

    /// Route one inbound chat event.
    ///
    /// Text is scanned for location tokens; each one found becomes a separate
    /// request. Other events are ignored.
    pub async fn handle_inbound(&self, event: InboundEvent) {
        match event {
            InboundEvent::Text { from, text } => {
                let coordinates = scan_locations(self.decoder.as_ref(), &text);
                if coordinates.is_empty() {
                    debug!(requester = %from, "text message without a location");
                }
                for coordinate in coordinates {
                    self.log_failure(&from, self.handle_location(from.clone(), coordinate).await);
                }
            }
            InboundEvent::Location { from, coordinate } => {
                let result = self.handle_location(from.clone(), coordinate).await;
                self.log_failure(&from, result);
            }
            InboundEvent::Other => debug!("ignoring inbound event without a location"),
        }
    }

    /// Acknowledge a location to its requester, then submit it.
    ///
    /// The acknowledgement is awaited to completion first: the worker can
    /// answer faster than the chat platform accepts a message, and the
    /// result must not overtake the acknowledgement. A failed
    /// acknowledgement is logged and the request still goes out.
    ///
    /// # Errors
    ///
    /// Propagates [`PipeOrchestrator::submit`] failures.
    pub async fn handle_location(&self, from: RequesterId, coordinate: Coordinate) -> Result<()> {
        if !self.is_accepting() {
            return Err(AppError::Worker("worker has exited".into()));
        }

        info!(requester = %from, %coordinate, "location request received");
        if self.notify_on_request {
            let note = format!("location request received from {from}");
            if let Err(err) = self.delivery.notify_operator(note).await {
                warn!(%err, "failed to notify operator of request");
            }
        }

        if let Err(err) = self.delivery.deliver(&from, ACK_MESSAGE.to_owned()).await {
            warn!(requester = %from, %err, "failed to deliver acknowledgement");
        }

        self.submit(LocationRequest::new(from, coordinate)).await
    }

    /// Register `request` and queue its line for the worker.
    ///
    /// # Errors
    ///
    /// - `AppError::Worker("worker has exited")` after a fatal exit.
    /// - `AppError::Protocol` if the request cannot be encoded.
    /// - `AppError::Worker("request channel closed")` if the writer is gone.
    pub async fn submit(&self, request: LocationRequest) -> Result<()> {
        if !self.is_accepting() {
            return Err(AppError::Worker("worker has exited".into()));
        }

        let line = self.protocol.encode_request(&request)?;
        // Register before queueing so the response can never outrun its entry.
        let key = self.store.register(&request).await;
        debug!(?key, line, "queueing worker request");

        self.request_tx
            .send(line)
            .await
            .map_err(|_| AppError::Worker("request channel closed".into()))
    }

    /// Consume worker events until the worker exits or every producer is gone.
    ///
    /// On exit, requests are refused at once, but responses keep being
    /// delivered until the reader reports the stream closed or the drain
    /// timeout elapses. Only then is the operator notified.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Worker` describing the exit once the worker has
    /// terminated and the operator has been notified.
    pub async fn run_dispatch(&self, mut events: mpsc::Receiver<WorkerEvent>) -> Result<()> {
        let mut stream_closed = false;

        while let Some(event) = events.recv().await {
            match event {
                WorkerEvent::Response(response) => self.dispatch_response(response).await,
                WorkerEvent::StreamClosed { reason } => {
                    stream_closed = true;
                    warn!(reason, "worker output closed");
                }
                WorkerEvent::Exited(exit) => {
                    self.shutdown.cancel();
                    if !stream_closed {
                        self.drain_after_exit(&mut events).await;
                    }
                    return Err(self.escalate_exit(&exit).await);
                }
            }
        }

        info!("worker event channel closed, dispatch stopping");
        Ok(())
    }

    /// Resolve `response` to its requester and deliver the report.
    ///
    /// Responses without a usable key, or whose key matches nothing, are
    /// logged and dropped.
    pub async fn dispatch_response(&self, response: WorkerResponse) {
        let key = match response.correlation_key() {
            Ok(key) => key,
            Err(err) => {
                warn!(%err, "dropping uncorrelatable worker response");
                return;
            }
        };

        let Some(requester) = self.store.resolve(&key).await else {
            warn!(?key, "no pending request for worker response, dropping");
            return;
        };

        let report = response.stack.render_report();
        if let Err(err) = self.delivery.deliver(&requester, report).await {
            warn!(%requester, %err, "failed to deliver watershed report");
        }
    }

    /// Deliver responses still in flight until the reader reports EOF.
    async fn drain_after_exit(&self, events: &mut mpsc::Receiver<WorkerEvent>) {
        let deadline = tokio::time::sleep(self.exit_drain_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                () = &mut deadline => {
                    warn!("worker output still open after exit, abandoning remaining responses");
                    break;
                }
                event = events.recv() => match event {
                    Some(WorkerEvent::Response(response)) => self.dispatch_response(response).await,
                    Some(WorkerEvent::StreamClosed { reason }) => {
                        debug!(reason, "worker output drained after exit");
                        break;
                    }
                    Some(WorkerEvent::Exited(_)) => {}
                    None => break,
                },
            }
        }
    }

    /// Notify the operator once and build the fatal error.
    async fn escalate_exit(&self, exit: &WorkerExit) -> AppError {
        self.shutdown.cancel();

        let pending = self.store.pending().await;
        warn!(%exit, pending, "worker exited, shutting down relay");

        if !self.exit_notified.swap(true, Ordering::SeqCst) {
            let text =
                format!("⚠️ Watershed worker process exited ({exit}). Relay is shutting down.");
            if let Err(err) = self.delivery.notify_operator(text).await {
                warn!(%err, "failed to notify operator of worker exit");
            }
        }

        AppError::Worker(format!("worker exited: {exit}"))
    }

    fn log_failure(&self, from: &RequesterId, result: Result<()>) {
        if let Err(err) = result {
            warn!(requester = %from, %err, accepting = self.is_accepting(), "location request not submitted");
        }
    }
}
