//! Event processor: the message-dispatch loop.
//!
//! Two tasks cooperate through two channels:
//!
//! ```text
//! EventSource ──poll──► ingest task ──Envelope::Request──► request queue (bounded) ──┐
//!                                                                                   ▼
//!                              notice channel ──Envelope::System──────────► dispatch task
//!                                    ▲                                             │
//!                                    └──────── notices ◄── DeploymentManager ◄─────┤
//!                                                                                  ▼
//!                                                                             EventSink
//! ```
//!
//! The dispatch task handles one envelope at a time. Pending notices are
//! always published before the next request is taken.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::manager::{DeploymentError, DeploymentManager};
use super::notifier::Notifier;
use super::retry::RetryPolicy;
use crate::adapters::{ApplicationRegistry, BusError, EventSink, EventSource, InboundMessage};
use crate::domain::{
    Action, DeployedApplication, DeploymentRequest, Envelope, ServiceCatalog, SystemMessage,
};

/// An inbound payload that could not be turned into a request
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    #[error("invalid request payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode a request body
pub fn decode_request(payload: &[u8]) -> Result<DeploymentRequest, DecodeError> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::Empty);
    }
    Ok(serde_json::from_slice(payload)?)
}

/// Tuning for the processor loops
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    /// Capacity of the request queue
    pub queue_capacity: usize,

    /// How long a single source poll may block
    pub poll_timeout: Duration,

    /// Id stamped on our own messages; inbound messages carrying it are skipped
    pub producer_id: String,

    /// Retry policy for the event sink
    pub publish_retry: RetryPolicy,

    /// Upper bound on shutdown
    pub shutdown_grace: Duration,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            poll_timeout: Duration::from_millis(100),
            producer_id: "deployd".to_string(),
            publish_retry: RetryPolicy::default(),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Turns inbound events into deployment commands and publishes outcomes
pub struct EventProcessor {
    manager: Arc<DeploymentManager>,
    source: Arc<dyn EventSource>,
    sink: Arc<dyn EventSink>,
    notifier: Notifier,
    queue_tx: mpsc::Sender<Envelope>,
    queue_rx: mpsc::Receiver<Envelope>,
    notice_rx: mpsc::UnboundedReceiver<Envelope>,
    settings: ProcessorSettings,
}

impl EventProcessor {
    pub fn new(
        catalog: Arc<ServiceCatalog>,
        registry: Arc<dyn ApplicationRegistry>,
        source: Arc<dyn EventSource>,
        sink: Arc<dyn EventSink>,
        settings: ProcessorSettings,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(settings.queue_capacity.max(1));
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let notifier = Notifier::new(notice_tx);
        let manager =
            Arc::new(DeploymentManager::new(catalog, registry).with_notifier(notifier.clone()));

        Self {
            manager,
            source,
            sink,
            notifier,
            queue_tx,
            queue_rx,
            notice_rx,
            settings,
        }
    }

    /// Subscribe to the source and spawn the ingest and dispatch tasks.
    ///
    /// Fails only if the subscription cannot be registered.
    pub async fn start(self, shutdown: CancellationToken) -> Result<ProcessorHandle, BusError> {
        self.source.subscribe().await?;
        info!(source = self.source.name(), "Event processor started");

        let ingest = Ingest {
            source: self.source,
            queue: self.queue_tx,
            poll_timeout: self.settings.poll_timeout,
            producer_id: self.settings.producer_id.clone(),
        };
        let dispatch = Dispatch {
            manager: self.manager,
            sink: self.sink,
            notifier: self.notifier,
            publish_retry: self.settings.publish_retry.clone(),
        };

        let ingest_task = tokio::spawn(ingest.run(shutdown.clone()));
        let dispatch_task = tokio::spawn(dispatch.run(self.queue_rx, self.notice_rx, shutdown.clone()));

        Ok(ProcessorHandle {
            shutdown,
            ingest: ingest_task,
            dispatch: dispatch_task,
            grace: self.settings.shutdown_grace,
        })
    }
}

/// Running processor
pub struct ProcessorHandle {
    shutdown: CancellationToken,
    ingest: JoinHandle<()>,
    dispatch: JoinHandle<()>,
    grace: Duration,
}

impl ProcessorHandle {
    /// Stop accepting events, let the in-flight message finish, release the
    /// subscription. Tasks still running after the grace period are aborted.
    pub async fn shutdown(self) {
        let Self {
            shutdown,
            ingest,
            dispatch,
            grace,
        } = self;

        info!(?grace, "Shutting down event processor");
        shutdown.cancel();

        let ingest_abort = ingest.abort_handle();
        let dispatch_abort = dispatch.abort_handle();

        let joined = tokio::time::timeout(grace, async move {
            let (ingest, dispatch) = tokio::join!(ingest, dispatch);
            for (task, result) in [("ingest", ingest), ("dispatch", dispatch)] {
                if let Err(e) = result {
                    error!(task, error = %e, "Processor task failed");
                }
            }
        })
        .await;

        if joined.is_err() {
            warn!(?grace, "Shutdown grace period elapsed, aborting tasks");
            ingest_abort.abort();
            dispatch_abort.abort();
        } else {
            info!("Event processor stopped");
        }
    }

    /// Whether both tasks have exited
    pub fn is_finished(&self) -> bool {
        self.ingest.is_finished() && self.dispatch.is_finished()
    }
}

/// Pulls from the event source and feeds the queue
struct Ingest {
    source: Arc<dyn EventSource>,
    queue: mpsc::Sender<Envelope>,
    poll_timeout: Duration,
    producer_id: String,
}

impl Ingest {
    async fn run(self, shutdown: CancellationToken) {
        loop {
            let polled = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                polled = self.source.poll(self.poll_timeout) => polled,
            };

            match polled {
                Ok(None) => continue,
                Ok(Some(message)) => {
                    let Some(envelope) = self.decode(message) else {
                        continue;
                    };
                    let sent = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        sent = self.queue.send(envelope) => sent,
                    };
                    if sent.is_err() {
                        warn!("Dispatch queue closed, stopping ingestion");
                        break;
                    }
                }
                Err(BusError::Closed) => {
                    warn!("Event source closed, stopping ingestion");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Event source error");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_timeout) => {}
                    }
                }
            }
        }

        if let Err(e) = self.source.close().await {
            error!(error = %e, "Failed to close event source");
        }
        info!("Ingestion stopped");
    }

    fn decode(&self, message: InboundMessage) -> Option<Envelope> {
        if message.source.as_deref() == Some(self.producer_id.as_str()) {
            debug!(key = ?message.key, "Skipping self-produced message");
            return None;
        }

        match decode_request(&message.payload) {
            Ok(request) => Some(Envelope::Request(request)),
            Err(e) => {
                warn!(error = %e, key = ?message.key, "Dropping undecodable event");
                None
            }
        }
    }
}

/// Drains the queue and dispatches each envelope in order
struct Dispatch {
    manager: Arc<DeploymentManager>,
    sink: Arc<dyn EventSink>,
    notifier: Notifier,
    publish_retry: RetryPolicy,
}

impl Dispatch {
    async fn run(
        self,
        mut requests: mpsc::Receiver<Envelope>,
        mut notices: mpsc::UnboundedReceiver<Envelope>,
        shutdown: CancellationToken,
    ) {
        loop {
            let envelope = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(notice) = notices.recv() => notice,
                request = requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };
            self.dispatch(envelope).await;
        }

        // Pending notices still go out; pending requests are dropped
        requests.close();
        let mut dropped = 0usize;
        while requests.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!(dropped, "Dropped queued requests on shutdown");
        }
        while let Ok(envelope) = notices.try_recv() {
            if let Envelope::System(message) = envelope {
                self.publish(message).await;
            }
        }
        info!("Dispatch stopped");
    }

    async fn dispatch(&self, envelope: Envelope) {
        debug!(kind = envelope.kind(), "Dispatching envelope");
        match envelope {
            Envelope::Request(request) => self.handle_request(request).await,
            Envelope::System(message) => self.publish(message).await,
        }
    }

    #[instrument(skip(self, request), fields(action = %request.action, service = %request.service))]
    async fn handle_request(&self, request: DeploymentRequest) {
        info!("Request received");

        match request.action {
            Action::Fetch => match self.manager.list_visible_applications().await {
                Ok(applications) => {
                    info!(count = applications.len(), "Applications fetched");
                }
                Err(e) => error!(error = %e, "Failed to fetch application list"),
            },
            Action::Create => {
                let result = self
                    .manager
                    .create_application(
                        &request.service,
                        &request.version,
                        &request.namespace,
                        &request.values,
                    )
                    .await;
                self.report_create(&request, result);
            }
            Action::Unknown(action) => {
                warn!(%action, "Unknown action, dropping request");
            }
        }
    }

    /// Publish the outcome of a create as a status notice
    fn report_create(
        &self,
        request: &DeploymentRequest,
        result: Result<DeployedApplication, DeploymentError>,
    ) {
        let notice = match result {
            Ok(application) => SystemMessage::status(
                &application.name,
                "created",
                format!(
                    "application '{}' created at revision {}",
                    application.name, application.version
                ),
            ),
            // Already announced by the manager
            Err(DeploymentError::UnmetDependencies { .. }) => return,
            Err(e @ DeploymentError::UnknownService(_)) => {
                SystemMessage::status(&request.service, e.outcome(), e.to_string())
            }
            Err(e) => {
                error!(error = %e, "Failed to create application");
                SystemMessage::status(&request.service, e.outcome(), e.to_string())
            }
        };
        self.notifier.notify(notice);
    }

    /// Produce a notice, retrying per the publish policy
    async fn publish(&self, message: SystemMessage) {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.sink.produce(message.key, &message.value).await {
                Ok(()) => {
                    debug!(key = %message.key, id = %message.id, attempt, "Notice published");
                    return;
                }
                Err(e) if self.publish_retry.should_retry(attempt) => {
                    let delay = self.publish_retry.delay_for_attempt(attempt);
                    warn!(
                        key = %message.key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Failed to produce message, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        key = %message.key,
                        id = %message.id,
                        attempt,
                        error = %e,
                        "Failed to produce message, dropping"
                    );
                    return;
                }
            }
        }
    }
}
