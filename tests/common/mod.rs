//! In-memory doubles for the bus and the application registry.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use deployd::adapters::{
    ApplicationRegistry, BusError, ConvergenceWait, EventSink, EventSource, InboundMessage,
    NewApplication, RegistryError, StatusProbe,
};
use deployd::domain::{
    ApplicationStatus, DeployedApplication, DeploymentRequest, HealthStatus, MessageKey,
    ServiceCatalog, ServiceEntry, SyncStatus,
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Catalog used across the scenarios: web needs db, db stands alone
pub fn catalog() -> Arc<ServiceCatalog> {
    Arc::new(
        ServiceCatalog::new(vec![
            ServiceEntry::new("web", "1.2.0").depends_on("db", "14"),
            ServiceEntry::new("db", "14"),
            ServiceEntry::new("cache", "7").depends_on("db", "14"),
        ])
        .unwrap(),
    )
}

/// Event source fed from a queue of messages
#[derive(Default)]
pub struct MemorySource {
    messages: Mutex<VecDeque<InboundMessage>>,
    subscribed: AtomicBool,
    closed: AtomicBool,
}

impl MemorySource {
    pub fn new(messages: impl IntoIterator<Item = InboundMessage>) -> Arc<Self> {
        Arc::new(Self {
            messages: Mutex::new(messages.into_iter().collect()),
            ..Default::default()
        })
    }

    pub fn push(&self, message: InboundMessage) {
        self.messages.lock().unwrap().push_back(message);
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn subscribe(&self) -> Result<(), BusError> {
        self.subscribed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn poll(&self, timeout: Duration) -> Result<Option<InboundMessage>, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        let next = self.messages.lock().unwrap().pop_front();
        if next.is_none() {
            tokio::time::sleep(timeout).await;
        }
        Ok(next)
    }

    async fn close(&self) -> Result<(), BusError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Sink that records every produced message; can fail the first N attempts
#[derive(Default)]
pub struct RecordingSink {
    produced: Mutex<Vec<(MessageKey, serde_json::Value)>>,
    failures_left: AtomicU32,
    attempts: AtomicU32,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(failures: u32) -> Arc<Self> {
        let sink = Self::default();
        sink.failures_left.store(failures, Ordering::SeqCst);
        Arc::new(sink)
    }

    pub fn produced(&self) -> Vec<(MessageKey, serde_json::Value)> {
        self.produced.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` messages were produced
    pub async fn wait_for(&self, count: usize) -> Vec<(MessageKey, serde_json::Value)> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if self.produced.lock().unwrap().len() >= count {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("expected {count} messages, got {:?}", self.produced()));
        self.produced()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn produce(&self, key: MessageKey, value: &serde_json::Value) -> Result<(), BusError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(BusError::Transport("broker unavailable".to_string()));
        }
        self.produced.lock().unwrap().push((key, value.clone()));
        Ok(())
    }
}

/// Registry whose created applications become visible to later lists.
///
/// With a convergence wait configured, `create` polls its own status, which
/// reports converged after `converge_after` polls.
pub struct MemoryRegistry {
    deployed: Mutex<Vec<DeployedApplication>>,
    created: Mutex<Vec<NewApplication>>,
    fail_list: AtomicBool,
    convergence: Option<(ConvergenceWait, CancellationToken)>,
    converge_after: u32,
    polls: AtomicU32,
    list_calls: AtomicU32,
    create_delay: Duration,
    create_started: Notify,
}

impl MemoryRegistry {
    pub fn new(deployed: &[(&str, &str)]) -> Self {
        Self {
            deployed: Mutex::new(
                deployed
                    .iter()
                    .map(|(name, version)| DeployedApplication::new(name, *version))
                    .collect(),
            ),
            created: Mutex::new(Vec::new()),
            fail_list: AtomicBool::new(false),
            convergence: None,
            converge_after: 1,
            polls: AtomicU32::new(0),
            list_calls: AtomicU32::new(0),
            create_delay: Duration::ZERO,
            create_started: Notify::new(),
        }
    }

    pub fn with_convergence(
        mut self,
        wait: ConvergenceWait,
        shutdown: CancellationToken,
        converge_after: u32,
    ) -> Self {
        self.convergence = Some((wait, shutdown));
        self.converge_after = converge_after;
        self
    }

    /// Make every create take `delay`
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    pub fn fail_list(&self) {
        self.fail_list.store(true, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<NewApplication> {
        self.created.lock().unwrap().clone()
    }

    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Resolves once a create call has been entered
    pub async fn create_started(&self) {
        self.create_started.notified().await;
    }
}

#[async_trait]
impl ApplicationRegistry for MemoryRegistry {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list(&self) -> Result<Vec<DeployedApplication>, RegistryError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(RegistryError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(self.deployed.lock().unwrap().clone())
    }

    async fn create(&self, app: &NewApplication) -> Result<DeployedApplication, RegistryError> {
        self.created.lock().unwrap().push(app.clone());
        self.create_started.notify_one();
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }

        if let Some((wait, shutdown)) = &self.convergence {
            wait.wait(self, &app.service, shutdown).await?;
        }

        let application = DeployedApplication::new(&app.service, app.version.clone());
        self.deployed.lock().unwrap().push(application.clone());
        Ok(application)
    }
}

#[async_trait]
impl StatusProbe for MemoryRegistry {
    async fn status(&self, _name: &str) -> Result<ApplicationStatus, RegistryError> {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        if polls >= self.converge_after {
            Ok(ApplicationStatus::new(SyncStatus::Synced, HealthStatus::Healthy))
        } else {
            Ok(ApplicationStatus::new(
                SyncStatus::OutOfSync,
                HealthStatus::Progressing,
            ))
        }
    }
}

/// Inbound message carrying a raw request body
pub fn request(json: &str) -> InboundMessage {
    InboundMessage::new(json.as_bytes().to_vec())
}

/// Inbound message carrying an encoded request
pub fn encoded(request: &DeploymentRequest) -> InboundMessage {
    InboundMessage::new(serde_json::to_vec(request).unwrap())
}
