//! Adapter interfaces for external systems.
//!
//! The orchestrator talks to two outside worlds:
//! - an application registry (the GitOps controller, Argo CD)
//! - a message bus, split into an event source and an event sink
//!
//! Both are consumed through the traits below so the core can be driven by
//! any implementation, including test doubles.

pub mod argocd;
pub mod convergence;
pub mod stdio;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{DeployedApplication, MessageKey};

// Re-export concrete adapters
pub use argocd::ArgoCdClient;
pub use convergence::{ConvergenceWait, StatusProbe};
pub use stdio::{LineSink, LineSource};

/// Errors from the application registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Registry returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid registry response: {0}")]
    InvalidResponse(String),

    #[error("Application '{name}' did not converge within {timeout:?}")]
    ConvergenceTimeout { name: String, timeout: Duration },

    #[error("Convergence wait for '{0}' cancelled by shutdown")]
    Cancelled(String),

    #[error("Registry error: {0}")]
    Other(String),
}

/// Errors from the message bus
#[derive(Debug, Error)]
pub enum BusError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Event source is closed")]
    Closed,

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Parameters of a create call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewApplication {
    pub service: String,
    pub version: String,
    pub namespace: String,
    pub values: BTreeMap<String, String>,
}

/// The GitOps controller's view of deployed applications
#[async_trait]
pub trait ApplicationRegistry: Send + Sync {
    /// Human-readable registry name
    fn name(&self) -> &str;

    /// List every application the registry knows about
    async fn list(&self) -> Result<Vec<DeployedApplication>, RegistryError>;

    /// Create an application; returns once the registry considers it done
    async fn create(&self, app: &NewApplication) -> Result<DeployedApplication, RegistryError>;
}

/// A raw message pulled from the bus
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    /// Message key, if the transport carries one
    pub key: Option<String>,

    /// Producer id stamped by the sender
    pub source: Option<String>,

    /// Encoded request body
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            ..Default::default()
        }
    }

    pub fn from_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Where inbound events come from
#[async_trait]
pub trait EventSource: Send + Sync {
    fn name(&self) -> &str;

    /// Register the subscription; must be called before polling
    async fn subscribe(&self) -> Result<(), BusError>;

    /// Wait up to `timeout` for the next message
    async fn poll(&self, timeout: Duration) -> Result<Option<InboundMessage>, BusError>;

    /// Release the subscription (idempotent)
    async fn close(&self) -> Result<(), BusError>;
}

/// Where outbound events go
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn produce(&self, key: MessageKey, value: &serde_json::Value) -> Result<(), BusError>;
}
