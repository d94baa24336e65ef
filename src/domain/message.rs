//! Messages flowing through the orchestrator.
//!
//! Inbound deployment requests and the system notices the orchestrator
//! produces about itself travel through the same internal queue, wrapped in
//! an [`Envelope`] so the dispatcher can never confuse one for the other.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// What an inbound request asks for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    /// List applications visible to this orchestrator
    Fetch,

    /// Create (deploy) an application
    Create,

    /// Anything else; logged and dropped
    Unknown(String),
}

impl From<String> for Action {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "fetch" => Self::Fetch,
            "create" => Self::Create,
            _ => Self::Unknown(value),
        }
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        match action {
            Action::Fetch => "fetch".to_string(),
            Action::Create => "create".to_string(),
            Action::Unknown(other) => other,
        }
    }
}

impl Default for Action {
    fn default() -> Self {
        Self::Unknown(String::new())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch => f.write_str("fetch"),
            Self::Create => f.write_str("create"),
            Self::Unknown(other) => f.write_str(other),
        }
    }
}

/// A deployment request decoded from the bus.
///
/// Every field is optional on the wire; absent strings decode as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    #[serde(default)]
    pub action: Action,

    #[serde(default, deserialize_with = "null_as_default")]
    pub service: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub version: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub namespace: String,

    /// Helm parameter overrides
    #[serde(default, deserialize_with = "null_as_default")]
    pub values: BTreeMap<String, String>,
}

impl DeploymentRequest {
    pub fn fetch() -> Self {
        Self {
            action: Action::Fetch,
            ..Default::default()
        }
    }

    pub fn create(service: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            action: Action::Create,
            service: service.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Well-known categories of outbound messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKey {
    /// Snapshot of every application the registry reports
    #[serde(rename = "ArgocdApplicationList")]
    ApplicationList,

    /// Outcome or diagnostic for a single application
    #[serde(rename = "ArgocdApplicationStatus")]
    ApplicationStatus,
}

impl MessageKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApplicationList => "ArgocdApplicationList",
            Self::ApplicationStatus => "ArgocdApplicationStatus",
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notice produced by the orchestrator for observability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMessage {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub key: MessageKey,
    pub value: serde_json::Value,
}

impl SystemMessage {
    pub fn new(key: MessageKey, value: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            key,
            value,
        }
    }

    /// A status notice carrying a human-readable message
    pub fn status(service: &str, outcome: &str, message: impl Into<String>) -> Self {
        Self::new(
            MessageKey::ApplicationStatus,
            serde_json::json!({
                "service": service,
                "outcome": outcome,
                "message": message.into(),
            }),
        )
    }
}

/// Everything the dispatch loop can receive
#[derive(Debug, Clone)]
pub enum Envelope {
    /// Deployment intent decoded from the bus
    Request(DeploymentRequest),

    /// Notice produced by the orchestrator, to be published outward
    System(SystemMessage),
}

impl Envelope {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request(_) => "request",
            Self::System(_) => "system",
        }
    }
}
