//! Applications as reported by the GitOps controller.

use serde::{Deserialize, Serialize};

use super::catalog::normalize;

/// A deployed application, as last seen in the registry.
///
/// Never persisted locally; re-fetched whenever a decision depends on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedApplication {
    /// Application name (lower-cased)
    pub name: String,

    /// Target revision reported by the registry
    pub version: String,
}

impl DeployedApplication {
    pub fn new(name: impl AsRef<str>, version: impl Into<String>) -> Self {
        Self {
            name: normalize(name.as_ref()),
            version: version.into(),
        }
    }
}

/// Sync state of an application in the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Synced,
    OutOfSync,
    Unknown(String),
}

impl From<&str> for SyncStatus {
    fn from(value: &str) -> Self {
        match value {
            "Synced" => Self::Synced,
            "OutOfSync" => Self::OutOfSync,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Health state of an application in the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Progressing,
    Degraded,
    Suspended,
    Missing,
    Unknown(String),
}

impl From<&str> for HealthStatus {
    fn from(value: &str) -> Self {
        match value {
            "Healthy" => Self::Healthy,
            "Progressing" => Self::Progressing,
            "Degraded" => Self::Degraded,
            "Suspended" => Self::Suspended,
            "Missing" => Self::Missing,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// One observation of an application's status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationStatus {
    pub sync: SyncStatus,
    pub health: HealthStatus,
}

impl ApplicationStatus {
    pub fn new(sync: SyncStatus, health: HealthStatus) -> Self {
        Self { sync, health }
    }

    /// Synced and healthy in the same observation
    pub fn is_converged(&self) -> bool {
        self.sync == SyncStatus::Synced && self.health == HealthStatus::Healthy
    }
}
