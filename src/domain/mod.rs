//! Domain types for the deployment orchestrator.
//!
//! This module contains the core data structures:
//! - Catalog: Services this orchestrator knows how to deploy
//! - Application: What the GitOps controller reports as deployed
//! - Message: Inbound requests and outbound system notices

pub mod application;
pub mod catalog;
pub mod message;

// Re-export commonly used types
pub use application::{ApplicationStatus, DeployedApplication, HealthStatus, SyncStatus};
pub use catalog::{normalize, CatalogError, Dependency, ServiceCatalog, ServiceEntry};
pub use message::{Action, DeploymentRequest, Envelope, MessageKey, SystemMessage};
