//! Core orchestration logic.
//!
//! This module contains:
//! - Resolver: Direct-dependency checks against the live registry
//! - Manager: Catalog and dependency rules in front of the registry
//! - Processor: Ingest and dispatch loops
//! - Notifier: Side channel for system notices
//! - Retry: Backoff policy for outbound publishing

pub mod manager;
pub mod notifier;
pub mod processor;
pub mod resolver;
pub mod retry;

// Re-export commonly used types
pub use manager::{DeploymentError, DeploymentManager};
pub use notifier::Notifier;
pub use processor::{decode_request, DecodeError, EventProcessor, ProcessorHandle, ProcessorSettings};
pub use resolver::{missing_dependencies, DependencyResolver};
pub use retry::RetryPolicy;
