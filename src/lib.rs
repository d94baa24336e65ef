//! deployd - Event-driven deployment orchestrator
//!
//! Receives deployment requests from a message bus, checks them against a
//! declared service catalog, and creates Argo CD applications once every
//! direct dependency is deployed. Outcomes are reported back onto the bus.
//!
//! # Architecture
//!
//! ```text
//! EventSource → EventProcessor → DeploymentManager → DependencyResolver
//!                     │                 │
//!                     ▼                 ▼
//!                 EventSink      ApplicationRegistry (Argo CD + convergence wait)
//! ```
//!
//! # Modules
//!
//! - `adapters`: External system integrations (Argo CD, line-delimited bus)
//! - `core`: Orchestration logic (Processor, Manager, Resolver)
//! - `domain`: Data structures (Catalog, Application, Messages)
//! - `config`: YAML configuration
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run against a Kafka topic through a CLI bridge
//! kcat -C -b broker:9092 -t deployments -u | deployd serve | kcat -P -b broker:9092 -t deployments
//!
//! # Inspect the catalog
//! deployd --config config/application.yaml catalog
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;

// Re-export main types at crate root for convenience
pub use adapters::{ApplicationRegistry, ArgoCdClient, EventSink, EventSource};
pub use crate::core::{DeploymentError, DeploymentManager, EventProcessor};
pub use domain::{DeployedApplication, DeploymentRequest, Envelope, ServiceCatalog, ServiceEntry};
