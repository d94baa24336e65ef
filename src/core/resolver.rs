//! Dependency resolution against the live registry.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::adapters::{ApplicationRegistry, RegistryError};
use crate::domain::{normalize, DeployedApplication, Dependency, ServiceCatalog, ServiceEntry};

/// Decides which direct dependencies of a service are not deployed yet
#[derive(Clone)]
pub struct DependencyResolver {
    catalog: Arc<ServiceCatalog>,
    registry: Arc<dyn ApplicationRegistry>,
}

impl DependencyResolver {
    pub fn new(catalog: Arc<ServiceCatalog>, registry: Arc<dyn ApplicationRegistry>) -> Self {
        Self { catalog, registry }
    }

    /// Dependencies of `service` missing from the registry, in declaration order.
    ///
    /// Unknown services have no dependencies; rejecting them is the caller's
    /// job. The registry is queried on every call.
    pub async fn find_missing_dependencies(
        &self,
        service: &str,
    ) -> Result<Vec<Dependency>, RegistryError> {
        let Some(entry) = self.catalog.get(service) else {
            return Ok(Vec::new());
        };
        if entry.depends.is_empty() {
            return Ok(Vec::new());
        }

        let deployed = self.registry.list().await?;
        let missing = missing_dependencies(entry, &deployed);

        debug!(
            service = %entry.name,
            declared = entry.depends.len(),
            missing = missing.len(),
            "Resolved dependencies"
        );
        Ok(missing)
    }
}

/// Declared dependencies of `entry` whose name is not among `deployed`
pub fn missing_dependencies(
    entry: &ServiceEntry,
    deployed: &[DeployedApplication],
) -> Vec<Dependency> {
    let deployed_names: HashSet<String> = deployed.iter().map(|app| normalize(&app.name)).collect();

    entry
        .depends
        .iter()
        .filter(|dep| !deployed_names.contains(&normalize(&dep.name)))
        .cloned()
        .collect()
}
