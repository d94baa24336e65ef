//! Deployment manager: catalog and dependency rules in front of the registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use super::notifier::Notifier;
use super::resolver::DependencyResolver;
use crate::adapters::{ApplicationRegistry, NewApplication, RegistryError};
use crate::domain::{
    normalize, DeployedApplication, Dependency, MessageKey, ServiceCatalog, SystemMessage,
};

/// Why a deployment request was not carried out
#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("service '{0}' not found")]
    UnknownService(String),

    #[error("{}", unmet_message(.service, .missing))]
    UnmetDependencies {
        service: String,
        missing: Vec<Dependency>,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl DeploymentError {
    /// Short outcome label used in status notices
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::UnknownService(_) => "unknown_service",
            Self::UnmetDependencies { .. } => "unmet_dependencies",
            Self::Registry(RegistryError::ConvergenceTimeout { .. }) => "convergence_timeout",
            Self::Registry(RegistryError::Cancelled(_)) => "cancelled",
            Self::Registry(_) => "registry_error",
        }
    }
}

fn unmet_message(service: &str, missing: &[Dependency]) -> String {
    let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
    format!(
        "service '{}' cannot be installed because the following dependencies are missing: {}",
        service,
        names.join(", ")
    )
}

/// Lists and creates applications on behalf of the event processor
pub struct DeploymentManager {
    catalog: Arc<ServiceCatalog>,
    registry: Arc<dyn ApplicationRegistry>,
    resolver: DependencyResolver,
    notifier: Notifier,
}

impl DeploymentManager {
    pub fn new(catalog: Arc<ServiceCatalog>, registry: Arc<dyn ApplicationRegistry>) -> Self {
        let resolver = DependencyResolver::new(catalog.clone(), registry.clone());
        Self {
            catalog,
            registry,
            resolver,
            notifier: Notifier::disabled(),
        }
    }

    /// Emit system notices through `notifier`
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Applications in the registry that belong to the catalog.
    ///
    /// The unfiltered registry list is published as an application-list
    /// notice before filtering.
    #[instrument(skip(self))]
    pub async fn list_visible_applications(
        &self,
    ) -> Result<Vec<DeployedApplication>, DeploymentError> {
        let applications = self.registry.list().await?;

        match serde_json::to_value(&applications) {
            Ok(snapshot) => {
                self.notifier
                    .notify(SystemMessage::new(MessageKey::ApplicationList, snapshot));
            }
            Err(e) => warn!(error = %e, "Failed to encode application list"),
        }

        Ok(applications
            .into_iter()
            .filter(|app| self.catalog.has_service(&app.name))
            .collect())
    }

    /// Create `service` at `version` once its direct dependencies are deployed.
    ///
    /// An empty `namespace` means the service name.
    #[instrument(skip(self, values))]
    pub async fn create_application(
        &self,
        service: &str,
        version: &str,
        namespace: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<DeployedApplication, DeploymentError> {
        let service = normalize(service);
        let namespace = if namespace.is_empty() {
            service.clone()
        } else {
            namespace.to_string()
        };

        if !self.catalog.has_service(&service) {
            warn!("Service not found in catalog");
            return Err(DeploymentError::UnknownService(service));
        }

        let missing = self.resolver.find_missing_dependencies(&service).await?;
        if !missing.is_empty() {
            let error = DeploymentError::UnmetDependencies {
                service: service.clone(),
                missing,
            };
            let message = error.to_string();
            warn!("{}", message);
            self.notifier
                .notify(SystemMessage::status(&service, error.outcome(), message));
            return Err(error);
        }

        let request = NewApplication {
            service,
            version: version.to_string(),
            namespace,
            values: values.clone(),
        };
        let application = self.registry.create(&request).await?;

        info!(
            application = %application.name,
            revision = %application.version,
            namespace = %request.namespace,
            "Application created"
        );
        Ok(application)
    }
}
