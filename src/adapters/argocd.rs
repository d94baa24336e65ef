//! Argo CD adapter: the application registry backed by the Argo CD REST API.
//!
//! Applications are created as Helm charts from a single chart repository,
//! with automated sync. After a create is acknowledged the client optionally
//! waits for the application to converge (see [`super::convergence`]).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use super::convergence::{ConvergenceWait, StatusProbe};
use super::{ApplicationRegistry, NewApplication, RegistryError};
use crate::config::ArgoCdConfig;
use crate::domain::{ApplicationStatus, DeployedApplication, HealthStatus, SyncStatus};

/// Argo CD REST client
pub struct ArgoCdClient {
    /// Server base URL
    base_url: Url,
    /// Bearer token
    token: String,
    /// Helm chart repository
    repository: String,
    /// Argo CD project for new applications
    project: String,
    /// Cluster new applications are deployed to
    destination_server: String,
    /// Namespace the Application resources live in
    metadata_namespace: String,
    /// Convergence wait after create (None disables it)
    convergence: Option<ConvergenceWait>,
    /// Process shutdown, observed by convergence waits
    shutdown: CancellationToken,
    /// HTTP client
    client: reqwest::Client,
}

/// List response (`items` is null when there are no applications)
#[derive(Debug, Deserialize)]
struct ApplicationList {
    #[serde(default)]
    items: Option<Vec<Application>>,
}

#[derive(Debug, Default, Deserialize)]
struct Application {
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    spec: Spec,
    #[serde(default)]
    status: Status,
}

#[derive(Debug, Default, Deserialize)]
struct Metadata {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct Spec {
    #[serde(default)]
    source: Option<Source>,
    #[serde(default)]
    sources: Vec<Source>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Source {
    #[serde(default)]
    target_revision: String,
}

#[derive(Debug, Default, Deserialize)]
struct Status {
    #[serde(default)]
    sync: StatusField,
    #[serde(default)]
    health: StatusField,
}

#[derive(Debug, Default, Deserialize)]
struct StatusField {
    #[serde(default)]
    status: String,
}

impl Application {
    fn target_revision(&self) -> &str {
        self.spec
            .source
            .as_ref()
            .or_else(|| self.spec.sources.first())
            .map(|s| s.target_revision.as_str())
            .unwrap_or_default()
    }

    fn into_deployed(self) -> DeployedApplication {
        let version = self.target_revision().to_string();
        DeployedApplication::new(&self.metadata.name, version)
    }

    fn observed_status(&self) -> ApplicationStatus {
        ApplicationStatus::new(
            SyncStatus::from(self.status.sync.status.as_str()),
            HealthStatus::from(self.status.health.status.as_str()),
        )
    }
}

impl ArgoCdClient {
    /// Build a client from configuration
    pub fn from_config(
        config: &ArgoCdConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, RegistryError> {
        let base_url = Url::parse(config.url.trim()).map_err(|e| {
            RegistryError::Other(format!("invalid Argo CD URL '{}': {}", config.url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(RegistryError::Other(format!(
                "invalid Argo CD URL '{}': not a base URL",
                config.url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .danger_accept_invalid_certs(config.insecure)
            .build()?;

        let convergence = config.convergence.enabled.then(|| {
            ConvergenceWait::new(
                Duration::from_secs(config.convergence.interval_seconds),
                Duration::from_secs(config.convergence.timeout_seconds),
            )
        });

        Ok(Self {
            base_url,
            token: config.token.clone(),
            repository: config.repository.clone(),
            project: config.project.clone(),
            destination_server: config.destination_server.clone(),
            metadata_namespace: config.metadata.namespace.clone(),
            convergence,
            shutdown,
            client,
        })
    }

    /// Override the convergence settings
    pub fn with_convergence(mut self, convergence: Option<ConvergenceWait>) -> Self {
        self.convergence = convergence;
        self
    }

    /// Build an API URL; each segment is percent-encoded
    fn api_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["api", "v1"]).extend(segments);
        }
        url
    }

    /// Application resource submitted on create
    fn application_body(&self, app: &NewApplication) -> Value {
        let parameters: Vec<Value> = app
            .values
            .iter()
            .map(|(name, value)| json!({ "name": name, "value": value, "forceString": false }))
            .collect();

        json!({
            "metadata": {
                "name": app.service,
                "namespace": self.metadata_namespace,
            },
            "spec": {
                "project": self.project,
                "source": {
                    "repoURL": self.repository,
                    "chart": app.service,
                    "targetRevision": app.version,
                    "helm": {
                        "releaseName": app.service,
                        "namespace": app.namespace,
                        "parameters": parameters,
                    },
                },
                "destination": {
                    "server": self.destination_server,
                    "namespace": app.namespace,
                },
                "syncPolicy": {
                    "automated": {
                        "prune": true,
                        "selfHeal": true,
                        "allowEmpty": false,
                    },
                    "retry": {
                        "limit": 5,
                        "backoff": {
                            "duration": "5s",
                            "factor": 2,
                            "maxDuration": "3m",
                        },
                    },
                    "syncOptions": [
                        "CreateNamespace=true",
                        "ApplyOutOfSyncOnly=true",
                        "ServerSideApply=true",
                    ],
                },
            },
        })
    }

    /// Fetch a single application by name
    async fn get(&self, name: &str) -> Result<Application, RegistryError> {
        let response = self
            .client
            .get(self.api_url(&["applications", name]))
            .bearer_auth(&self.token)
            .send()
            .await?;

        read_json(response).await
    }
}

/// Decode a successful response, or turn a failed one into an error
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, RegistryError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RegistryError::Status {
            status: status.as_u16(),
            body: body.trim().to_string(),
        });
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| RegistryError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl StatusProbe for ArgoCdClient {
    async fn status(&self, name: &str) -> Result<ApplicationStatus, RegistryError> {
        Ok(self.get(name).await?.observed_status())
    }
}

#[async_trait]
impl ApplicationRegistry for ArgoCdClient {
    fn name(&self) -> &str {
        "argocd"
    }

    async fn list(&self) -> Result<Vec<DeployedApplication>, RegistryError> {
        let response = self
            .client
            .get(self.api_url(&["applications"]))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to list Argo CD applications");
                e
            })?;

        let list: ApplicationList = read_json(response).await.map_err(|e| {
            error!(error = %e, "Failed to list Argo CD applications");
            e
        })?;

        Ok(list
            .items
            .unwrap_or_default()
            .into_iter()
            .map(Application::into_deployed)
            .collect())
    }

    #[instrument(skip(self, app), fields(service = %app.service, version = %app.version))]
    async fn create(&self, app: &NewApplication) -> Result<DeployedApplication, RegistryError> {
        let response = self
            .client
            .post(self.api_url(&["applications"]))
            .query(&[("upsert", "false"), ("validate", "true")])
            .bearer_auth(&self.token)
            .json(&self.application_body(app))
            .send()
            .await?;

        let created: Application = match read_json(response).await {
            Ok(created) => created,
            Err(e) => {
                match &e {
                    RegistryError::Status { status, .. }
                        if *status == StatusCode::CONFLICT.as_u16() =>
                    {
                        error!(error = %e, "Application already exists")
                    }
                    _ => error!(error = %e, "Failed to create Argo CD application"),
                }
                return Err(e);
            }
        };
        info!(namespace = %app.namespace, "Argo CD application submitted");

        if let Some(convergence) = &self.convergence {
            convergence.wait(self, &app.service, &self.shutdown).await?;
        }

        Ok(created.into_deployed())
    }
}
