//! Configuration for deployd.
//!
//! Config file discovery (highest priority first):
//! 1. `--config <path>` on the command line (or `DEPLOYD_CONFIG`)
//! 2. `config/application-<profile>.yaml` when `PROFILE` is set
//! 3. `config/application.yaml`
//!
//! `DEPLOYD_ARGOCD_TOKEN` overrides the Argo CD token from the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::{ProcessorSettings, RetryPolicy};
use crate::domain::{ServiceCatalog, ServiceEntry};

/// Environment variable selecting the config profile
pub const PROFILE_ENV: &str = "PROFILE";

/// Environment variable overriding the Argo CD token
pub const TOKEN_ENV: &str = "DEPLOYD_ARGOCD_TOKEN";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Active profile (from `PROFILE`, not the file)
    #[serde(skip)]
    pub profile: String,

    /// Service catalog
    #[serde(default)]
    pub services: Vec<ServiceEntry>,

    #[serde(default)]
    pub argocd: ArgoCdConfig,

    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArgoCdConfig {
    pub url: String,
    #[serde(default)]
    pub token: String,
    /// Helm chart repository applications are created from
    #[serde(default)]
    pub repository: String,
    #[serde(default = "default_project")]
    pub project: String,
    #[serde(default = "default_destination_server")]
    pub destination_server: String,
    #[serde(default)]
    pub metadata: ArgoCdMetadataConfig,
    /// Skip TLS verification
    #[serde(default)]
    pub insecure: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default)]
    pub convergence: ConvergenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArgoCdMetadataConfig {
    /// Namespace holding Application resources
    #[serde(default = "default_metadata_namespace")]
    pub namespace: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConvergenceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval")]
    pub interval_seconds: u64,
    #[serde(default = "default_convergence_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Stamped on outbound messages; inbound messages carrying it are skipped
    #[serde(default = "default_producer_id")]
    pub producer_id: String,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_ms: u64,
    #[serde(default)]
    pub publish_retry: RetryPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `json` or `pretty`; unset means pretty for the development profile
    #[serde(default)]
    pub format: Option<LogFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Pretty,
}

fn default_shutdown_grace() -> u64 {
    5
}
fn default_project() -> String {
    "default".to_string()
}
fn default_destination_server() -> String {
    "https://kubernetes.default.svc".to_string()
}
fn default_metadata_namespace() -> String {
    "argocd".to_string()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_poll_interval() -> u64 {
    5
}
/// Three minutes
fn default_convergence_timeout() -> u64 {
    180
}
fn default_producer_id() -> String {
    "deployd".to_string()
}
fn default_queue_capacity() -> usize {
    256
}
fn default_poll_timeout() -> u64 {
    100
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ArgoCdConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            repository: String::new(),
            project: default_project(),
            destination_server: default_destination_server(),
            metadata: ArgoCdMetadataConfig::default(),
            insecure: false,
            request_timeout_seconds: default_request_timeout(),
            convergence: ConvergenceConfig::default(),
        }
    }
}

impl Default for ArgoCdMetadataConfig {
    fn default() -> Self {
        Self {
            namespace: default_metadata_namespace(),
        }
    }
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_poll_interval(),
            timeout_seconds: default_convergence_timeout(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            producer_id: default_producer_id(),
            queue_capacity: default_queue_capacity(),
            poll_timeout_ms: default_poll_timeout(),
            publish_retry: RetryPolicy::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: None,
        }
    }
}

impl Config {
    /// Load configuration from the resolved path and the environment
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let profile = std::env::var(PROFILE_ENV)
            .map(|p| p.trim().to_lowercase())
            .unwrap_or_default();
        let path = resolve_path(explicit, &profile);

        let mut config = Self::from_file(&path)?;
        config.profile = profile;
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            config.argocd.token = token;
        }

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load and parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Check the settings the process cannot start without
    pub fn validate(&self) -> Result<()> {
        if self.argocd.url.trim().is_empty() {
            anyhow::bail!("argocd.url must be set");
        }
        if self.bus.queue_capacity == 0 {
            anyhow::bail!("bus.queue_capacity must be greater than zero");
        }
        let convergence = &self.argocd.convergence;
        if convergence.enabled
            && (convergence.interval_seconds == 0 || convergence.timeout_seconds == 0)
        {
            anyhow::bail!("argocd.convergence interval and timeout must be greater than zero");
        }
        self.catalog()?;
        Ok(())
    }

    /// Build the service catalog
    pub fn catalog(&self) -> Result<ServiceCatalog> {
        ServiceCatalog::new(self.services.clone()).context("Invalid service catalog")
    }

    /// Log output format, falling back on the profile
    pub fn log_format(&self) -> LogFormat {
        self.logging.format.unwrap_or(if self.profile == "development" {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        })
    }

    pub fn processor_settings(&self) -> ProcessorSettings {
        ProcessorSettings {
            queue_capacity: self.bus.queue_capacity,
            poll_timeout: Duration::from_millis(self.bus.poll_timeout_ms),
            producer_id: self.bus.producer_id.clone(),
            publish_retry: self.bus.publish_retry.clone(),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_seconds),
        }
    }
}

/// Pick the config file for a profile
fn resolve_path(explicit: Option<&Path>, profile: &str) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if profile.is_empty() {
        PathBuf::from("config/application.yaml")
    } else {
        PathBuf::from(format!("config/application-{}.yaml", profile))
    }
}
