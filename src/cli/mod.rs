//! Command-line interface for deployd.
//!
//! Provides commands for running the orchestrator and inspecting its
//! configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::adapters::{ArgoCdClient, LineSink, LineSource};
use crate::config::Config;
use crate::core::EventProcessor;
use crate::logging;

/// deployd - Event-driven deployment orchestrator for Argo CD
#[derive(Parser, Debug)]
#[command(name = "deployd")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to config/application[-$PROFILE].yaml)
    #[arg(short, long, global = true, env = "DEPLOYD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the orchestrator: read requests from stdin, publish notices to stdout
    Serve,

    /// Print the service catalog
    Catalog,

    /// Validate the configuration and print a summary
    Check,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;

        match self.command {
            Commands::Serve => serve(config).await,
            Commands::Catalog => print_catalog(&config),
            Commands::Check => check(&config),
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    logging::init(&config)?;

    let catalog = Arc::new(config.catalog()?);
    let shutdown = CancellationToken::new();

    let registry = ArgoCdClient::from_config(&config.argocd, shutdown.clone())
        .context("Failed to create Argo CD client")?;
    let source = LineSource::stdin();
    let sink = LineSink::stdout(config.bus.producer_id.clone());

    info!(
        services = catalog.len(),
        argocd = %config.argocd.url,
        profile = %config.profile,
        "Starting deployd"
    );

    let processor = EventProcessor::new(
        catalog,
        Arc::new(registry),
        Arc::new(source),
        Arc::new(sink),
        config.processor_settings(),
    );
    let handle = processor
        .start(shutdown.clone())
        .await
        .context("Failed to start event processor")?;

    wait_for_signal().await?;
    info!("Shutdown signal received");
    handle.shutdown().await;

    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl-C")?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    Ok(())
}

fn print_catalog(config: &Config) -> Result<()> {
    let catalog = config.catalog()?;

    if catalog.is_empty() {
        println!("No services in catalog.");
        return Ok(());
    }

    println!("{:<24} {:<12} DEPENDS", "SERVICE", "VERSION");
    for entry in catalog.entries() {
        let depends: Vec<String> = entry.depends.iter().map(ToString::to_string).collect();
        println!(
            "{:<24} {:<12} {}",
            entry.name,
            entry.version,
            if depends.is_empty() {
                "-".to_string()
            } else {
                depends.join(", ")
            }
        );
    }

    Ok(())
}

fn check(config: &Config) -> Result<()> {
    let catalog = config.catalog()?;
    let profile = if config.profile.is_empty() {
        "(none)"
    } else {
        config.profile.as_str()
    };

    println!("Configuration OK");
    println!("  Profile:      {}", profile);
    println!("  Argo CD:      {}", config.argocd.url);
    println!("  Repository:   {}", config.argocd.repository);
    println!("  Services:     {}", catalog.len());
    if config.argocd.convergence.enabled {
        println!(
            "  Convergence:  every {}s, timeout {}s",
            config.argocd.convergence.interval_seconds, config.argocd.convergence.timeout_seconds
        );
    } else {
        println!("  Convergence:  disabled");
    }
    println!("  Queue:        {}", config.bus.queue_capacity);

    Ok(())
}
