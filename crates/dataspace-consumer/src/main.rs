//! dsconsumer - dataspace consumer command-line host
//!
//! Wires the policy governance engine and the contract orchestrator to a
//! connector management API:
//! - register, inspect and revoke accepted usage policies
//! - list the catalog offers a provider publishes that governance accepts
//! - negotiate an offer through to a data-plane credential (EDR)

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dataspace_connector::HttpConnectorGateway;
use dataspace_governance::GovernanceEngine;
use dataspace_orchestrator::ContractOrchestrator;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::PolicyCommands;
use config::ConsumerConfig;

#[derive(Parser)]
#[command(name = "dsconsumer")]
#[command(about = "Dataspace consumer - policy governance and contract negotiation", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "DATASPACE_CONFIG")]
    config: Option<String>,

    /// Log level, overrides the configured one
    #[arg(long, env = "DATASPACE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage accepted policies
    Policy {
        #[command(subcommand)]
        command: PolicyCommands,
    },

    /// List a provider's offers that pass governance
    Catalog {
        /// Provider participant id (BPN)
        provider_id: String,

        /// Provider DSP endpoint
        address: String,
    },

    /// Negotiate an offer and wait for its EDR
    Negotiate {
        provider_id: String,

        address: String,

        /// Only consider offers for this asset
        #[arg(long)]
        asset: Option<String>,

        /// Negotiate this exact offer
        #[arg(long)]
        offer: Option<String>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConsumerConfig::load(cli.config.as_deref()).context("invalid configuration")?;

    let level = cli.log_level.clone().unwrap_or_else(|| config.logging.level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    // Logs go to stderr; stdout carries command output.
    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    if let Commands::Config = cli.command {
        let mut shown = config.clone();
        if shown.connector.api_key.is_some() {
            shown.connector.api_key = Some("<redacted>".to_string());
        }
        println!("{}", serde_json::to_string_pretty(&shown)?);
        return Ok(());
    }

    let governance = Arc::new(
        GovernanceEngine::from_config(&config.governance)
            .await
            .context("cannot open policy store")?,
    );
    debug!(mode = %governance.mode(), "governance ready");

    match cli.command {
        Commands::Policy { command } => commands::policy(command, &governance).await,
        Commands::Catalog {
            provider_id,
            address,
        } => {
            let orchestrator = orchestrator(&config, governance)?;
            commands::catalog(&orchestrator, &provider_id, &address).await
        }
        Commands::Negotiate {
            provider_id,
            address,
            asset,
            offer,
        } => {
            let orchestrator = orchestrator(&config, governance)?;
            commands::negotiate(
                &orchestrator,
                &provider_id,
                &address,
                asset.as_deref(),
                offer.as_deref(),
            )
            .await
        }
        Commands::Config => Ok(()),
    }
}

fn orchestrator(
    config: &ConsumerConfig,
    governance: Arc<GovernanceEngine>,
) -> Result<ContractOrchestrator> {
    let gateway = HttpConnectorGateway::new(&config.connector)
        .context("cannot build connector client")?;
    let orchestrator = ContractOrchestrator::new(Arc::new(gateway), config.orchestrator.clone())
        .context("invalid orchestrator settings")?
        .with_governance(governance);
    Ok(orchestrator)
}
