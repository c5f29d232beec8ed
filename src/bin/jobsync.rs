//! # Job Sync Daemon
//!
//! Mirrors agent-contract jobs into a local store and completes them on-chain.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;

use jobsync_node::{Processor, SyncConfig, SyncContext};

#[derive(Parser)]
#[command(name = "jobsync")]
#[command(about = "Job sync daemon - ledger event mirror and completion submitter")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/jobsync.toml")]
    config: String,

    /// Override the ledger RPC URL
    #[arg(long)]
    rpc_url: Option<String>,

    /// Override the database path
    #[arg(long)]
    db_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    jobsync_node::init();

    let cli = Cli::parse();

    info!("Starting {} v{}", jobsync_node::NAME, jobsync_node::VERSION);

    let mut config = load_config(&cli.config)?;
    if let Some(rpc_url) = cli.rpc_url {
        config.ethereum.rpc_url = rpc_url;
    }
    if let Some(db_path) = cli.db_path {
        config.storage.db_path = db_path;
    }
    config.validate().context("Invalid configuration")?;

    info!(
        contract = %config.ethereum.agent_contract_address,
        rpc = %config.ethereum.rpc_url,
        db = %config.storage.db_path,
        "Configuration loaded"
    );

    let ctx = SyncContext::from_config(config).context("Failed to initialise sync context")?;
    let processor = Processor::new(ctx);
    processor.start().await.context("Failed to start processor")?;

    info!("Press Ctrl+C to shutdown...");
    shutdown_signal().await;

    processor.stop().await;
    info!("Job sync daemon stopped cleanly");
    Ok(())
}

/// Load config from `path`; fall back to defaults when the file does not exist
fn load_config(path: &str) -> Result<SyncConfig> {
    if Path::new(path).exists() {
        SyncConfig::load(path).with_context(|| format!("Failed to load config from {}", path))
    } else {
        info!("Config file {} not found, using defaults and environment", path);
        let mut config = SyncConfig::default();
        config.apply_env_overrides();
        Ok(config)
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
