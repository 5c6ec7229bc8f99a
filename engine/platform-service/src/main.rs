//! Agent Wallet Platform Service
//!
//! Main entry point: loads configuration, wires the ledger and the Buffalo
//! gateway, serves the REST API and shuts down gracefully on Ctrl+C/SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use platform_service::{
    graceful_shutdown, initialize_logging, load_configuration, setup_signal_handlers, ServiceState,
};

#[derive(Parser, Debug)]
#[command(name = "agent-platform")]
#[command(about = "Agent wallet platform with the Buffalo provider gateway")]
#[command(version)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = load_configuration(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize logging before anything else logs
    initialize_logging(&config.logging)?;

    info!("Starting Agent Wallet Platform v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded successfully");

    // Create service state
    let service_state = Arc::new(ServiceState::new(config).await?);
    info!("Service state initialized");

    // Setup signal handlers for graceful shutdown
    let mut shutdown_signal = setup_signal_handlers()?;
    info!("Signal handlers configured");

    // Start the REST API in a separate task
    let (stop_server, server_stopped) = tokio::sync::oneshot::channel::<()>();
    let server_handle = {
        let state = service_state.clone();
        tokio::spawn(async move {
            let shutdown = async {
                let _ = server_stopped.await;
            };
            if let Err(e) = state.serve_http(shutdown).await {
                error!("REST API failed: {:#}", e);
            }
        })
    };

    // Wait for shutdown signal
    info!("Agent Wallet Platform is running. Press Ctrl+C to shutdown gracefully.");
    let _ = shutdown_signal.recv().await;

    info!("Shutdown signal received. Initiating graceful shutdown...");
    graceful_shutdown(service_state, stop_server, server_handle).await?;

    info!("Agent Wallet Platform shutdown complete");
    Ok(())
}
