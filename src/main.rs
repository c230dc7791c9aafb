mod adapters;
mod bootstrap;
mod clients;
mod config;
mod error;
mod ledger;
mod server;
mod settlement;
mod signing;

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::RelayerConfig;
use crate::settlement::{SwapScheduleConfig, SwapScheduler};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,interop_relayer=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("🚀 Starting Cross-Chain Interop Relayer");

    // Load configuration
    dotenv::dotenv().ok();
    let config = RelayerConfig::load().context("failed to load relayer configuration")?;
    config.validate()?;
    info!("📋 Configuration loaded: {:?}", config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("❌ Failed to listen for Ctrl-C: {}", e);
            return;
        }
        info!("🛑 Shutdown requested, finishing in-flight swap");
        signal_tx.send_replace(true);
    });

    let orchestrator = bootstrap::initialize_orchestrator(&config, shutdown_rx.clone())
        .await
        .context("failed to initialize relayer")?;
    let status = orchestrator.subscribe();

    let server = if config.status.enabled {
        let simulation = config.status.simulation.then(|| orchestrator.adapters());
        let app = server::create_app(status, simulation);
        let bind_address = config.status.bind_address.clone();
        let shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            server::run_server(app, &bind_address, shutdown).await
        }))
    } else {
        None
    };

    let schedule = SwapScheduleConfig {
        poll_interval: Duration::from_secs(config.swap.poll_interval_secs),
    };
    let result = SwapScheduler::new(schedule, orchestrator, shutdown_rx).start().await;

    // The scheduler may stop on its own; take the status server down with it
    shutdown_tx.send_replace(true);

    if let Some(server) = server {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("⚠️  Status server error: {}", e),
            Err(e) => warn!("⚠️  Status server task failed: {}", e),
        }
    }

    result
        .context("swap scheduler panicked")?
        .context("relayer stopped on a fatal error")?;

    info!("👋 Relayer stopped");
    Ok(())
}
