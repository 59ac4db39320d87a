//! tx-relay - chain client bootstrap plus transaction relay
//!
//! This binary:
//! - Validates the node configuration and brings up the chain client
//! - Relays each head block's transactions to recipient address topics
//! - Serves subscriber WebSockets, health/ready endpoints and Prometheus metrics

use anyhow::Result;
use tokio::signal;
use tracing::{error, info};
use tx_relay::config::RelayConfig;
use tx_relay::engine::MemoryEngine;
use tx_relay::metrics::RelayMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first to get log level
    let relay_config = RelayConfig::from_env()?;

    // Initialize tracing with configured log level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("tx_relay={}", relay_config.log_level).parse()?)
                .add_directive("axum=warn".parse()?),
        )
        .json()
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        network = %relay_config.node.network,
        node_type = %relay_config.node.node_type,
        port = relay_config.relay.port,
        "Starting tx-relay"
    );

    let metrics = RelayMetrics::install()?;
    info!("Prometheus metrics initialized");

    let engine = MemoryEngine::new();

    if let Err(e) = tx_relay::run(relay_config, &engine, Some(metrics), shutdown_signal()).await {
        error!(error = %e, error_type = e.error_type_label(), "Relay terminated");
        return Err(e.into());
    }

    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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
