//! Transaction relay
//!
//! Bootstraps a chain client node and relays every transaction of each new
//! head block to WebSocket subscribers of the recipient's address topic.
//!
//! - `node`: validation gate and node construction
//! - `bridge`: head-changed events to topic publishes
//! - `relay`: topic registry and subscriber fan-out
//! - `monitor`: peer and consensus logging
//! - `health`: HTTP surface (`/ws`, `/health`, `/ready`, `/metrics`)

pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod metrics;
pub mod monitor;
pub mod node;
pub mod relay;

use crate::bridge::EventBridge;
use crate::config::RelayConfig;
use crate::engine::ChainEngine;
use crate::error::RelayError;
use crate::health::AppState;
use crate::metrics::RelayMetrics;
use crate::monitor::PeerMonitor;
use crate::relay::SubscriptionGateway;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Run the relay until `shutdown` resolves.
///
/// Bootstrap failures are returned before anything is spawned.
pub async fn run<E, F>(
    config: RelayConfig,
    engine: &E,
    metrics: Option<RelayMetrics>,
    shutdown: F,
) -> Result<(), RelayError>
where
    E: ChainEngine + ?Sized,
    F: Future<Output = ()> + Send + 'static,
{
    let node = node::bootstrap(engine, &config.node).await?;
    let gateway = Arc::new(SubscriptionGateway::new(config.relay.queue_capacity));

    // Subscribe to every engine stream before the node goes online
    let head_changed = node.blockchain.subscribe_head_changed();
    let peer_events = node.network.subscribe_peers();
    let established = node.consensus.subscribe_established();

    let (shutdown_tx, _) = broadcast::channel(1);

    let bridge = Arc::new(EventBridge::new(node.clone(), Arc::clone(&gateway)));
    let peer_monitor = PeerMonitor::new(node.clone(), config.relay.max_time_offset);

    let tasks = vec![
        tokio::spawn(bridge.run(head_changed, shutdown_tx.subscribe())),
        tokio::spawn(peer_monitor.run(peer_events, shutdown_tx.subscribe())),
        tokio::spawn(monitor::watch_consensus(
            node.clone(),
            established,
            shutdown_tx.subscribe(),
        )),
    ];

    let port = config.relay.port;
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| RelayError::Listener { port, source })?;

    node.start_networking();

    info!(
        port = listener.local_addr().map(|a| a.port()).unwrap_or(port),
        "Starting HTTP server"
    );

    let app = health::router(AppState {
        gateway,
        node,
        metrics,
    });

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|source| RelayError::Listener { port, source });

    info!("Shutting down relay...");
    let _ = shutdown_tx.send(());
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }

    info!("Relay shutdown complete");
    served
}
