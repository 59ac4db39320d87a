//! Peer and consensus observers
//!
//! Pure logging consumers of the engine's peer and consensus streams. They
//! keep the peer and consensus gauges current and warn when a seed peer's
//! clock disagrees with ours by more than the configured offset.

use crate::engine::{GenesisConfig, PeerEvent, PeerInfo};
use crate::metrics;
use crate::node::NodeContext;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};

/// Logs peer churn and checks seed peers for clock skew
pub struct PeerMonitor {
    node: NodeContext,
    max_time_offset: Duration,
}

impl PeerMonitor {
    pub fn new(node: NodeContext, max_time_offset: Duration) -> Self {
        Self {
            node,
            max_time_offset,
        }
    }

    /// True if `peer` is a seed whose clock is off by more than the limit
    pub fn clock_skew_suspected(genesis: &GenesisConfig, peer: &PeerInfo, max: Duration) -> bool {
        genesis.is_seed(&peer.address) && peer.time_offset() > max
    }

    /// Log one peer event; returns whether clock skew was flagged
    pub fn observe(&self, event: &PeerEvent) -> bool {
        let peers = self.node.network.peer_count();
        metrics::set_peers(peers);

        match event {
            PeerEvent::Joined(peer) => {
                info!(peer = %peer.address, peers, "Connected to peer");
                let skewed =
                    Self::clock_skew_suspected(&self.node.genesis, peer, self.max_time_offset);
                if skewed {
                    error!(
                        peer = %peer.address,
                        time_offset_ms = peer.time_offset_ms,
                        "Your local system time seems to be wrong! You might not be able to synchronize with the network"
                    );
                }
                skewed
            }
            PeerEvent::Left(peer) => {
                info!(peer = %peer.address, peers, "Disconnected from peer");
                false
            }
        }
    }

    pub async fn run(
        self,
        mut events: broadcast::Receiver<PeerEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => {
                        self.observe(&event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Peer event stream lagged");
                        metrics::set_peers(self.node.network.peer_count());
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = shutdown.recv() => break,
            }
        }
    }
}

/// Log every transition to established consensus with the chain state
pub async fn watch_consensus(
    node: NodeContext,
    mut established: broadcast::Receiver<()>,
    mut shutdown: broadcast::Receiver<()>,
) {
    metrics::set_consensus_established(node.consensus.is_established());

    loop {
        tokio::select! {
            received = established.recv() => match received {
                Ok(()) | Err(RecvError::Lagged(_)) => log_established(&node),
                Err(RecvError::Closed) => break,
            },
            _ = shutdown.recv() => break,
        }
    }
}

fn log_established(node: &NodeContext) {
    let elapsed = node.started_at.elapsed();
    metrics::set_consensus_established(true);
    metrics::set_chain_height(node.blockchain.height());

    info!(
        node_type = %node.node_type,
        elapsed_secs = elapsed.as_secs_f64(),
        "{}-consensus established in {:.3}s",
        node.node_type,
        elapsed.as_secs_f64()
    );
    info!(
        height = node.blockchain.height(),
        total_work = %node.blockchain.total_work(),
        head_hash = %node.blockchain.head_hash(),
        pending_transactions = node.mempool.transaction_count(),
        "Current state"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeSettings;
    use crate::engine::{MemoryEngine, PeerAddress};
    use crate::node;

    async fn monitor() -> (MemoryEngine, PeerMonitor) {
        let engine = MemoryEngine::new();
        let settings = NodeSettings {
            network: "main".to_string(),
            ..Default::default()
        };
        let node = node::bootstrap(&engine, &settings).await.unwrap();
        (engine, PeerMonitor::new(node, Duration::from_secs(15 * 60)))
    }

    fn peer(address: &str, time_offset_ms: i64) -> PeerInfo {
        PeerInfo {
            address: PeerAddress::new(address),
            time_offset_ms,
        }
    }

    #[tokio::test]
    async fn skewed_seed_peer_is_flagged() {
        let (_engine, monitor) = monitor().await;
        let skew = 16 * 60 * 1000;

        assert!(monitor.observe(&PeerEvent::Joined(peer("wss://seed-1.nimiq.com:8443", skew))));
        assert!(monitor.observe(&PeerEvent::Joined(peer("wss://seed-2.nimiq.com:8443", -skew))));
    }

    #[tokio::test]
    async fn non_seed_or_small_offsets_are_ignored() {
        let (_engine, monitor) = monitor().await;

        assert!(!monitor.observe(&PeerEvent::Joined(peer("wss://other.example:8443", 16 * 60 * 1000))));
        assert!(!monitor.observe(&PeerEvent::Joined(peer("wss://seed-1.nimiq.com:8443", 1_000))));
        assert!(!monitor.observe(&PeerEvent::Left(peer("wss://seed-1.nimiq.com:8443", 16 * 60 * 1000))));
    }

    #[tokio::test]
    async fn run_consumes_engine_peer_events() {
        let (engine, monitor) = monitor().await;
        let events = monitor.node.network.subscribe_peers();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(monitor.run(events, shutdown_rx));

        engine.chain().peer_joined(peer("wss://seed-1.nimiq.com:8443", 0));
        engine.chain().peer_left(&PeerAddress::new("wss://seed-1.nimiq.com:8443"));
        tokio::task::yield_now().await;

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn consensus_watcher_stops_on_shutdown() {
        let (engine, monitor) = monitor().await;
        let node = monitor.node.clone();
        let established = node.consensus.subscribe_established();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(watch_consensus(node, established, shutdown_rx));

        engine.chain().set_established(true);
        tokio::task::yield_now().await;

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
