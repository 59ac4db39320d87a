//! Node bootstrap
//!
//! Turns `NodeSettings` into a running node: validation gate, transport and
//! consensus strategy selection, wallet initialization. The resulting
//! `NodeContext` is the only way the rest of the relay reaches the engine.

mod bootstrap;

pub use bootstrap::{bootstrap, validate, NodeConfig};

use crate::config::NodeType;
use crate::engine::{
    Blockchain, Consensus, GenesisConfig, Mempool, Network, NetworkConfig, Wallet, WalletStore,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Runtime handles of a bootstrapped node, shared read-only
#[derive(Clone)]
pub struct NodeContext {
    pub genesis: GenesisConfig,
    pub node_type: NodeType,
    pub network_config: NetworkConfig,
    pub consensus: Arc<dyn Consensus>,
    pub blockchain: Arc<dyn Blockchain>,
    pub mempool: Arc<dyn Mempool>,
    pub network: Arc<dyn Network>,
    pub wallet_store: Arc<dyn WalletStore>,
    pub wallet: Wallet,
    pub passive: bool,
    pub started_at: Instant,
}

impl NodeContext {
    /// Open the node to the network.
    ///
    /// Call this after every event consumer has subscribed, otherwise early
    /// peer and head events are lost.
    pub fn start_networking(&self) {
        if self.passive {
            self.network.set_allow_inbound_connections(true);
            info!("Passive mode: accepting inbound connections only");
        } else {
            self.network.connect();
            info!(protocol = self.network_config.protocol(), "Connecting to network");
        }
    }
}
