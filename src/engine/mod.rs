//! Chain engine boundary
//!
//! The relay never talks to consensus, storage or the peer-to-peer stack
//! directly. Everything it needs from the chain client is expressed by the
//! traits below; `MemoryEngine` is the in-process implementation used by the
//! binary and the tests.
//!
//! Engine events (head changes, consensus establishment, peer churn) are
//! exposed as `tokio::sync::broadcast` streams so every consumer runs in its
//! own task and never re-enters the engine from a callback.

pub mod memory;
pub mod types;

use crate::error::EngineError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

pub use memory::{MemoryChain, MemoryEngine};
pub use types::{
    Address, Block, BlockBody, BlockHeader, GenesisConfig, Hash, NodeIdentity, PeerAddress,
    PeerEvent, PeerInfo, Transaction, Wallet,
};

/// Transport the node's peer-to-peer stack listens on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkConfig {
    /// Secure WebSocket listener
    Wss {
        host: String,
        port: u16,
        tls_key: String,
        tls_cert: String,
        reverse_proxy: bool,
    },
    /// Plaintext WebSocket listener
    Ws {
        host: String,
        port: u16,
        reverse_proxy: bool,
    },
    /// No listener; outbound connections only
    Dumb,
}

impl NetworkConfig {
    pub fn protocol(&self) -> &'static str {
        match self {
            Self::Wss { .. } => "wss",
            Self::Ws { .. } => "ws",
            Self::Dumb => "dumb",
        }
    }

    /// Whether peers can dial this node at all
    pub fn accepts_inbound(&self) -> bool {
        !matches!(self, Self::Dumb)
    }
}

/// Consensus strategy, one per node type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusStrategy {
    Full,
    Light,
    Nano,
}

impl ConsensusStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Light => "light",
            Self::Nano => "nano",
        }
    }
}

impl fmt::Display for ConsensusStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait Consensus: Send + Sync {
    fn is_established(&self) -> bool;

    /// Fires every time consensus becomes established
    fn subscribe_established(&self) -> broadcast::Receiver<()>;

    async fn head_hash(&self) -> Result<Hash, EngineError>;
}

#[async_trait]
pub trait Blockchain: Send + Sync {
    fn height(&self) -> u32;

    fn head_hash(&self) -> Hash;

    fn total_work(&self) -> u128;

    /// Fires with the new head hash whenever the canonical head changes
    fn subscribe_head_changed(&self) -> broadcast::Receiver<Hash>;

    /// `Ok(None)` if the block is unknown (e.g. reorged away)
    async fn block_by_hash(&self, hash: &Hash, include_body: bool) -> Result<Option<Block>, EngineError>;

    /// Balance in lunas. Header-only strategies return `EngineError::Unsupported`.
    async fn account_balance(&self, address: &Address) -> Result<u64, EngineError>;
}

pub trait Mempool: Send + Sync {
    fn transaction_count(&self) -> usize;
}

pub trait Network: Send + Sync {
    fn identity(&self) -> NodeIdentity;

    /// Initiate outbound connections
    fn connect(&self);

    fn set_allow_inbound_connections(&self, allow: bool);

    fn peer_count(&self) -> usize;

    fn subscribe_peers(&self) -> broadcast::Receiver<PeerEvent>;
}

#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn default_wallet(&self) -> Result<Wallet, EngineError>;

    async fn list(&self) -> Result<Vec<Address>, EngineError>;
}

/// Handles produced by a consensus constructor
#[derive(Clone)]
pub struct ConsensusHandle {
    pub consensus: Arc<dyn Consensus>,
    pub blockchain: Arc<dyn Blockchain>,
    pub mempool: Arc<dyn Mempool>,
    pub network: Arc<dyn Network>,
}

/// Entry point into a chain client library
#[async_trait]
pub trait ChainEngine: Send + Sync {
    /// Named genesis configuration, `None` for unknown networks
    fn genesis(&self, network: &str) -> Option<GenesisConfig>;

    /// Patch a tunable engine parameter
    fn set_constant(&self, key: &str, value: u64) -> Result<(), EngineError>;

    async fn full_consensus(
        &self,
        genesis: &GenesisConfig,
        network: &NetworkConfig,
    ) -> Result<ConsensusHandle, EngineError>;

    async fn light_consensus(
        &self,
        genesis: &GenesisConfig,
        network: &NetworkConfig,
    ) -> Result<ConsensusHandle, EngineError>;

    async fn nano_consensus(
        &self,
        genesis: &GenesisConfig,
        network: &NetworkConfig,
    ) -> Result<ConsensusHandle, EngineError>;

    /// Open the process-local wallet store, creating it if missing
    async fn open_wallet_store(&self) -> Result<Arc<dyn WalletStore>, EngineError>;
}
