//! In-process chain engine
//!
//! Keeps a single chain in memory and exposes control methods to feed it
//! blocks, toggle consensus establishment and simulate peer churn. Every
//! consensus constructor hands out views onto the same `MemoryChain`.

use crate::engine::types::{
    Address, Block, BlockBody, BlockHeader, GenesisConfig, Hash, NodeIdentity, PeerAddress,
    PeerEvent, PeerInfo, Transaction, Wallet,
};
use crate::engine::{
    Blockchain, ChainEngine, Consensus, ConsensusHandle, ConsensusStrategy, Mempool, Network,
    NetworkConfig, WalletStore,
};
use crate::error::EngineError;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Capacity of each engine event stream
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Milliseconds between consecutive block timestamps
const BLOCK_INTERVAL_MS: u64 = 60_000;

/// Tunable parameters and their defaults
const TUNABLES: &[(&str, u64)] = &[
    ("block_time", 60),
    ("peer_count_max", 4000),
    ("time_offset_max", 15 * 60 * 1000),
    ("sync_throttle", 1500),
    ("transactions_per_sender_max", 500),
];

fn seeds(addresses: &[&str]) -> Vec<PeerAddress> {
    addresses.iter().map(|a| PeerAddress::new(*a)).collect()
}

fn genesis_table(network: &str) -> Option<GenesisConfig> {
    let (network_id, seed_peers) = match network {
        "main" => (
            42,
            seeds(&[
                "wss://seed-1.nimiq.com:8443",
                "wss://seed-2.nimiq.com:8443",
                "wss://seed-3.nimiq.com:8443",
                "wss://seed-4.nimiq.com:8443",
            ]),
        ),
        "test" => (
            1,
            seeds(&[
                "wss://seed-1.nimiq-testnet.com:8080",
                "wss://seed-2.nimiq-testnet.com:8080",
            ]),
        ),
        "dev" => (2, seeds(&["wss://dev.nimiq-network.com:8080"])),
        "bounty" => (3, seeds(&["wss://bounty.nimiq-network.com:8080"])),
        _ => return None,
    };

    Some(GenesisConfig {
        network: network.to_string(),
        network_id,
        seed_peers,
    })
}

/// In-memory chain engine
#[derive(Clone)]
pub struct MemoryEngine {
    chain: Arc<MemoryChain>,
    wallets: Arc<MemoryWalletStore>,
    constants: Arc<DashMap<String, u64>>,
    constructions: Arc<AtomicUsize>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        let constants = TUNABLES
            .iter()
            .map(|(key, value)| (key.to_string(), *value))
            .collect();

        Self {
            chain: Arc::new(MemoryChain::new()),
            wallets: Arc::new(MemoryWalletStore::default()),
            constants: Arc::new(constants),
            constructions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Control surface of the chain behind every consensus handle
    pub fn chain(&self) -> Arc<MemoryChain> {
        Arc::clone(&self.chain)
    }

    /// Number of consensus constructions performed so far
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    pub fn constant(&self, key: &str) -> Option<u64> {
        self.constants.get(key).map(|v| *v)
    }

    fn construct(
        &self,
        strategy: ConsensusStrategy,
        genesis: &GenesisConfig,
        network: &NetworkConfig,
    ) -> ConsensusHandle {
        self.constructions.fetch_add(1, Ordering::SeqCst);
        self.chain.initialize(strategy, genesis, network);

        debug!(strategy = %strategy, network = %genesis.network, "Consensus constructed");

        ConsensusHandle {
            consensus: self.chain.clone(),
            blockchain: self.chain.clone(),
            mempool: self.chain.clone(),
            network: self.chain.clone(),
        }
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainEngine for MemoryEngine {
    fn genesis(&self, network: &str) -> Option<GenesisConfig> {
        genesis_table(network)
    }

    fn set_constant(&self, key: &str, value: u64) -> Result<(), EngineError> {
        match self.constants.get_mut(key) {
            Some(mut slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(EngineError::UnknownConstant(key.to_string())),
        }
    }

    async fn full_consensus(
        &self,
        genesis: &GenesisConfig,
        network: &NetworkConfig,
    ) -> Result<ConsensusHandle, EngineError> {
        Ok(self.construct(ConsensusStrategy::Full, genesis, network))
    }

    async fn light_consensus(
        &self,
        genesis: &GenesisConfig,
        network: &NetworkConfig,
    ) -> Result<ConsensusHandle, EngineError> {
        Ok(self.construct(ConsensusStrategy::Light, genesis, network))
    }

    async fn nano_consensus(
        &self,
        genesis: &GenesisConfig,
        network: &NetworkConfig,
    ) -> Result<ConsensusHandle, EngineError> {
        Ok(self.construct(ConsensusStrategy::Nano, genesis, network))
    }

    async fn open_wallet_store(&self) -> Result<Arc<dyn WalletStore>, EngineError> {
        self.wallets.ensure_default();
        let store: Arc<dyn WalletStore> = self.wallets.clone();
        Ok(store)
    }
}

#[derive(Debug, Clone, Copy)]
struct Head {
    hash: Hash,
    height: u32,
    timestamp: u64,
}

/// Single in-memory chain shared by all handles
pub struct MemoryChain {
    strategy: RwLock<ConsensusStrategy>,
    identity: RwLock<NodeIdentity>,
    blocks: DashMap<Hash, Block>,
    head: RwLock<Head>,
    total_work: AtomicU64,
    established: AtomicBool,
    connected: AtomicBool,
    inbound_allowed: AtomicBool,
    peers: DashMap<PeerAddress, PeerInfo>,
    balances: DashMap<Address, u64>,
    pending: AtomicUsize,
    head_tx: broadcast::Sender<Hash>,
    established_tx: broadcast::Sender<()>,
    peers_tx: broadcast::Sender<PeerEvent>,
}

impl MemoryChain {
    fn new() -> Self {
        let (head_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (established_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (peers_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let chain = Self {
            strategy: RwLock::new(ConsensusStrategy::Nano),
            identity: RwLock::new(generate_identity(&NetworkConfig::Dumb)),
            blocks: DashMap::new(),
            head: RwLock::new(Head {
                hash: Hash::new([0u8; 32]),
                height: 0,
                timestamp: 0,
            }),
            total_work: AtomicU64::new(0),
            established: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            inbound_allowed: AtomicBool::new(false),
            peers: DashMap::new(),
            balances: DashMap::new(),
            pending: AtomicUsize::new(0),
            head_tx,
            established_tx,
            peers_tx,
        };
        chain.push_block(Vec::new());
        chain
    }

    fn initialize(&self, strategy: ConsensusStrategy, genesis: &GenesisConfig, network: &NetworkConfig) {
        *self.strategy.write() = strategy;
        *self.identity.write() = generate_identity(network);
        debug!(network_id = genesis.network_id, "Genesis loaded");
    }

    pub fn strategy(&self) -> ConsensusStrategy {
        *self.strategy.read()
    }

    /// Append a block carrying `transactions` on top of the current head
    pub fn push_block(&self, transactions: Vec<Transaction>) -> Block {
        let body = BlockBody { transactions };
        let block = {
            let mut head = self.head.write();
            let header = BlockHeader {
                prev_hash: head.hash,
                height: head.height + 1,
                timestamp: head.timestamp + BLOCK_INTERVAL_MS,
                body_hash: body.hash(),
            };
            let block = Block {
                header,
                body: Some(body),
            };
            *head = Head {
                hash: block.hash(),
                height: block.height(),
                timestamp: block.header.timestamp,
            };
            self.blocks.insert(block.hash(), block.clone());
            block
        };

        self.total_work.fetch_add(1, Ordering::SeqCst);
        let _ = self.head_tx.send(block.hash());
        block
    }

    /// Drop a stored block, as a reorg would
    pub fn forget_block(&self, hash: &Hash) -> bool {
        self.blocks.remove(hash).is_some()
    }

    pub fn set_established(&self, established: bool) {
        let was = self.established.swap(established, Ordering::SeqCst);
        if established && !was {
            let _ = self.established_tx.send(());
        }
    }

    pub fn peer_joined(&self, peer: PeerInfo) {
        self.peers.insert(peer.address.clone(), peer.clone());
        let _ = self.peers_tx.send(PeerEvent::Joined(peer));
    }

    pub fn peer_left(&self, address: &PeerAddress) {
        if let Some((_, peer)) = self.peers.remove(address) {
            let _ = self.peers_tx.send(PeerEvent::Left(peer));
        }
    }

    pub fn set_balance(&self, address: Address, lunas: u64) {
        self.balances.insert(address, lunas);
    }

    pub fn set_pending_transactions(&self, count: usize) {
        self.pending.store(count, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn allows_inbound(&self) -> bool {
        self.inbound_allowed.load(Ordering::SeqCst)
    }
}

fn generate_identity(network: &NetworkConfig) -> NodeIdentity {
    let public_key = *Hash::digest(Uuid::new_v4().as_bytes()).as_bytes();
    let peer_address = match network {
        NetworkConfig::Wss { host, port, .. } => format!("wss://{host}:{port}"),
        NetworkConfig::Ws { host, port, .. } => format!("ws://{host}:{port}"),
        NetworkConfig::Dumb => format!("dumb://{}", hex::encode(&public_key[..8])),
    };

    NodeIdentity {
        peer_address: PeerAddress::new(peer_address),
        public_key,
    }
}

#[async_trait]
impl Consensus for MemoryChain {
    fn is_established(&self) -> bool {
        self.established.load(Ordering::SeqCst)
    }

    fn subscribe_established(&self) -> broadcast::Receiver<()> {
        self.established_tx.subscribe()
    }

    async fn head_hash(&self) -> Result<Hash, EngineError> {
        Ok(self.head.read().hash)
    }
}

#[async_trait]
impl Blockchain for MemoryChain {
    fn height(&self) -> u32 {
        self.head.read().height
    }

    fn head_hash(&self) -> Hash {
        self.head.read().hash
    }

    fn total_work(&self) -> u128 {
        u128::from(self.total_work.load(Ordering::SeqCst))
    }

    fn subscribe_head_changed(&self) -> broadcast::Receiver<Hash> {
        self.head_tx.subscribe()
    }

    async fn block_by_hash(&self, hash: &Hash, include_body: bool) -> Result<Option<Block>, EngineError> {
        Ok(self.blocks.get(hash).map(|block| {
            if include_body {
                block.clone()
            } else {
                block.without_body()
            }
        }))
    }

    async fn account_balance(&self, address: &Address) -> Result<u64, EngineError> {
        let strategy = self.strategy();
        if strategy == ConsensusStrategy::Nano {
            return Err(EngineError::Unsupported {
                operation: "account_balance",
                strategy: strategy.as_str(),
            });
        }
        Ok(self.balances.get(address).map(|b| *b).unwrap_or(0))
    }
}

impl Mempool for MemoryChain {
    fn transaction_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

impl Network for MemoryChain {
    fn identity(&self) -> NodeIdentity {
        self.identity.read().clone()
    }

    fn connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    fn set_allow_inbound_connections(&self, allow: bool) {
        self.inbound_allowed.store(allow, Ordering::SeqCst);
    }

    fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn subscribe_peers(&self) -> broadcast::Receiver<PeerEvent> {
        self.peers_tx.subscribe()
    }
}

/// Wallet store holding a single generated default wallet
#[derive(Default)]
pub struct MemoryWalletStore {
    wallets: RwLock<Vec<Wallet>>,
}

impl MemoryWalletStore {
    fn ensure_default(&self) {
        let mut wallets = self.wallets.write();
        if wallets.is_empty() {
            wallets.push(Wallet {
                address: Address::derive(Uuid::new_v4().as_bytes()),
            });
        }
    }
}

#[async_trait]
impl WalletStore for MemoryWalletStore {
    async fn default_wallet(&self) -> Result<Wallet, EngineError> {
        self.wallets
            .read()
            .first()
            .cloned()
            .ok_or_else(|| EngineError::NotFound {
                what: "default wallet".to_string(),
            })
    }

    async fn list(&self) -> Result<Vec<Address>, EngineError> {
        Ok(self.wallets.read().iter().map(|w| w.address).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_networks_resolve() {
        let engine = MemoryEngine::new();
        for network in ["main", "test", "dev", "bounty"] {
            assert!(engine.genesis(network).is_some(), "{network} should resolve");
        }
        assert!(engine.genesis("nonexistent").is_none());
    }

    #[test]
    fn unknown_constant_is_rejected() {
        let engine = MemoryEngine::new();
        assert!(engine.set_constant("block_time", 30).is_ok());
        assert_eq!(engine.constant("block_time"), Some(30));
        assert!(matches!(
            engine.set_constant("no_such_constant", 1),
            Err(EngineError::UnknownConstant(_))
        ));
    }

    #[tokio::test]
    async fn push_block_advances_head_and_notifies() {
        let engine = MemoryEngine::new();
        let chain = engine.chain();
        let mut heads = chain.subscribe_head_changed();

        let start = chain.height();
        let block = chain.push_block(vec![Transaction::basic(
            Address::derive(b"s"),
            Address::derive(b"r"),
            5,
            start,
        )]);

        assert_eq!(chain.height(), start + 1);
        assert_eq!(Blockchain::head_hash(chain.as_ref()), block.hash());
        assert_eq!(heads.recv().await.unwrap(), block.hash());

        let fetched = chain.block_by_hash(&block.hash(), false).await.unwrap().unwrap();
        assert!(fetched.body.is_none());
    }

    #[tokio::test]
    async fn nano_chain_cannot_resolve_balances() {
        let engine = MemoryEngine::new();
        let genesis = engine.genesis("dev").unwrap();
        let handle = engine.nano_consensus(&genesis, &NetworkConfig::Dumb).await.unwrap();

        let err = handle
            .blockchain
            .account_balance(&Address::derive(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn wallet_store_is_open_or_create() {
        let engine = MemoryEngine::new();
        let first = engine.open_wallet_store().await.unwrap();
        let second = engine.open_wallet_store().await.unwrap();
        assert_eq!(
            first.default_wallet().await.unwrap(),
            second.default_wallet().await.unwrap()
        );
        assert_eq!(second.list().await.unwrap().len(), 1);
    }
}
