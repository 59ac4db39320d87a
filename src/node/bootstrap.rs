//! Validation gate and construction sequence

use crate::config::{NodeSettings, NodeType, TransportProtocol};
use crate::engine::types::lunas_to_coins;
use crate::engine::{ChainEngine, ConsensusStrategy, GenesisConfig, NetworkConfig};
use crate::error::RelayError;
use crate::node::NodeContext;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{error, info, warn};

/// Node configuration that passed the validation gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub genesis: GenesisConfig,
    pub network: NetworkConfig,
    pub node_type: NodeType,
    pub strategy: ConsensusStrategy,
    pub passive: bool,
    pub constant_overrides: BTreeMap<String, u64>,
}

/// Run the validation gate. Nothing is constructed here.
pub fn validate<E>(engine: &E, settings: &NodeSettings) -> Result<NodeConfig, RelayError>
where
    E: ChainEngine + ?Sized,
{
    let mut protocol = settings.protocol;
    if settings.dumb {
        warn!("The 'dumb' flag is deprecated, use 'protocol=dumb' instead");
        protocol = TransportProtocol::Dumb;
    }

    let genesis = engine
        .genesis(&settings.network)
        .ok_or_else(|| RelayError::InvalidNetwork {
            network: settings.network.clone(),
        })?;

    if let (Some(host), TransportProtocol::Dumb) = (&settings.host, protocol) {
        return Err(RelayError::ConflictingTransportConfig { host: host.clone() });
    }

    let strategy = match settings.node_type {
        NodeType::Full => ConsensusStrategy::Full,
        NodeType::Nano => ConsensusStrategy::Nano,
        NodeType::Light => {
            return Err(RelayError::UnsupportedNodeType {
                node_type: NodeType::Light.to_string(),
            })
        }
    };

    let network = select_transport(protocol, settings)?;

    Ok(NodeConfig {
        genesis,
        network,
        node_type: settings.node_type,
        strategy,
        passive: settings.passive,
        constant_overrides: settings.constant_overrides.clone(),
    })
}

fn select_transport(
    protocol: TransportProtocol,
    settings: &NodeSettings,
) -> Result<NetworkConfig, RelayError> {
    let required = |value: Option<String>, field: &'static str| {
        value.ok_or(RelayError::MissingTransportField {
            protocol: protocol.as_str(),
            field,
        })
    };
    let port = || {
        settings.port.ok_or(RelayError::MissingTransportField {
            protocol: protocol.as_str(),
            field: "node_port",
        })
    };

    match protocol {
        TransportProtocol::Dumb => Ok(NetworkConfig::Dumb),
        TransportProtocol::Ws => Ok(NetworkConfig::Ws {
            host: required(settings.host.clone(), "host")?,
            port: port()?,
            reverse_proxy: settings.reverse_proxy,
        }),
        TransportProtocol::Wss => Ok(NetworkConfig::Wss {
            host: required(settings.host.clone(), "host")?,
            port: port()?,
            tls_key: required(settings.tls_key.clone(), "tls_key")?,
            tls_cert: required(settings.tls_cert.clone(), "tls_cert")?,
            reverse_proxy: settings.reverse_proxy,
        }),
    }
}

/// Validate `settings` and bring up the node
pub async fn bootstrap<E>(engine: &E, settings: &NodeSettings) -> Result<NodeContext, RelayError>
where
    E: ChainEngine + ?Sized,
{
    let started_at = Instant::now();

    let config = match validate(engine, settings) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Configuration rejected");
            return Err(e);
        }
    };

    info!(
        network = %config.genesis.network,
        protocol = config.network.protocol(),
        node_type = %config.node_type,
        passive = config.passive,
        "Configuration validated"
    );

    match &config.network {
        NetworkConfig::Dumb => {
            error!("You are running in 'dumb' configuration, so others can't connect to you");
            error!("Consider switching to a proper WebSocket/WebSocketSecure configuration");
            info!(network = %config.genesis.network, "Node starting (dumb)");
        }
        NetworkConfig::Ws { host, port, .. } | NetworkConfig::Wss { host, port, .. } => {
            info!(network = %config.genesis.network, host = %host, port = *port, "Node starting");
        }
    }

    for (key, value) in &config.constant_overrides {
        engine
            .set_constant(key, *value)
            .map_err(RelayError::engine("constant override"))?;
        info!(key = %key, value = *value, "Constant override applied");
    }

    let handle = match config.strategy {
        ConsensusStrategy::Full => engine.full_consensus(&config.genesis, &config.network).await,
        ConsensusStrategy::Light => engine.light_consensus(&config.genesis, &config.network).await,
        ConsensusStrategy::Nano => engine.nano_consensus(&config.genesis, &config.network).await,
    }
    .map_err(RelayError::engine("consensus construction"))?;

    let identity = handle.network.identity();
    info!(
        peer_address = %identity.peer_address,
        public_key = %identity.public_key_hex(),
        "Peer identity"
    );

    let wallet_store = engine
        .open_wallet_store()
        .await
        .map_err(RelayError::engine("wallet store open"))?;
    let wallet = wallet_store
        .default_wallet()
        .await
        .map_err(RelayError::engine("default wallet"))?;
    let addresses = wallet_store
        .list()
        .await
        .map_err(RelayError::engine("wallet list"))?;

    let managed: Vec<String> = addresses.iter().map(|a| a.to_user_friendly()).collect();
    info!(wallets = ?managed, "Managing wallets");

    // Nano nodes hold headers only and cannot resolve account state.
    if config.node_type.is_nano() {
        info!(address = %wallet.address, "Wallet initialized");
    } else {
        let balance = handle
            .blockchain
            .account_balance(&wallet.address)
            .await
            .map_err(RelayError::engine("wallet balance"))?;
        info!(
            address = %wallet.address,
            balance_nim = lunas_to_coins(balance),
            "Wallet initialized"
        );
    }

    info!(
        height = handle.blockchain.height(),
        head_hash = %handle.blockchain.head_hash(),
        "Blockchain state"
    );

    Ok(NodeContext {
        genesis: config.genesis,
        node_type: config.node_type,
        network_config: config.network,
        consensus: handle.consensus,
        blockchain: handle.blockchain,
        mempool: handle.mempool,
        network: handle.network,
        wallet_store,
        wallet,
        passive: config.passive,
        started_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;

    fn settings() -> NodeSettings {
        NodeSettings {
            network: "dev".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn unknown_network_constructs_nothing() {
        let engine = MemoryEngine::new();
        let settings = NodeSettings {
            network: "nonexistent".to_string(),
            ..settings()
        };

        let err = bootstrap(&engine, &settings).await.err().unwrap();
        assert!(matches!(err, RelayError::InvalidNetwork { ref network } if network == "nonexistent"));
        assert_eq!(engine.constructions(), 0);
    }

    #[tokio::test]
    async fn host_with_dumb_transport_is_rejected_before_construction() {
        let engine = MemoryEngine::new();
        let settings = NodeSettings {
            host: Some("node.example".to_string()),
            protocol: TransportProtocol::Dumb,
            ..settings()
        };

        let err = bootstrap(&engine, &settings).await.err().unwrap();
        assert!(matches!(err, RelayError::ConflictingTransportConfig { .. }));
        assert_eq!(engine.constructions(), 0);
    }

    #[test]
    fn deprecated_dumb_flag_selects_dumb_transport() {
        let engine = MemoryEngine::new();
        let settings = NodeSettings {
            protocol: TransportProtocol::Ws,
            dumb: true,
            ..settings()
        };
        let config = validate(&engine, &settings).unwrap();
        assert_eq!(config.network, NetworkConfig::Dumb);

        // The alias also trips the host conflict check
        let settings = NodeSettings {
            host: Some("node.example".to_string()),
            ..settings
        };
        assert!(matches!(
            validate(&engine, &settings),
            Err(RelayError::ConflictingTransportConfig { .. })
        ));
    }

    #[test]
    fn light_node_type_is_disabled() {
        let engine = MemoryEngine::new();
        let settings = NodeSettings {
            node_type: NodeType::Light,
            ..settings()
        };
        assert!(matches!(
            validate(&engine, &settings),
            Err(RelayError::UnsupportedNodeType { .. })
        ));
    }

    #[test]
    fn network_is_checked_before_transport() {
        let engine = MemoryEngine::new();
        let settings = NodeSettings {
            network: "nonexistent".to_string(),
            host: Some("node.example".to_string()),
            node_type: NodeType::Light,
            ..settings()
        };
        assert!(matches!(
            validate(&engine, &settings),
            Err(RelayError::InvalidNetwork { .. })
        ));
    }

    #[test]
    fn websocket_transports_require_their_fields() {
        let engine = MemoryEngine::new();

        let ws = NodeSettings {
            protocol: TransportProtocol::Ws,
            host: Some("node.example".to_string()),
            ..settings()
        };
        assert!(matches!(
            validate(&engine, &ws),
            Err(RelayError::MissingTransportField { field: "node_port", .. })
        ));

        let wss = NodeSettings {
            protocol: TransportProtocol::Wss,
            port: Some(8443),
            tls_key: Some("key.pem".to_string()),
            ..ws
        };
        assert!(matches!(
            validate(&engine, &wss),
            Err(RelayError::MissingTransportField { field: "tls_cert", .. })
        ));

        let wss = NodeSettings {
            tls_cert: Some("cert.pem".to_string()),
            reverse_proxy: true,
            ..wss
        };
        let config = validate(&engine, &wss).unwrap();
        assert_eq!(
            config.network,
            NetworkConfig::Wss {
                host: "node.example".to_string(),
                port: 8443,
                tls_key: "key.pem".to_string(),
                tls_cert: "cert.pem".to_string(),
                reverse_proxy: true,
            }
        );
    }

    #[tokio::test]
    async fn full_node_resolves_wallet_balance() {
        let engine = MemoryEngine::new();
        let settings = NodeSettings {
            node_type: NodeType::Full,
            ..settings()
        };

        let node = bootstrap(&engine, &settings).await.unwrap();
        assert_eq!(engine.constructions(), 1);
        assert_eq!(engine.chain().strategy(), ConsensusStrategy::Full);
        assert_eq!(node.node_type, NodeType::Full);
        assert!(node.blockchain.account_balance(&node.wallet.address).await.is_ok());
    }

    #[tokio::test]
    async fn nano_node_skips_balance_lookup() {
        let engine = MemoryEngine::new();
        let node = bootstrap(&engine, &settings()).await.unwrap();

        assert_eq!(engine.chain().strategy(), ConsensusStrategy::Nano);
        assert_eq!(node.wallet_store.list().await.unwrap(), vec![node.wallet.address]);
    }

    #[tokio::test]
    async fn constant_overrides_are_applied() {
        let engine = MemoryEngine::new();
        let mut overrides = BTreeMap::new();
        overrides.insert("block_time".to_string(), 30);
        let settings = NodeSettings {
            constant_overrides: overrides,
            ..settings()
        };

        bootstrap(&engine, &settings).await.unwrap();
        assert_eq!(engine.constant("block_time"), Some(30));
    }

    #[tokio::test]
    async fn unknown_constant_aborts_before_construction() {
        let engine = MemoryEngine::new();
        let mut overrides = BTreeMap::new();
        overrides.insert("no_such_constant".to_string(), 1);
        let settings = NodeSettings {
            constant_overrides: overrides,
            ..settings()
        };

        let err = bootstrap(&engine, &settings).await.err().unwrap();
        assert!(matches!(err, RelayError::Engine { stage: "constant override", .. }));
        assert_eq!(engine.constructions(), 0);
    }

    #[tokio::test]
    async fn networking_starts_outbound_unless_passive() {
        let engine = MemoryEngine::new();
        let node = bootstrap(&engine, &settings()).await.unwrap();
        node.start_networking();
        assert!(engine.chain().is_connected());
        assert!(!engine.chain().allows_inbound());

        let engine = MemoryEngine::new();
        let settings = NodeSettings {
            passive: true,
            ..settings()
        };
        let node = bootstrap(&engine, &settings).await.unwrap();
        node.start_networking();
        assert!(!engine.chain().is_connected());
        assert!(engine.chain().allows_inbound());
    }
}
