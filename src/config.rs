//! Relay configuration module
//!
//! Settings come from three layers, lowest precedence first:
//! 1. built-in defaults
//! 2. an optional config file named by `RELAY_CONFIG` (TOML/JSON/YAML by extension)
//! 3. process environment, after `.env` has been hydrated
//!
//! The result is deliberately unvalidated: node settings pass through the
//! bootstrap validation gate before anything is constructed.

use crate::error::RelayError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::time::Duration;

/// Node transport protocol as configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    Dumb,
    Ws,
    Wss,
}

impl TransportProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dumb => "dumb",
            Self::Ws => "ws",
            Self::Wss => "wss",
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node type as configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Full,
    Light,
    Nano,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Light => "light",
            Self::Nano => "nano",
        }
    }

    pub fn is_nano(&self) -> bool {
        matches!(self, Self::Nano)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat settings as read from file and environment
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RawSettings {
    /// Subscriber WebSocket / HTTP port
    pub port: u16,
    pub network: String,
    pub protocol: TransportProtocol,
    pub node_type: NodeType,
    /// Node listener host (ws/wss)
    pub host: Option<String>,
    /// Node listener port (ws/wss)
    pub node_port: Option<u16>,
    pub tls_key: Option<String>,
    pub tls_cert: Option<String>,
    pub reverse_proxy: bool,
    pub passive: bool,
    /// Deprecated alias for `protocol = "dumb"`
    pub dumb: bool,
    pub constant_overrides: BTreeMap<String, u64>,
    pub log_level: String,
    /// Outbound frames buffered per subscriber before frames are dropped
    pub queue_capacity: usize,
    pub max_time_offset_secs: u64,
}

impl Default for RawSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            network: "main".to_string(),
            protocol: TransportProtocol::Dumb,
            node_type: NodeType::Nano,
            host: None,
            node_port: None,
            tls_key: None,
            tls_cert: None,
            reverse_proxy: false,
            passive: false,
            dumb: false,
            constant_overrides: BTreeMap::new(),
            log_level: "info".to_string(),
            queue_capacity: 256,
            max_time_offset_secs: 15 * 60,
        }
    }
}

/// Node settings handed to the bootstrap validation gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSettings {
    pub network: String,
    pub protocol: TransportProtocol,
    pub node_type: NodeType,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls_key: Option<String>,
    pub tls_cert: Option<String>,
    pub reverse_proxy: bool,
    pub passive: bool,
    pub dumb: bool,
    pub constant_overrides: BTreeMap<String, u64>,
}

impl Default for NodeSettings {
    fn default() -> Self {
        RawSettings::default().node_settings()
    }
}

/// Subscriber-facing relay settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    pub port: u16,
    pub queue_capacity: usize,
    pub max_time_offset: Duration,
}

/// Complete process configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub node: NodeSettings,
    pub relay: RelaySettings,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl RawSettings {
    fn node_settings(&self) -> NodeSettings {
        NodeSettings {
            network: self.network.clone(),
            protocol: self.protocol,
            node_type: self.node_type,
            host: self.host.clone().filter(|h| !h.trim().is_empty()),
            port: self.node_port,
            tls_key: self.tls_key.clone(),
            tls_cert: self.tls_cert.clone(),
            reverse_proxy: self.reverse_proxy,
            passive: self.passive,
            dumb: self.dumb,
            constant_overrides: self.constant_overrides.clone(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from `.env`, the optional config file and the environment
    pub fn from_env() -> Result<Self, RelayError> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Ok(path) = env::var("RELAY_CONFIG") {
            builder = builder.add_source(config::File::with_name(&path));
        }
        let layered = builder
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .map_err(|e| RelayError::Config(format!("failed to read settings: {e}")))?;

        let raw: RawSettings = layered
            .try_deserialize()
            .map_err(|e| RelayError::Config(format!("invalid settings: {e}")))?;

        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawSettings) -> Result<Self, RelayError> {
        if raw.queue_capacity == 0 {
            return Err(RelayError::Config(
                "QUEUE_CAPACITY must be at least 1".to_string(),
            ));
        }
        if raw.network.trim().is_empty() {
            return Err(RelayError::Config("NETWORK must not be empty".to_string()));
        }

        Ok(Self {
            node: raw.node_settings(),
            relay: RelaySettings {
                port: raw.port,
                queue_capacity: raw.queue_capacity,
                max_time_offset: Duration::from_secs(raw.max_time_offset_secs),
            },
            log_level: raw.log_level,
        })
    }
}
