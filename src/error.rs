//! Domain error types for the transaction relay
//!
//! Two taxonomies live here:
//! - `EngineError`: failures reported by the chain engine behind the
//!   `engine` traits (construction, storage, lookups).
//! - `RelayError`: everything the relay itself can fail with, from the
//!   bootstrap validation gate to transient block fetch failures.
//!
//! main.rs is the ONLY module allowed to use anyhow::Result (process boundary).
//! All application code returns Result<T, RelayError>.

use thiserror::Error;

/// Errors surfaced by a chain engine implementation
#[derive(Error, Debug)]
pub enum EngineError {
    /// Requested object is not known to the engine
    #[error("{what} not found")]
    NotFound { what: String },

    /// Engine resource (storage, genesis, network stack) could not be set up
    #[error("engine resource unavailable: {0}")]
    Unavailable(String),

    /// Operation is not supported by the active consensus strategy
    #[error("operation '{operation}' not supported by {strategy} consensus")]
    Unsupported {
        operation: &'static str,
        strategy: &'static str,
    },

    /// Unknown tunable parameter name
    #[error("unknown constant '{0}'")]
    UnknownConstant(String),
}

impl EngineError {
    pub fn error_type_label(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "engine_not_found",
            Self::Unavailable(_) => "engine_unavailable",
            Self::Unsupported { .. } => "engine_unsupported",
            Self::UnknownConstant(_) => "engine_unknown_constant",
        }
    }
}

/// Relay domain errors
///
/// Bootstrap variants (`InvalidNetwork`, `ConflictingTransportConfig`,
/// `UnsupportedNodeType`, `MissingTransportField`, `Config`) are fatal and
/// terminate the process with exit code 1. Fetch variants are contained to
/// the head-changed trigger that produced them.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Network name does not resolve to a known genesis configuration
    #[error("invalid network name: {network}")]
    InvalidNetwork { network: String },

    /// Host given together with the outbound-only transport
    #[error("cannot use both host={host} and protocol=dumb")]
    ConflictingTransportConfig { host: String },

    /// Node type is disabled
    #[error("{node_type} node type is temporarily disabled")]
    UnsupportedNodeType { node_type: String },

    /// Listening transport is missing a required setting
    #[error("protocol={protocol} requires '{field}' to be set")]
    MissingTransportField {
        protocol: &'static str,
        field: &'static str,
    },

    /// Configuration error (environment variable or config file missing or invalid)
    #[error("configuration error: {0}")]
    Config(String),

    /// Engine failure during bootstrap or while bridging events
    #[error("engine error during {stage}")]
    Engine {
        stage: &'static str,
        #[source]
        source: EngineError,
    },

    /// Head block vanished between the head-changed trigger and the fetch
    #[error("block {hash} not found")]
    BlockNotFound { hash: String },

    /// Block was fetched without its transaction body
    #[error("block {hash} was returned without a body")]
    MissingBlockBody { hash: String },

    /// Outbound frame serialization failed
    #[error("serialization failed for '{event}' frame")]
    SerializationFailed {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Prometheus recorder could not be installed
    #[error("metrics recorder installation failed")]
    MetricsInstall(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Listener bind or serve failure
    #[error("listener on port {port} failed")]
    Listener {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

impl RelayError {
    /// Attach a bootstrap/bridge stage to an engine error
    pub fn engine(stage: &'static str) -> impl FnOnce(EngineError) -> Self {
        move |source| Self::Engine { stage, source }
    }

    /// Returns a static label string suitable for Prometheus metrics.
    pub fn error_type_label(&self) -> &'static str {
        match self {
            Self::InvalidNetwork { .. } => "invalid_network",
            Self::ConflictingTransportConfig { .. } => "conflicting_transport",
            Self::UnsupportedNodeType { .. } => "unsupported_node_type",
            Self::MissingTransportField { .. } => "missing_transport_field",
            Self::Config(_) => "config",
            Self::Engine { .. } => "engine",
            Self::BlockNotFound { .. } => "block_not_found",
            Self::MissingBlockBody { .. } => "missing_block_body",
            Self::SerializationFailed { .. } => "serialization",
            Self::MetricsInstall(_) => "metrics_install",
            Self::Listener { .. } => "listener",
        }
    }

    /// True for errors raised by the startup validation gate
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidNetwork { .. }
                | Self::ConflictingTransportConfig { .. }
                | Self::UnsupportedNodeType { .. }
                | Self::MissingTransportField { .. }
        )
    }
}
