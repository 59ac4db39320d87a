//! Subscriber wire format
//!
//! Every frame is a JSON text message tagged by `event`, carrying its payload
//! under `data`:
//!
//! ```text
//! client → {"event":"subscribe","data":"NQ07..."}
//! server → {"event":"tx","data":{"txid":"ab12...","value":123,"recipient":"NQ07 ..."}}
//! ```

use crate::engine::Transaction;
use crate::error::RelayError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Serialized outbound frame, shared by every recipient of a publish
pub type Frame = Arc<str>;

/// Relayed transaction, addressed to the `recipient` topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionNotification {
    /// Content hash, lowercase hex
    pub txid: String,
    /// Amount in lunas
    pub value: u64,
    /// User-facing recipient address, spaces included
    pub recipient: String,
}

impl TransactionNotification {
    pub fn from_transaction(tx: &Transaction) -> Self {
        Self {
            txid: tx.hash().to_hex(),
            value: tx.value,
            recipient: tx.recipient.to_user_friendly(),
        }
    }
}

/// Frames sent by subscribers
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ClientMessage {
    Subscribe(String),
    Unsubscribe(String),
}

/// Frames sent to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ServerMessage {
    Tx(TransactionNotification),
    Subscribed(String),
    Unsubscribed(String),
    Error(String),
}

impl ServerMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Tx(_) => "tx",
            Self::Subscribed(_) => "subscribed",
            Self::Unsubscribed(_) => "unsubscribed",
            Self::Error(_) => "error",
        }
    }

    /// Serialize once so a publish can share the frame across recipients
    pub fn to_frame(&self) -> Result<Frame, RelayError> {
        serde_json::to_string(self)
            .map(Frame::from)
            .map_err(|source| RelayError::SerializationFailed {
                event: self.event_name(),
                source,
            })
    }
}
