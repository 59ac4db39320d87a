//! Chain-to-topic event bridge
//!
//! Each head change fetches the new head block with its body and publishes
//! every contained transaction to the topic named after its recipient.
//! Triggers are handled in their own tasks and never block the engine's
//! event stream. Delivery is best-effort: a failed fetch skips the block.

use crate::engine::Hash;
use crate::error::RelayError;
use crate::metrics;
use crate::node::NodeContext;
use crate::relay::{ServerMessage, SubscriptionGateway, Topic, TransactionNotification};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

pub struct EventBridge {
    node: NodeContext,
    gateway: Arc<SubscriptionGateway>,
}

impl EventBridge {
    pub fn new(node: NodeContext, gateway: Arc<SubscriptionGateway>) -> Self {
        Self { node, gateway }
    }

    /// Relay the transactions of the current head block.
    ///
    /// Returns the number of transactions published. Nothing is fetched
    /// while consensus is not established.
    pub async fn on_head_changed(&self) -> Result<usize, RelayError> {
        if !self.node.consensus.is_established() {
            metrics::record_head_changed("not_established");
            return Ok(0);
        }

        let started = Instant::now();

        let head = self
            .node
            .consensus
            .head_hash()
            .await
            .map_err(RelayError::engine("head hash"))?;

        let block = self
            .node
            .blockchain
            .block_by_hash(&head, true)
            .await
            .map_err(RelayError::engine("block fetch"))?
            .ok_or_else(|| RelayError::BlockNotFound {
                hash: head.to_hex(),
            })?;

        let body = block.body.as_ref().ok_or_else(|| RelayError::MissingBlockBody {
            hash: head.to_hex(),
        })?;

        for tx in &body.transactions {
            let notification = TransactionNotification::from_transaction(tx);
            let topic = Topic::from_address(&notification.recipient);
            let txid = notification.txid.clone();
            let delivery = self.gateway.publish(&topic, &ServerMessage::Tx(notification));

            debug!(
                topic = %topic,
                txid = %txid,
                members = delivery.members,
                delivered = delivery.delivered,
                dropped = delivery.dropped,
                "Transaction published"
            );
        }

        let count = body.transactions.len();
        metrics::record_head_changed("relayed");
        metrics::record_relayed(count, started.elapsed());
        metrics::set_chain_height(block.height());

        debug!(
            height = block.height(),
            head_hash = %head,
            transactions = count,
            "Head block relayed"
        );

        Ok(count)
    }

    async fn handle_trigger(&self, trigger: Option<Hash>) {
        if let Err(e) = self.on_head_changed().await {
            metrics::record_head_changed("failed");
            metrics::record_error(e.error_type_label());
            warn!(
                trigger = ?trigger.map(|h| h.to_hex()),
                error = %e,
                "Head block skipped"
            );
        }
    }

    /// Consume head-changed notifications until the stream closes or
    /// shutdown is signalled.
    pub async fn run(
        self: Arc<Self>,
        mut head_changed: broadcast::Receiver<Hash>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!("Event bridge started");

        loop {
            tokio::select! {
                received = head_changed.recv() => {
                    let trigger = match received {
                        Ok(hash) => Some(hash),
                        Err(RecvError::Lagged(skipped)) => {
                            // Only the current head matters, so one run covers the gap
                            warn!(skipped, "Head-changed stream lagged");
                            None
                        }
                        Err(RecvError::Closed) => break,
                    };

                    let bridge = Arc::clone(&self);
                    tokio::spawn(async move { bridge.handle_trigger(trigger).await });
                }
                _ = shutdown.recv() => {
                    info!("Event bridge received shutdown signal");
                    break;
                }
            }
        }

        info!("Event bridge stopped");
    }
}
