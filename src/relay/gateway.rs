//! Subscription gateway
//!
//! Owns the topic registry and one bounded outbound queue per connection.
//! Publishing snapshots a topic's members and enqueues the frame with
//! `try_send`, so a publish never suspends and frames for one topic reach a
//! connection in publish order. Frames for connections that are gone or
//! whose queue is full are dropped.

use crate::metrics;
use crate::relay::messages::{Frame, ServerMessage};
use crate::relay::registry::{ConnectionId, Topic, TopicRegistry};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Outcome of a single publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Delivery {
    /// Members at the instant of publish
    pub members: usize,
    pub delivered: usize,
    pub dropped: usize,
}

/// Outbound side of a live connection
pub struct Outbound {
    pub connection_id: ConnectionId,
    pub frames: mpsc::Receiver<Frame>,
}

pub struct SubscriptionGateway {
    registry: TopicRegistry,
    connections: DashMap<ConnectionId, mpsc::Sender<Frame>>,
    queue_capacity: usize,
}

impl SubscriptionGateway {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            registry: TopicRegistry::new(),
            connections: DashMap::new(),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn registry(&self) -> &TopicRegistry {
        &self.registry
    }

    /// Register a new connection and hand back its outbound queue
    pub fn connect(&self) -> Outbound {
        let connection_id = ConnectionId::new();
        let (tx, frames) = mpsc::channel(self.queue_capacity);
        self.connections.insert(connection_id, tx);

        metrics::set_connections(self.connections.len());
        info!(connection_id = %connection_id, "Client connected");

        Outbound {
            connection_id,
            frames,
        }
    }

    /// Join `topic`. Membership is visible to publishes once this returns.
    pub fn subscribe(&self, connection: ConnectionId, topic: &Topic) -> bool {
        let added = self.registry.subscribe(connection, topic);
        if added {
            metrics::record_subscription_change("subscribe");
        }
        info!(connection_id = %connection, topic = %topic, "Subscribed");
        added
    }

    pub fn unsubscribe(&self, connection: ConnectionId, topic: &Topic) -> bool {
        let removed = self.registry.unsubscribe(connection, topic);
        if removed {
            metrics::record_subscription_change("unsubscribe");
        }
        info!(connection_id = %connection, topic = %topic, "Unsubscribed");
        removed
    }

    /// Drop the connection from every topic and close its queue
    pub fn disconnect(&self, connection: ConnectionId) {
        let topics = self.registry.remove_connection(connection);
        self.connections.remove(&connection);

        metrics::set_connections(self.connections.len());
        info!(
            connection_id = %connection,
            topics = topics.len(),
            "Client gone"
        );
    }

    /// Send a frame to one connection only (acks and errors)
    pub fn send_to(&self, connection: ConnectionId, message: &ServerMessage) -> bool {
        let Ok(frame) = message.to_frame() else {
            return false;
        };
        match self.connections.get(&connection) {
            Some(tx) => tx.try_send(frame).is_ok(),
            None => false,
        }
    }

    /// Deliver `message` to every current member of `topic`
    pub fn publish(&self, topic: &Topic, message: &ServerMessage) -> Delivery {
        let members = self.registry.members(topic);
        if members.is_empty() {
            return Delivery::default();
        }

        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                metrics::record_error(e.error_type_label());
                return Delivery {
                    members: members.len(),
                    delivered: 0,
                    dropped: members.len(),
                };
            }
        };

        let mut delivery = Delivery {
            members: members.len(),
            ..Default::default()
        };

        for connection in members {
            let sent = self
                .connections
                .get(&connection)
                .map(|tx| tx.try_send(frame.clone()).is_ok())
                .unwrap_or(false);

            if sent {
                delivery.delivered += 1;
            } else {
                delivery.dropped += 1;
                debug!(connection_id = %connection, topic = %topic, "Frame dropped");
            }
        }

        metrics::record_publish(message.event_name(), delivery.delivered, delivery.dropped);
        delivery
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
