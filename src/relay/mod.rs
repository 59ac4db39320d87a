//! Topic relay: registry, wire messages, fan-out gateway and the subscriber socket

pub mod gateway;
pub mod messages;
pub mod registry;
pub mod socket;

pub use gateway::{Delivery, Outbound, SubscriptionGateway};
pub use messages::{ClientMessage, Frame, ServerMessage, TransactionNotification};
pub use registry::{ConnectionId, Topic, TopicRegistry};
