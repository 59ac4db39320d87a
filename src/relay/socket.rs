//! Subscriber WebSocket transport
//!
//! One task per socket: the receive loop applies subscribe/unsubscribe
//! requests to the gateway while a writer task drains the connection's
//! outbound queue. When either side ends, the connection is removed from
//! every topic.

use crate::relay::gateway::SubscriptionGateway;
use crate::relay::messages::{ClientMessage, ServerMessage};
use crate::relay::registry::{ConnectionId, Topic};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// Largest inbound frame accepted from a subscriber
pub const MAX_CLIENT_FRAME: usize = 4 * 1024;

/// `GET /ws` upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(gateway): State<Arc<SubscriptionGateway>>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_CLIENT_FRAME)
        .on_upgrade(move |socket| handle_socket(socket, gateway))
}

async fn handle_socket(socket: WebSocket, gateway: Arc<SubscriptionGateway>) {
    let outbound = gateway.connect();
    let connection_id = outbound.connection_id;
    let mut frames = outbound.frames;
    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if let Err(e) = sink.send(Message::Text(frame.as_ref().into())).await {
                debug!(connection_id = %connection_id, error = %e, "Send failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            next = stream.next() => match next {
                Some(Ok(Message::Text(text))) => {
                    handle_text(&gateway, connection_id, text.as_str());
                }
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => handle_text(&gateway, connection_id, text),
                    Err(_) => reject(&gateway, connection_id, "binary frames must be UTF-8 JSON"),
                },
                Some(Ok(Message::Close(_))) | None => break,
                // axum answers pings itself
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    warn!(connection_id = %connection_id, error = %e, "WebSocket error");
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    gateway.disconnect(connection_id);
    writer.abort();
}

/// Apply one client frame to the gateway and acknowledge it
pub fn handle_text(gateway: &SubscriptionGateway, connection: ConnectionId, text: &str) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(connection_id = %connection, error = %e, "Malformed client frame");
            reject(gateway, connection, &format!("invalid message: {e}"));
            return;
        }
    };

    match message {
        ClientMessage::Subscribe(raw) => match Topic::parse(&raw) {
            Some(topic) => {
                gateway.subscribe(connection, &topic);
                gateway.send_to(connection, &ServerMessage::Subscribed(topic.to_string()));
            }
            None => reject(gateway, connection, "topic must not be empty"),
        },
        ClientMessage::Unsubscribe(raw) => match Topic::parse(&raw) {
            Some(topic) => {
                gateway.unsubscribe(connection, &topic);
                gateway.send_to(connection, &ServerMessage::Unsubscribed(topic.to_string()));
            }
            None => reject(gateway, connection, "topic must not be empty"),
        },
    }
}

fn reject(gateway: &SubscriptionGateway, connection: ConnectionId, reason: &str) {
    gateway.send_to(connection, &ServerMessage::Error(reason.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(frame: &str) -> (String, serde_json::Value) {
        let value: serde_json::Value = serde_json::from_str(frame).unwrap();
        (value["event"].as_str().unwrap().to_string(), value["data"].clone())
    }

    #[test]
    fn subscribe_is_acknowledged_with_normalized_topic() {
        let gateway = SubscriptionGateway::new(8);
        let mut conn = gateway.connect();

        handle_text(&gateway, conn.connection_id, r#"{"event":"subscribe","data":"NQ07 0000"}"#);

        let topic = Topic::parse("NQ070000").unwrap();
        assert!(gateway.registry().is_member(conn.connection_id, &topic));
        let (name, data) = event(&conn.frames.try_recv().unwrap());
        assert_eq!(name, "subscribed");
        assert_eq!(data, "NQ070000");
    }

    #[test]
    fn unsubscribe_is_acknowledged() {
        let gateway = SubscriptionGateway::new(8);
        let mut conn = gateway.connect();

        handle_text(&gateway, conn.connection_id, r#"{"event":"subscribe","data":"A"}"#);
        handle_text(&gateway, conn.connection_id, r#"{"event":"unsubscribe","data":"A"}"#);

        let topic = Topic::parse("A").unwrap();
        assert!(!gateway.registry().is_member(conn.connection_id, &topic));
        assert_eq!(event(&conn.frames.try_recv().unwrap()).0, "subscribed");
        assert_eq!(event(&conn.frames.try_recv().unwrap()).0, "unsubscribed");
    }

    #[test]
    fn malformed_frames_get_an_error_frame() {
        let gateway = SubscriptionGateway::new(8);
        let mut conn = gateway.connect();

        handle_text(&gateway, conn.connection_id, "not json");
        handle_text(&gateway, conn.connection_id, r#"{"event":"subscribe","data":"  "}"#);

        assert_eq!(event(&conn.frames.try_recv().unwrap()).0, "error");
        let (name, data) = event(&conn.frames.try_recv().unwrap());
        assert_eq!(name, "error");
        assert_eq!(data, "topic must not be empty");
        assert_eq!(gateway.registry().topic_count(), 0);
    }
}
