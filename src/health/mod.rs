//! HTTP surface: subscriber WebSocket plus health endpoints

use crate::metrics::RelayMetrics;
use crate::node::NodeContext;
use crate::relay::{socket, SubscriptionGateway};
use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub network: String,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub node_type: &'static str,
    pub height: u32,
    pub head_hash: String,
    pub peers: usize,
    pub connections: usize,
    pub topics: usize,
}

/// Application state shared by all routes
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<SubscriptionGateway>,
    pub node: NodeContext,
    pub metrics: Option<RelayMetrics>,
}

impl FromRef<AppState> for Arc<SubscriptionGateway> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.gateway)
    }
}

/// Create the relay router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(socket::ws_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Health endpoint - always returns 200 if process is running
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        network: state.node.genesis.network.clone(),
    })
}

/// Readiness endpoint - returns 200 once consensus is established
async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.node.consensus.is_established();
    let response = ReadyResponse {
        ready,
        node_type: state.node.node_type.as_str(),
        height: state.node.blockchain.height(),
        head_hash: state.node.blockchain.head_hash().to_hex(),
        peers: state.node.network.peer_count(),
        connections: state.gateway.connection_count(),
        topics: state.gateway.registry().topic_count(),
    };

    if ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Metrics endpoint - returns Prometheus format metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.metrics.as_ref().map(RelayMetrics::render).unwrap_or_default();
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
}
