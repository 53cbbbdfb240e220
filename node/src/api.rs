//! # HTTP API
//!
//! Builds the axum router that exposes the relay node's HTTP interface.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path          | Description                      |
//! |--------|---------------|----------------------------------|
//! | GET    | `/health`     | Liveness probe                   |
//! | GET    | `/status`     | Node status summary              |
//! | GET    | `/peers`      | Registered peers                 |
//! | GET    | `/peers/:id`  | One registered peer              |
//! | GET    | `/metrics`    | Prometheus text exposition       |

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use tally_protocol::config::network_name;
use tally_protocol::network::{ChainStatus, PeerRegistry};

use crate::metrics::{self, SharedMetrics};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone. Everything heavy sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Hex id of this node.
    pub node_id: String,
    /// Chain view announced in handshakes.
    pub chain: ChainStatus,
    /// Live peer table.
    pub registry: Arc<PeerRegistry>,
    /// Prometheus metrics.
    pub metrics: SharedMetrics,
    /// When the node started.
    pub started_at: DateTime<Utc>,
}

/// Response body of `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub node_id: String,
    pub network: String,
    pub network_id: u64,
    pub genesis: String,
    pub head_number: u64,
    pub peer_count: usize,
    /// Highest head announced by any registered peer.
    pub best_peer_number: Option<u64>,
    pub uptime_secs: i64,
    pub timestamp: String,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/peers", get(peers_handler))
        .route("/peers/:id", get(peer_handler))
        .route("/metrics", get(metrics_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 while the process is up.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — node status summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let now = Utc::now();
    let resp = StatusResponse {
        version: state.version.clone(),
        node_id: state.node_id.clone(),
        network: network_name(state.chain.network_id),
        network_id: state.chain.network_id,
        genesis: state.chain.genesis_hash.to_string(),
        head_number: state.chain.head_number,
        peer_count: state.registry.len(),
        best_peer_number: state.registry.best_peer().map(|p| p.head().number),
        uptime_secs: (now - state.started_at).num_seconds(),
        timestamp: now.to_rfc3339(),
    };
    Json(resp)
}

/// `GET /peers` — every registered peer.
async fn peers_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut peers = state.registry.infos();
    peers.sort_by(|a, b| a.id.cmp(&b.id));
    Json(peers)
}

/// `GET /peers/:id` — one peer, or 404.
async fn peer_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.registry.peer(&id) {
        Some(peer) => Json(peer.info()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("peer {} not registered", id) })),
        )
            .into_response(),
    }
}

/// `GET /metrics` — delegates to the Prometheus handler.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    metrics::metrics_handler(State(state.metrics)).await
}
