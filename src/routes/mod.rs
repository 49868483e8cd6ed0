//! Router assembly for the WebSocket transport.
//!
//! The raw TCP transport lives in [`tcp`] and does not go through Axum.

pub mod tcp;
pub mod ws;

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// WebSocket relay at `/` (and `/ws`) plus a `/health` probe.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws::handle_ws))
        .route("/ws", get(ws::handle_ws))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
