// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP and WebSocket transport for the bridge.

pub mod events;
pub mod handler;
pub mod http;
pub mod state;
pub mod ws;
pub mod ws_msg;

pub use state::AppState;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the axum `Router` with the WebSocket endpoint and HTTP probes.
///
/// The WebSocket is served at both `/` and `/ws`.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(ws::ws_handler))
        .route("/ws", get(ws::ws_handler))
        .route("/api/v1/health", get(http::health))
        .route("/api/v1/sessions", get(http::sessions))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
