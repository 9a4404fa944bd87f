// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only HTTP probes served alongside the WebSocket endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::event::SessionId;
use crate::registry::SessionInfo;
use crate::transport::handler::compute_health;
use crate::transport::state::AppState;

/// Response for `GET /api/v1/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub sessions: usize,
    pub observers: usize,
    pub uptime_secs: u64,
}

/// Response for `GET /api/v1/sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsResponse {
    pub list: Vec<SessionInfo>,
    pub active_id: Option<SessionId>,
}

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let h = compute_health(&s);
    Json(HealthResponse {
        status: h.status.to_owned(),
        sessions: h.sessions,
        observers: h.observers,
        uptime_secs: h.uptime_secs,
    })
}

/// `GET /api/v1/sessions`
pub async fn sessions(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let (list, active_id) = s.registry.snapshot();
    Json(SessionsResponse { list, active_id })
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
