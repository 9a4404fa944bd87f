// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol dispatch shared by the WebSocket loop and the HTTP probes.
//!
//! Each inbound request is handled here and turned into at most one direct
//! reply; state changes other observers must see go through the hub.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::ErrorCode;
use crate::event::SessionId;
use crate::hub::ObserverId;
use crate::screenshot::capture_with_timeout;
use crate::transport::state::AppState;
use crate::transport::ws_msg::{ws_error, ClientMessage, ServerMessage};

/// Characters of prompt text echoed into the log.
const PROMPT_PREVIEW_CHARS: usize = 80;

// ---------------------------------------------------------------------------
// Shared result types
// ---------------------------------------------------------------------------

/// Health check result.
pub struct HealthInfo {
    pub status: &'static str,
    pub sessions: usize,
    pub observers: usize,
    pub uptime_secs: u64,
}

pub fn compute_health(state: &AppState) -> HealthInfo {
    HealthInfo {
        status: "running",
        sessions: state.registry.len(),
        observers: state.hub.observer_count(),
        uptime_secs: state.config.started_at.elapsed().as_secs(),
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Handle one decoded client message from `observer`.
///
/// Returns the direct reply, if any. Screenshot results arrive later through
/// the observer's reply queue.
pub async fn handle_client_message(
    state: &Arc<AppState>,
    observer: ObserverId,
    msg: ClientMessage,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::CreateSession { name, cwd } => handle_create(state, name, cwd),

        ClientMessage::RemoveSession { session_id } => {
            if state.registry.remove(session_id).await {
                state.broadcast_sessions();
            } else {
                debug!(session = %session_id, "remove of unknown session ignored");
            }
            None
        }

        ClientMessage::SelectSession { session_id } => {
            state.registry.select(session_id);
            info!(session = %session_id, "session selected");
            state.hub.broadcast(&ServerMessage::SessionSelected { active_id: Some(session_id) });
            state.broadcast_sessions();
            None
        }

        ClientMessage::Prompt { text, session_id, auto_execute } => {
            Some(handle_prompt(state, text, session_id, auto_execute).await)
        }

        ClientMessage::ScreenshotRequest { trigger } => {
            let trigger = trigger.as_deref().unwrap_or("unspecified");
            info!(observer, trigger, "screenshot requested");
            spawn_screenshot(Arc::clone(state), observer);
            None
        }

        ClientMessage::RefreshSessions {} => Some(state.sessions_msg()),

        ClientMessage::CaptureReady {} => {
            info!(observer, "client entered capture mode");
            None
        }
    }
}

fn handle_create(
    state: &AppState,
    name: Option<String>,
    cwd: Option<PathBuf>,
) -> Option<ServerMessage> {
    match state.registry.create(name, cwd) {
        Ok(_) => {
            state.broadcast_sessions();
            None
        }
        Err(e) => {
            warn!("create_session failed: {e:#}");
            let message = format!("{}: {e:#}", ErrorCode::SpawnFailed.default_message());
            Some(ws_error(ErrorCode::SpawnFailed, &message))
        }
    }
}

async fn handle_prompt(
    state: &AppState,
    text: String,
    session_id: Option<SessionId>,
    auto_execute: bool,
) -> ServerMessage {
    let Some(session) = state.registry.resolve(session_id) else {
        warn!(requested = ?session_id.map(|id| id.0), "prompt with no target session");
        return ws_error(ErrorCode::NoSession, ErrorCode::NoSession.default_message());
    };

    let preview: String = text.chars().take(PROMPT_PREVIEW_CHARS).collect();
    info!(
        session = %session.id(),
        chars = text.chars().count(),
        auto_execute,
        preview = %preview,
        "prompt received"
    );

    if !session.submit(text, auto_execute).await {
        debug!(session = %session.id(), "prompt for stopped session dropped");
    }

    ServerMessage::Ack {
        status: "sent".to_owned(),
        session_id: session.id(),
        session_name: session.name().to_owned(),
    }
}

/// Run a capture off the connection loop and deliver the outcome to the
/// requesting observer only.
fn spawn_screenshot(state: Arc<AppState>, observer: ObserverId) {
    tokio::spawn(async move {
        let capture = Arc::clone(&state.screenshot);
        let result = tokio::select! {
            _ = state.shutdown.cancelled() => return,
            r = capture_with_timeout(capture.as_ref(), state.config.screenshot_timeout) => r,
        };
        let reply = match result {
            Ok(shot) => {
                info!(observer, source = %shot.source, bytes = shot.png.len(), "screenshot captured");
                ServerMessage::from(shot)
            }
            Err(e) => {
                warn!(observer, "screenshot failed: {e}");
                ServerMessage::from(&e)
            }
        };
        if !state.hub.reply(observer, &reply) {
            debug!(observer, "screenshot requester went away");
        }
    });
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
