// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event pump: drains the shared session event queue into the hub.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::event::SessionEvent;
use crate::transport::state::AppState;
use crate::transport::ws_msg::session_event_to_msgs;

/// Run until the queue closes or shutdown is requested.
pub async fn run_event_pump(state: Arc<AppState>, mut events_rx: mpsc::Receiver<SessionEvent>) {
    loop {
        let event = tokio::select! {
            _ = state.shutdown.cancelled() => break,
            event = events_rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        dispatch(&state, event).await;
    }
    debug!("event pump stopped");
}

/// Broadcast one session event.
pub async fn dispatch(state: &AppState, event: SessionEvent) {
    match event {
        SessionEvent::Exited { id, .. } => {
            if state.registry.remove(id).await {
                state.broadcast_sessions();
            }
        }
        SessionEvent::Output { id, .. } | SessionEvent::CommandComplete { id, .. }
            if !state.registry.contains(id) =>
        {
            debug!(session = %id, "event for removed session dropped");
        }
        event => {
            for msg in session_event_to_msgs(&event) {
                state.hub.broadcast(&msg);
            }
        }
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
