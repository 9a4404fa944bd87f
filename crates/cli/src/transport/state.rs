// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::hub::Hub;
use crate::registry::SessionRegistry;
use crate::screenshot::ScreenshotCapture;
use crate::transport::ws_msg::ServerMessage;

/// Shared application state passed to all handlers via axum `State` extractor.
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub hub: Arc<Hub>,
    pub screenshot: Arc<dyn ScreenshotCapture>,
    pub config: BridgeSettings,
    pub shutdown: CancellationToken,
}

/// Static bridge configuration (immutable after construction).
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Port reported to clients in `connected`.
    pub port: u16,
    pub started_at: Instant,
    pub screenshot_timeout: Duration,
}

impl AppState {
    /// Current `sessions` message, list and active pointer read atomically.
    pub fn sessions_msg(&self) -> ServerMessage {
        let (list, active_id) = self.registry.snapshot();
        ServerMessage::Sessions { list, active_id }
    }

    pub fn broadcast_sessions(&self) {
        self.hub.broadcast(&self.sessions_msg());
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
