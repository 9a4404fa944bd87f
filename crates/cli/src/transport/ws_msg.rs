// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket message types and conversions.
//!
//! Messages are internally tagged JSON objects (`{"type": "prompt", ...}`)
//! with camelCase field names.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::event::{SessionEvent, SessionId};
use crate::registry::SessionInfo;
use crate::screenshot::{CaptureError, Screenshot};

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Connected {
        port: u16,
    },
    Sessions {
        list: Vec<SessionInfo>,
        active_id: Option<SessionId>,
    },
    SessionSelected {
        active_id: Option<SessionId>,
    },
    Output {
        text: String,
        session_id: SessionId,
        session_name: String,
    },
    CommandComplete {
        session_id: SessionId,
        session_name: String,
        output: String,
        exit_code: i32,
        has_error: bool,
    },
    ErrorDetected {
        session_id: SessionId,
        output: String,
    },
    Ack {
        status: String,
        session_id: SessionId,
        session_name: String,
    },
    Error {
        code: String,
        message: String,
    },
    Screenshot {
        data_url: String,
        source: String,
    },
}

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    CreateSession {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        cwd: Option<PathBuf>,
    },
    RemoveSession {
        session_id: SessionId,
    },
    SelectSession {
        session_id: SessionId,
    },
    Prompt {
        text: String,
        #[serde(default)]
        session_id: Option<SessionId>,
        #[serde(default = "default_true")]
        auto_execute: bool,
    },
    ScreenshotRequest {
        #[serde(default)]
        trigger: Option<String>,
    },
    RefreshSessions {},
    /// Sent by the browser when it enters capture mode. Informational.
    CaptureReady {},
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// Build a protocol error message.
pub fn ws_error(code: ErrorCode, message: &str) -> ServerMessage {
    ServerMessage::Error { code: code.as_str().to_owned(), message: message.to_owned() }
}

impl From<Screenshot> for ServerMessage {
    fn from(shot: Screenshot) -> Self {
        ServerMessage::Screenshot { data_url: shot.data_url(), source: shot.source }
    }
}

impl From<&CaptureError> for ServerMessage {
    fn from(err: &CaptureError) -> Self {
        let message = match err {
            CaptureError::Cancelled | CaptureError::TimedOut => {
                "Screenshot cancelled or timed out".to_owned()
            }
            other => format!("Screenshot failed: {other}"),
        };
        ServerMessage::Error { code: ErrorCode::CaptureFailed.as_str().to_owned(), message }
    }
}

/// Outbound messages for one session event, in emission order.
pub fn session_event_to_msgs(event: &SessionEvent) -> Vec<ServerMessage> {
    match event {
        SessionEvent::Output { id, name, text } => vec![ServerMessage::Output {
            text: text.clone(),
            session_id: *id,
            session_name: name.to_string(),
        }],
        SessionEvent::CommandComplete { id, name, output, classification } => {
            let mut msgs = vec![ServerMessage::CommandComplete {
                session_id: *id,
                session_name: name.to_string(),
                output: output.clone(),
                exit_code: classification.exit_code(),
                has_error: classification.has_error,
            }];
            if classification.has_error {
                msgs.push(ServerMessage::ErrorDetected { session_id: *id, output: output.clone() });
            }
            msgs
        }
        SessionEvent::Exited { .. } => Vec::new(),
    }
}

#[cfg(test)]
#[path = "ws_msg_tests.rs"]
mod tests;
