// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol-level error codes carried in outbound `error` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BadRequest,
    NoSession,
    SpawnFailed,
    CaptureFailed,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::NoSession => "NO_SESSION",
            Self::SpawnFailed => "SPAWN_FAILED",
            Self::CaptureFailed => "CAPTURE_FAILED",
            Self::Internal => "INTERNAL",
        }
    }

    /// Human-readable message used when the caller has nothing more specific.
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::BadRequest => "invalid message",
            Self::NoSession => "No terminal",
            Self::SpawnFailed => "failed to start shell",
            Self::CaptureFailed => "Screenshot failed",
            Self::Internal => "internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
