// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::classify::Classification;
use crate::pty::ExitStatus;

/// Registry-assigned session identity. Monotonic, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Events a session task posts onto the shared event queue.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Decoded live output, ANSI codes intact.
    Output { id: SessionId, name: Arc<str>, text: String },
    /// A capture window closed after the quiescence period.
    CommandComplete {
        id: SessionId,
        name: Arc<str>,
        output: String,
        classification: Classification,
    },
    /// The shell process ended on its own.
    Exited { id: SessionId, name: Arc<str>, status: Option<ExitStatus> },
}
