// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idle-completion detection for one session.
//!
//! A window is armed when a prompt is written. Every output chunk that
//! arrives while armed is accumulated and pushes the deadline out by the
//! quiescence period. When the deadline passes with no further output the
//! window closes and the accumulated bytes are handed back for
//! classification.
//!
//! The detector holds no timer of its own. The owning task sleeps until
//! [`IdleDetector::deadline`] and then calls [`IdleDetector::poll_complete`],
//! so replacing the deadline is the only cancellation needed.
//!
//! A command that legitimately stays silent for longer than the quiescence
//! period (e.g. `sleep 5`) is reported complete early. That is a known
//! limitation of a fixed quiescence heuristic.

use std::time::Duration;

use tokio::time::Instant;

/// Default quiescence period.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(2000);

#[derive(Debug)]
pub struct IdleDetector {
    timeout: Duration,
    buffer: Vec<u8>,
    deadline: Option<Instant>,
}

impl IdleDetector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, buffer: Vec::new(), deadline: None }
    }

    /// Open a capture window. Any window already open is discarded.
    pub fn arm(&mut self, now: Instant) {
        self.buffer.clear();
        self.deadline = Some(now + self.timeout);
    }

    /// Record an output chunk. No-op while idle.
    pub fn feed(&mut self, chunk: &[u8], now: Instant) {
        if self.deadline.is_none() {
            return;
        }
        self.buffer.extend_from_slice(chunk);
        self.deadline = Some(now + self.timeout);
    }

    /// When the open window will close if no further output arrives.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Close the window if its deadline has passed, returning the raw bytes
    /// accumulated since it was armed.
    pub fn poll_complete(&mut self, now: Instant) -> Option<Vec<u8>> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                Some(std::mem::take(&mut self.buffer))
            }
            _ => None,
        }
    }

    /// Drop any open window without reporting it.
    pub fn disarm(&mut self) {
        self.deadline = None;
        self.buffer.clear();
    }
}

#[cfg(test)]
#[path = "detector_tests.rs"]
mod tests;
