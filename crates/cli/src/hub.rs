// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fan-out of server messages to connected observers.
//!
//! Broadcasts are serialised once and pushed through a `broadcast` channel,
//! so a slow or closed observer never blocks the others. An observer that
//! falls behind the ring is dropped rather than served a stream with a gap.
//! Targeted replies go through a small per-observer queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::transport::ws_msg::ServerMessage;

pub type ObserverId = u64;

/// Capacity of the shared broadcast ring.
const BROADCAST_CAPACITY: usize = 1024;
/// Capacity of each observer's reply queue.
const REPLY_CAPACITY: usize = 32;

/// Receiving side handed to a newly registered observer.
#[derive(Debug)]
pub struct Observer {
    pub id: ObserverId,
    pub events: broadcast::Receiver<Arc<str>>,
    pub replies: mpsc::Receiver<Arc<str>>,
}

/// Why an observer stopped receiving broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    /// The observer missed this many frames and was unregistered.
    Lagged(u64),
    /// The hub is gone.
    Closed,
}

#[derive(Debug)]
pub struct Hub {
    tx: broadcast::Sender<Arc<str>>,
    observers: Mutex<HashMap<ObserverId, mpsc::Sender<Arc<str>>>>,
    next_id: AtomicU64,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx, observers: Mutex::new(HashMap::new()), next_id: AtomicU64::new(1) }
    }

    pub fn register(&self) -> Observer {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, replies) = mpsc::channel(REPLY_CAPACITY);
        let events = self.tx.subscribe();
        self.observers.lock().insert(id, reply_tx);
        Observer { id, events, replies }
    }

    pub fn unregister(&self, id: ObserverId) {
        self.observers.lock().remove(&id);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    /// Deliver `msg` to every registered observer. Returns how many
    /// receivers it was queued for.
    pub fn broadcast(&self, msg: &ServerMessage) -> usize {
        let Some(frame) = encode(msg) else {
            return 0;
        };
        self.tx.send(frame).unwrap_or(0)
    }

    /// Next broadcast frame for observer `id`.
    ///
    /// An observer whose receiver overflowed is unregistered and gets
    /// [`Disconnect::Lagged`]; it must reconnect to resync.
    pub async fn next_broadcast(
        &self,
        id: ObserverId,
        events: &mut broadcast::Receiver<Arc<str>>,
    ) -> Result<Arc<str>, Disconnect> {
        match events.recv().await {
            Ok(frame) => Ok(frame),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                self.unregister(id);
                Err(Disconnect::Lagged(skipped))
            }
            Err(broadcast::error::RecvError::Closed) => Err(Disconnect::Closed),
        }
    }

    /// Deliver `msg` to one observer. A full or closed queue drops the
    /// message; a closed queue also drops the observer.
    pub fn reply(&self, id: ObserverId, msg: &ServerMessage) -> bool {
        let Some(frame) = encode(msg) else {
            return false;
        };
        let mut observers = self.observers.lock();
        let Some(tx) = observers.get(&id) else {
            return false;
        };
        match tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(observer = id, "reply queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                observers.remove(&id);
                false
            }
        }
    }
}

fn encode(msg: &ServerMessage) -> Option<Arc<str>> {
    match serde_json::to_string(msg) {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            debug!("failed to encode server message: {e}");
            None
        }
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
