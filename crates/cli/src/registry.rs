// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session registry: the only owner of session lifecycle.
//!
//! The session map and the active pointer live behind one `RwLock` that is
//! never held across an `.await`. Shells are spawned before the lock is
//! taken, so readers only ever see fully constructed sessions.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use crate::classify::OutputClassifier;
use crate::event::{SessionEvent, SessionId};
use crate::pty::{SpawnRequest, Spawner};
use crate::session::{SessionConfig, SessionHandle};

/// Capacity of the shared session event queue.
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Snapshot row returned by [`SessionRegistry::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub name: String,
    pub cwd: String,
}

impl SessionInfo {
    fn of(handle: &SessionHandle) -> Self {
        Self {
            id: handle.id(),
            name: handle.name().to_owned(),
            cwd: handle.cwd().to_string_lossy().into_owned(),
        }
    }
}

/// How new shells are launched.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub shell: String,
    pub shell_args: Vec<String>,
    pub default_cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub cols: u16,
    pub rows: u16,
    pub idle_timeout: Duration,
    pub kill_grace: Duration,
}

#[derive(Default)]
struct Inner {
    sessions: IndexMap<SessionId, Arc<SessionHandle>>,
    active: Option<SessionId>,
}

pub struct SessionRegistry {
    inner: RwLock<Inner>,
    next_id: AtomicU64,
    spawner: Arc<dyn Spawner>,
    classifier: Arc<OutputClassifier>,
    settings: RegistrySettings,
    events_tx: mpsc::Sender<SessionEvent>,
}

impl SessionRegistry {
    /// Build an empty registry and the receiving end of its event queue.
    pub fn new(
        spawner: Arc<dyn Spawner>,
        classifier: Arc<OutputClassifier>,
        settings: RegistrySettings,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let registry = Self {
            inner: RwLock::new(Inner::default()),
            next_id: AtomicU64::new(1),
            spawner,
            classifier,
            settings,
            events_tx,
        };
        (registry, events_rx)
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    /// Spawn a shell and register it. Becomes active only if nothing is.
    ///
    /// Must be called from within a tokio runtime.
    pub fn create(&self, name: Option<String>, cwd: Option<PathBuf>) -> anyhow::Result<SessionInfo> {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let name = name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| format!("session-{id}"));
        let cwd = cwd.unwrap_or_else(|| self.settings.default_cwd.clone());

        let request = SpawnRequest {
            program: self.settings.shell.clone(),
            args: self.settings.shell_args.clone(),
            cwd: cwd.clone(),
            env: self.settings.env.clone(),
            cols: self.settings.cols,
            rows: self.settings.rows,
        };
        let backend = self
            .spawner
            .spawn(&request)
            .with_context(|| format!("spawn {} in {}", request.program, cwd.display()))?;

        let (handle, runner) = SessionHandle::new(SessionConfig {
            id,
            name,
            cwd,
            backend,
            classifier: Arc::clone(&self.classifier),
            idle_timeout: self.settings.idle_timeout,
            kill_grace: self.settings.kill_grace,
            events_tx: self.events_tx.clone(),
        });
        let handle = Arc::new(handle);
        let info = SessionInfo::of(&handle);

        {
            let mut inner = self.inner.write();
            inner.sessions.insert(id, Arc::clone(&handle));
            if inner.active.is_none() {
                inner.active = Some(id);
            }
        }
        // Start after insertion so an immediate exit finds the entry to remove.
        handle.attach(tokio::spawn(runner.run()));

        info!(session = %id, name = %info.name, cwd = %info.cwd, pid = ?handle.pid(), "session created");
        Ok(info)
    }

    /// Remove and terminate a session. Unknown ids are a no-op.
    ///
    /// Returns whether a session was removed.
    pub async fn remove(&self, id: SessionId) -> bool {
        let removed = {
            let mut inner = self.inner.write();
            let removed = inner.sessions.shift_remove(&id);
            if removed.is_some() && inner.active == Some(id) {
                inner.active = inner.sessions.keys().next().copied();
            }
            removed
        };
        let Some(handle) = removed else {
            return false;
        };
        handle.terminate().await;
        info!(session = %id, name = %handle.name(), "session removed");
        true
    }

    /// Point the active pointer at `id`. The id is not validated.
    pub fn select(&self, id: SessionId) {
        self.inner.write().active = Some(id);
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        self.inner.read().sessions.values().map(|h| SessionInfo::of(h)).collect()
    }

    /// Session list and active pointer read under one lock acquisition.
    pub fn snapshot(&self) -> (Vec<SessionInfo>, Option<SessionId>) {
        let inner = self.inner.read();
        let list = inner.sessions.values().map(|h| SessionInfo::of(h)).collect();
        (list, inner.active)
    }

    pub fn active_id(&self) -> Option<SessionId> {
        self.inner.read().active
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        self.inner.read().sessions.get(&id).cloned()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.inner.read().sessions.contains_key(&id)
    }

    /// Resolve a prompt target: the explicit id if given, else the active
    /// session. A dangling active pointer resolves to nothing.
    pub fn resolve(&self, explicit: Option<SessionId>) -> Option<Arc<SessionHandle>> {
        let inner = self.inner.read();
        let id = explicit.or(inner.active)?;
        inner.sessions.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Terminate every session and wait for all shells to be reaped.
    pub async fn shutdown(&self) {
        let handles: Vec<Arc<SessionHandle>> = {
            let mut inner = self.inner.write();
            inner.active = None;
            inner.sessions.drain(..).map(|(_, h)| h).collect()
        };
        let count = handles.len();
        futures_util::future::join_all(handles.iter().map(|h| h.terminate())).await;
        if count > 0 {
            info!(count, "all sessions terminated");
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
