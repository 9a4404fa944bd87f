// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One shell session: a handle the registry keeps, plus the runtime task
//! that owns the PTY backend and the idle-completion detector.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::classify::OutputClassifier;
use crate::detector::IdleDetector;
use crate::event::{SessionEvent, SessionId};
use crate::pty::Backend;

pub mod decode;
pub mod run;

pub use run::SessionRunner;

/// Commands delivered to a running session task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    /// Arm a capture window, then write `text` (plus Enter when `enter`).
    Prompt { text: String, enter: bool },
}

/// Runtime objects for building a new session.
pub struct SessionConfig {
    pub id: SessionId,
    pub name: String,
    pub cwd: PathBuf,
    pub backend: Box<dyn Backend>,
    pub classifier: Arc<OutputClassifier>,
    pub idle_timeout: Duration,
    /// How long a terminated shell gets to exit after SIGHUP before SIGKILL.
    pub kill_grace: Duration,
    pub events_tx: mpsc::Sender<SessionEvent>,
}

/// Registry-side view of a session. Cheap to share; all I/O happens on the
/// session task.
pub struct SessionHandle {
    id: SessionId,
    name: Arc<str>,
    cwd: PathBuf,
    pid: Option<u32>,
    input_tx: mpsc::Sender<SessionInput>,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("cwd", &self.cwd)
            .field("pid", &self.pid)
            .finish()
    }
}

impl SessionHandle {
    /// Split a session into its handle and the runner that drives it.
    ///
    /// The runner does nothing until spawned; pass its `JoinHandle` back
    /// through [`SessionHandle::attach`].
    pub fn new(config: SessionConfig) -> (Self, SessionRunner) {
        let SessionConfig { id, name, cwd, backend, classifier, idle_timeout, kill_grace, events_tx } =
            config;
        let name: Arc<str> = Arc::from(name);
        let (input_tx, input_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let running = Arc::new(AtomicBool::new(true));
        let pid = backend.child_pid();

        let runner = SessionRunner {
            id,
            name: Arc::clone(&name),
            backend,
            classifier,
            detector: IdleDetector::new(idle_timeout),
            events_tx,
            input_rx,
            cancel: cancel.clone(),
            running: Arc::clone(&running),
            kill_grace,
        };
        let handle = Self { id, name, cwd, pid, input_tx, cancel, running, task: Mutex::new(None) };
        (handle, runner)
    }

    pub fn attach(&self, task: JoinHandle<()>) {
        *self.task.lock() = Some(task);
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Queue a prompt for the session task.
    ///
    /// Returns `false` when the session has already stopped; the caller
    /// learns about the exit from the event stream, not from this result.
    pub async fn submit(&self, text: String, enter: bool) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.input_tx.send(SessionInput::Prompt { text, enter }).await.is_ok()
    }

    /// Stop the session task, kill its shell, and wait for both to finish.
    pub async fn terminate(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
#[path = "../session_tests.rs"]
mod tests;
