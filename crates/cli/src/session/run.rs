// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session `tokio::select!` loop: backend output, prompts, and the
//! quiescence deadline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classify::OutputClassifier;
use crate::detector::IdleDetector;
use crate::event::{SessionEvent, SessionId};
use crate::pty::{Backend, BackendInput, ExitStatus};

use super::decode::Utf8Decoder;
use super::SessionInput;

/// Owns one session's backend and detector for the lifetime of the shell.
pub struct SessionRunner {
    pub(super) id: SessionId,
    pub(super) name: Arc<str>,
    pub(super) backend: Box<dyn Backend>,
    pub(super) classifier: Arc<OutputClassifier>,
    pub(super) detector: IdleDetector,
    pub(super) events_tx: mpsc::Sender<SessionEvent>,
    pub(super) input_rx: mpsc::Receiver<SessionInput>,
    pub(super) cancel: CancellationToken,
    pub(super) running: Arc<AtomicBool>,
    pub(super) kill_grace: Duration,
}

enum LoopExit {
    Cancelled,
    BackendDone,
}

impl SessionRunner {
    /// Drive the session until its shell exits or it is terminated.
    pub async fn run(self) {
        let Self {
            id,
            name,
            mut backend,
            classifier,
            mut detector,
            events_tx,
            mut input_rx,
            cancel,
            running,
            kill_grace,
        } = self;

        let pid = backend.child_pid();
        let (output_tx, mut output_rx) = mpsc::channel::<Bytes>(256);
        let (backend_input_tx, backend_input_rx) = mpsc::channel::<BackendInput>(256);
        let mut backend_handle =
            tokio::spawn(async move { backend.run(output_tx, backend_input_rx).await });

        let emitter = Emitter { tx: events_tx, cancel: cancel.clone() };
        let mut decoder = Utf8Decoder::new();
        let mut input_open = true;

        let exit = loop {
            let deadline = detector.deadline();
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break LoopExit::Cancelled,

                data = output_rx.recv() => {
                    let Some(bytes) = data else {
                        break LoopExit::BackendDone;
                    };
                    debug!(session = %id, len = bytes.len(), "output chunk");
                    detector.feed(&bytes, Instant::now());
                    let text = decoder.decode(&bytes);
                    if !text.is_empty() {
                        emitter.emit(SessionEvent::Output { id, name: Arc::clone(&name), text }).await;
                    }
                }

                input = input_rx.recv(), if input_open => {
                    match input {
                        Some(SessionInput::Prompt { text, enter }) => {
                            detector.arm(Instant::now());
                            let mut data = text.into_bytes();
                            if enter {
                                data.push(b'\r');
                            }
                            if backend_input_tx.send(BackendInput::Write(Bytes::from(data))).await.is_err() {
                                debug!(session = %id, "write after backend exit dropped");
                            }
                        }
                        None => input_open = false,
                    }
                }

                _ = sleep_until(deadline) => {
                    if let Some(raw) = detector.poll_complete(Instant::now()) {
                        let text = String::from_utf8_lossy(&raw);
                        let output = classifier.clean(&text);
                        let classification = classifier.classify(&output);
                        match classification.matched {
                            Some(ref pattern) => {
                                info!(session = %id, pattern = %pattern, "command finished with errors");
                            }
                            None => info!(session = %id, "command finished"),
                        }
                        emitter
                            .emit(SessionEvent::CommandComplete {
                                id,
                                name: Arc::clone(&name),
                                output,
                                classification,
                            })
                            .await;
                    }
                }
            }
        };

        detector.disarm();
        drop(backend_input_tx);

        match exit {
            LoopExit::Cancelled => {
                // Stop draining output so a blocked backend send fails fast.
                drop(output_rx);
                shutdown_backend(id, pid, &mut backend_handle, kill_grace).await;
                running.store(false, Ordering::Release);
            }
            LoopExit::BackendDone => {
                let tail = decoder.finish();
                if !tail.is_empty() {
                    emitter.emit(SessionEvent::Output { id, name: Arc::clone(&name), text: tail }).await;
                }
                let status = match backend_handle.await {
                    Ok(Ok(status)) => Some(status),
                    Ok(Err(e)) => {
                        warn!(session = %id, "backend error: {e:#}");
                        None
                    }
                    Err(e) => {
                        warn!(session = %id, "backend task failed: {e}");
                        None
                    }
                };
                running.store(false, Ordering::Release);
                warn!(
                    session = %id,
                    code = ?status.and_then(|s| s.code),
                    signal = ?status.and_then(|s| s.signal),
                    "shell exited"
                );
                emitter.emit(SessionEvent::Exited { id, name, status }).await;
            }
        }
    }
}

/// Posts events onto the shared queue unless the session is being torn down.
struct Emitter {
    tx: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
}

impl Emitter {
    async fn emit(&self, event: SessionEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = self.tx.send(event) => {}
        }
    }
}

/// Sleep until `deadline`, or forever when there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// SIGHUP the shell's process group, escalating to SIGKILL after `grace`.
async fn shutdown_backend(
    id: SessionId,
    pid: Option<u32>,
    handle: &mut JoinHandle<anyhow::Result<ExitStatus>>,
    grace: Duration,
) {
    // forkpty makes the shell a session leader, so its pid is also the pgid.
    let group = pid.map(|p| Pid::from_raw(-(p as i32)));
    if let Some(group) = group {
        let _ = kill(group, Signal::SIGHUP);
    }

    match tokio::time::timeout(grace, &mut *handle).await {
        Ok(Ok(Ok(status))) => {
            debug!(session = %id, code = ?status.code, signal = ?status.signal, "shell reaped");
            return;
        }
        Ok(Ok(Err(e))) => {
            debug!(session = %id, "backend error during shutdown: {e:#}");
            return;
        }
        Ok(Err(e)) => {
            debug!(session = %id, "backend task failed during shutdown: {e}");
            return;
        }
        Err(_) => {}
    }

    warn!(session = %id, "shell ignored SIGHUP, sending SIGKILL");
    match group {
        Some(group) => {
            let _ = kill(group, Signal::SIGKILL);
            let _ = handle.await;
        }
        None => handle.abort(),
    }
}
