// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: builders, mocks, and assertion helpers.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::classify::OutputClassifier;
use crate::event::SessionEvent;
use crate::hub::Hub;
use crate::pty::{Backend, BackendInput, ExitStatus, SpawnRequest, Spawner};
use crate::registry::{RegistrySettings, SessionRegistry};
use crate::screenshot::{CaptureError, CaptureFuture, Screenshot, ScreenshotCapture};
use crate::transport::state::{AppState, BridgeSettings};

/// Captured writes, shared between a test and the backend it spawned.
pub type CapturedInput = Arc<Mutex<Vec<Bytes>>>;

/// A fake shell that answers a handful of commands deterministically.
///
/// Input is split into lines on `\r` or `\n`. Recognised lines:
/// - `echo <text>` prints `<text>`
/// - `seq <n>` prints `1`..`n`, one chunk per line
/// - `exit [code]` exits with `code` (default 0)
/// - `true` prints nothing
///
/// Any other non-empty line prints `sh: 1: <line>: command not found`.
/// Closing the input channel ends the shell as if it received SIGHUP.
pub struct ScriptedShell {
    banner: Option<Bytes>,
    captured_input: CapturedInput,
}

impl Default for ScriptedShell {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self { banner: None, captured_input: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Output emitted once at startup, before any input is read.
    pub fn banner(mut self, bytes: impl Into<Bytes>) -> Self {
        self.banner = Some(bytes.into());
        self
    }

    pub fn captured_input(&self) -> CapturedInput {
        Arc::clone(&self.captured_input)
    }
}

enum Reply {
    Chunks(Vec<String>),
    Exit(i32),
}

fn respond(line: &str) -> Reply {
    let line = line.trim();
    let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
    match cmd {
        "" | "true" => Reply::Chunks(Vec::new()),
        "echo" => Reply::Chunks(vec![format!("{rest}\r\n")]),
        "seq" => {
            let n: u32 = rest.trim().parse().unwrap_or(0);
            Reply::Chunks((1..=n).map(|i| format!("{i}\r\n")).collect())
        }
        "exit" => Reply::Exit(rest.trim().parse().unwrap_or(0)),
        _ => Reply::Chunks(vec![format!("sh: 1: {line}: command not found\r\n")]),
    }
}

impl Backend for ScriptedShell {
    fn run(
        &mut self,
        output_tx: mpsc::Sender<Bytes>,
        mut input_rx: mpsc::Receiver<BackendInput>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ExitStatus>> + Send + '_>> {
        let banner = self.banner.take();
        let captured_input = Arc::clone(&self.captured_input);

        Box::pin(async move {
            if let Some(banner) = banner {
                if output_tx.send(banner).await.is_err() {
                    return Ok(ExitStatus { code: None, signal: Some(1) });
                }
            }

            let mut line = Vec::new();
            while let Some(BackendInput::Write(data)) = input_rx.recv().await {
                captured_input.lock().push(data.clone());
                for &byte in data.iter() {
                    if byte != b'\r' && byte != b'\n' {
                        line.push(byte);
                        continue;
                    }
                    let text = String::from_utf8_lossy(&line).into_owned();
                    line.clear();
                    match respond(&text) {
                        Reply::Chunks(chunks) => {
                            for chunk in chunks {
                                if output_tx.send(Bytes::from(chunk)).await.is_err() {
                                    return Ok(ExitStatus { code: None, signal: Some(1) });
                                }
                                tokio::task::yield_now().await;
                            }
                        }
                        Reply::Exit(code) => return Ok(ExitStatus { code: Some(code), signal: None }),
                    }
                }
            }
            Ok(ExitStatus { code: None, signal: Some(1) })
        })
    }

    fn child_pid(&self) -> Option<u32> {
        None
    }
}

/// Spawner handing out [`ScriptedShell`]s, recording every request.
#[derive(Default)]
pub struct ScriptedSpawner {
    refuse: bool,
    requests: Mutex<Vec<SpawnRequest>>,
    inputs: Mutex<Vec<CapturedInput>>,
}

impl ScriptedSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// A spawner whose every spawn fails.
    pub fn refusing() -> Self {
        Self { refuse: true, ..Self::default() }
    }

    pub fn requests(&self) -> Vec<SpawnRequest> {
        self.requests.lock().clone()
    }

    /// Input captured by the `index`th shell spawned.
    pub fn captured_input(&self, index: usize) -> Option<CapturedInput> {
        self.inputs.lock().get(index).cloned()
    }
}

impl Spawner for ScriptedSpawner {
    fn spawn(&self, request: &SpawnRequest) -> anyhow::Result<Box<dyn Backend>> {
        if self.refuse {
            anyhow::bail!("spawn refused");
        }
        if !request.cwd.is_dir() {
            anyhow::bail!("working directory does not exist: {}", request.cwd.display());
        }
        let shell = ScriptedShell::new();
        self.requests.lock().push(request.clone());
        self.inputs.lock().push(shell.captured_input());
        Ok(Box::new(shell))
    }
}

/// What a [`StubCapture`] produces.
#[derive(Debug, Clone)]
pub enum StubOutcome {
    Image(Screenshot),
    Cancelled,
    Failed(String),
    /// Never completes; exercises the hard timeout.
    Hang,
}

/// Screenshot capture with a canned outcome.
#[derive(Debug)]
pub struct StubCapture {
    outcome: StubOutcome,
    calls: AtomicUsize,
}

impl StubCapture {
    pub fn new(outcome: StubOutcome) -> Self {
        Self { outcome, calls: AtomicUsize::new(0) }
    }

    pub fn image(png: &[u8], source: &str) -> Self {
        Self::new(StubOutcome::Image(Screenshot { png: png.to_vec(), source: source.to_owned() }))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl ScreenshotCapture for StubCapture {
    fn capture(&self) -> CaptureFuture<'_> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let outcome = self.outcome.clone();
        Box::pin(async move {
            match outcome {
                StubOutcome::Image(shot) => Ok(shot),
                StubOutcome::Cancelled => Err(CaptureError::Cancelled),
                StubOutcome::Failed(reason) => Err(CaptureError::Failed(reason)),
                StubOutcome::Hang => std::future::pending().await,
            }
        })
    }
}

/// Builder for constructing `AppState` in tests with sensible defaults.
pub struct AppStateBuilder {
    spawner: Arc<dyn Spawner>,
    screenshot: Arc<dyn ScreenshotCapture>,
    idle_timeout: Duration,
    screenshot_timeout: Duration,
    default_cwd: PathBuf,
    extra_patterns: Vec<String>,
    port: u16,
}

impl Default for AppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self {
            spawner: Arc::new(ScriptedSpawner::new()),
            screenshot: Arc::new(StubCapture::image(b"\x89PNG", "stub")),
            idle_timeout: Duration::from_millis(150),
            screenshot_timeout: Duration::from_secs(2),
            default_cwd: std::env::temp_dir(),
            extra_patterns: Vec::new(),
            port: 0,
        }
    }

    pub fn spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn screenshot(mut self, capture: Arc<dyn ScreenshotCapture>) -> Self {
        self.screenshot = capture;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn screenshot_timeout(mut self, timeout: Duration) -> Self {
        self.screenshot_timeout = timeout;
        self
    }

    pub fn default_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.default_cwd = cwd.into();
        self
    }

    pub fn extra_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.extra_patterns.push(pattern.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Registry settings matching this builder.
    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            shell: "scripted-sh".to_owned(),
            shell_args: Vec::new(),
            default_cwd: self.default_cwd.clone(),
            env: Vec::new(),
            cols: 80,
            rows: 24,
            idle_timeout: self.idle_timeout,
            kill_grace: Duration::from_millis(200),
        }
    }

    /// Build state and return the session event receiver alongside it.
    pub fn build(self) -> anyhow::Result<(Arc<AppState>, mpsc::Receiver<SessionEvent>)> {
        let classifier = Arc::new(OutputClassifier::new(&self.extra_patterns)?);
        let (registry, events_rx) =
            SessionRegistry::new(Arc::clone(&self.spawner), classifier, self.registry_settings());
        let state = Arc::new(AppState {
            registry: Arc::new(registry),
            hub: Arc::new(Hub::new()),
            screenshot: self.screenshot,
            config: BridgeSettings {
                port: self.port,
                started_at: Instant::now(),
                screenshot_timeout: self.screenshot_timeout,
            },
            shutdown: CancellationToken::new(),
        });
        Ok((state, events_rx))
    }
}

/// Extension trait to convert any `Display` error into `anyhow::Error`.
/// Replaces `.map_err(|e| anyhow::anyhow!("{e}"))` with `.anyhow()`.
pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = format!("{err:#}");
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}

/// Receive the next session event, failing after `timeout`.
pub async fn next_event(
    rx: &mut mpsc::Receiver<SessionEvent>,
    timeout: Duration,
) -> anyhow::Result<SessionEvent> {
    tokio::time::timeout(timeout, rx.recv())
        .await
        .map_err(|_| anyhow::anyhow!("session event timeout"))?
        .ok_or_else(|| anyhow::anyhow!("session event queue closed"))
}

/// Spawn an HTTP server on a random port for integration testing, together
/// with the event pump that feeds the hub.
///
/// Returns the bound address and a join handle for the server task.
pub async fn spawn_http_server(
    state: Arc<AppState>,
    events_rx: mpsc::Receiver<SessionEvent>,
) -> anyhow::Result<(std::net::SocketAddr, tokio::task::JoinHandle<()>)> {
    tokio::spawn(crate::transport::events::run_event_pump(Arc::clone(&state), events_rx));
    let router = crate::transport::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok((addr, handle))
}
