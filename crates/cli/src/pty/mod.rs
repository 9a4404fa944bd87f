// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod nbio;
pub mod spawn;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use bytes::Bytes;
use tokio::sync::mpsc;

/// How a terminal child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

/// Input delivered to the backend's child process.
#[derive(Debug)]
pub enum BackendInput {
    Write(Bytes),
}

/// Terminal backend abstraction over a native PTY or a test double.
///
/// Object-safe for use as `Box<dyn Backend>`. `run` streams every chunk the
/// child produces to `output_tx` in arrival order and resolves once the child
/// has exited and been reaped.
pub trait Backend: Send + 'static {
    fn run(
        &mut self,
        output_tx: mpsc::Sender<Bytes>,
        input_rx: mpsc::Receiver<BackendInput>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ExitStatus>> + Send + '_>>;

    fn child_pid(&self) -> Option<u32>;
}

/// Everything needed to launch one shell session.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub cols: u16,
    pub rows: u16,
}

impl SpawnRequest {
    /// Full argv (program followed by its arguments).
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

/// Factory seam the session registry uses to start new shells.
pub trait Spawner: Send + Sync + 'static {
    fn spawn(&self, request: &SpawnRequest) -> anyhow::Result<Box<dyn Backend>>;
}

/// Spawns real shells on native pseudo-terminals.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeSpawner;

impl Spawner for NativeSpawner {
    fn spawn(&self, request: &SpawnRequest) -> anyhow::Result<Box<dyn Backend>> {
        Ok(Box::new(spawn::NativePty::spawn(request)?))
    }
}
