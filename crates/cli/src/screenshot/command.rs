// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Captures taken by running an external tool that writes a PNG file.

use std::path::Path;
use std::process::Stdio;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tracing::debug;

use super::{CaptureError, CaptureFuture, Screenshot, ScreenshotCapture};

/// Replaced by the output PNG path in capture command arguments.
pub const PATH_PLACEHOLDER: &str = "{path}";

/// One capture tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Reported to clients as the screenshot `source`.
    pub source: String,
    /// Shell-quote the substituted path (for `sh -c` command lines).
    pub quote_path: bool,
}

impl CaptureCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I, source: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            source: source.into(),
            quote_path: false,
        }
    }

    /// A user-supplied command line run through `sh -c`. The path replacing
    /// `{path}` is shell-quoted, so the placeholder goes in unquoted.
    pub fn shell(command_line: &str) -> Self {
        Self { quote_path: true, ..Self::new("sh", ["-c", command_line], "command") }
    }

    /// Arguments with the placeholder substituted.
    pub fn argv(&self, path: &Path) -> Vec<String> {
        let path = path.to_string_lossy();
        let path = if self.quote_path { shell_escape(&path) } else { path.into_owned() };
        self.args.iter().map(|a| a.replace(PATH_PLACEHOLDER, &path)).collect()
    }
}

/// Quote `s` for a POSIX shell unless it is plainly safe.
fn shell_escape(s: &str) -> String {
    if !s.is_empty()
        && s.chars().all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '/'))
    {
        s.to_owned()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

/// Kills a capture tool's whole process group when dropped, so helpers
/// started by `sh -c` die with it on timeout.
struct GroupKill(Option<Pid>);

impl Drop for GroupKill {
    fn drop(&mut self) {
        if let Some(pgid) = self.0 {
            let _ = killpg(pgid, Signal::SIGKILL);
        }
    }
}

/// Tries each command in order until one produces an image.
///
/// The next command is tried when a tool is not installed, or when it exits
/// unsuccessfully without writing anything.
#[derive(Debug, Clone)]
pub struct CommandCapture {
    attempts: Vec<CaptureCommand>,
}

impl CommandCapture {
    pub fn new(attempts: Vec<CaptureCommand>) -> Self {
        Self { attempts }
    }

    async fn run(&self) -> Result<Screenshot, CaptureError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("capture.png");
        let mut ran_any = false;

        for attempt in &self.attempts {
            let spawned = tokio::process::Command::new(&attempt.program)
                .args(attempt.argv(&path))
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .process_group(0)
                .kill_on_drop(true)
                .spawn();
            let mut child = match spawned {
                Ok(child) => child,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(program = %attempt.program, "capture tool not installed");
                    continue;
                }
                Err(e) => return Err(CaptureError::Io(e)),
            };
            ran_any = true;
            let _group = GroupKill(child.id().map(|pid| Pid::from_raw(pid as i32)));

            let status = child.wait().await?;
            match read_png(&path).await? {
                Some(png) => return Ok(Screenshot { png, source: attempt.source.clone() }),
                None if status.success() => return Err(CaptureError::Cancelled),
                None => {
                    debug!(program = %attempt.program, %status, "capture tool produced no image");
                }
            }
        }

        if ran_any {
            Err(CaptureError::Cancelled)
        } else {
            let tried: Vec<&str> = self.attempts.iter().map(|a| a.program.as_str()).collect();
            Err(CaptureError::Failed(format!("no capture tool found (tried {})", tried.join(", "))))
        }
    }
}

impl ScreenshotCapture for CommandCapture {
    fn capture(&self) -> CaptureFuture<'_> {
        Box::pin(self.run())
    }
}

/// Read the tool's output; a missing or empty file means no image.
async fn read_png(path: &Path) -> Result<Option<Vec<u8>>, CaptureError> {
    match tokio::fs::read(path).await {
        Ok(bytes) if bytes.is_empty() => Ok(None),
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CaptureError::Io(e)),
    }
}
