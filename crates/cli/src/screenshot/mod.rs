// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Screenshot capture behind a capability trait.
//!
//! The protocol handler only sees [`ScreenshotCapture`]; which tool runs is
//! decided once at startup by [`platform_capture`].

pub mod command;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;

pub use command::{CaptureCommand, CommandCapture};

/// A captured PNG and the tool that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub png: Vec<u8>,
    pub source: String,
}

impl Screenshot {
    /// `data:image/png;base64,...` form relayed to clients.
    pub fn data_url(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.png);
        format!("data:image/png;base64,{encoded}")
    }
}

/// Why a capture produced no image.
#[derive(Debug)]
pub enum CaptureError {
    /// The user dismissed the capture, or the tool wrote nothing.
    Cancelled,
    /// The hard capture timeout elapsed.
    TimedOut,
    /// No capture tool exists for this platform.
    Unsupported,
    Failed(String),
    Io(std::io::Error),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => f.write_str("screenshot cancelled"),
            Self::TimedOut => f.write_str("screenshot timed out"),
            Self::Unsupported => f.write_str("screenshots are not supported on this platform"),
            Self::Failed(reason) => write!(f, "screenshot failed: {reason}"),
            Self::Io(e) => write!(f, "screenshot failed: {e}"),
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

pub type CaptureFuture<'a> = Pin<Box<dyn Future<Output = Result<Screenshot, CaptureError>> + Send + 'a>>;

/// Something that can produce a screenshot on request.
///
/// Captures may wait on user interaction for several seconds.
pub trait ScreenshotCapture: Send + Sync + 'static {
    fn capture(&self) -> CaptureFuture<'_>;
}

/// Run `capture`, giving up after `timeout`.
///
/// Dropping the capture future kills any tool process group it started.
pub async fn capture_with_timeout(
    capture: &dyn ScreenshotCapture,
    timeout: Duration,
) -> Result<Screenshot, CaptureError> {
    match tokio::time::timeout(timeout, capture.capture()).await {
        Ok(result) => result,
        Err(_) => Err(CaptureError::TimedOut),
    }
}

/// Capture that always reports [`CaptureError::Unsupported`].
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedCapture;

impl ScreenshotCapture for UnsupportedCapture {
    fn capture(&self) -> CaptureFuture<'_> {
        Box::pin(async { Err(CaptureError::Unsupported) })
    }
}

/// Pick the capture implementation for this host.
///
/// A custom shell command wins over the platform default. `{path}` in the
/// command is replaced by the shell-quoted PNG path the tool must write.
pub fn platform_capture(custom_command: Option<&str>) -> Arc<dyn ScreenshotCapture> {
    if let Some(cmd) = custom_command {
        return Arc::new(CommandCapture::new(vec![CaptureCommand::shell(cmd)]));
    }
    default_capture()
}

#[cfg(target_os = "macos")]
fn default_capture() -> Arc<dyn ScreenshotCapture> {
    Arc::new(CommandCapture::new(vec![CaptureCommand::new(
        "screencapture",
        ["-i", command::PATH_PLACEHOLDER],
        "screencapture",
    )]))
}

#[cfg(target_os = "linux")]
fn default_capture() -> Arc<dyn ScreenshotCapture> {
    Arc::new(CommandCapture::new(vec![
        CaptureCommand::new("scrot", ["-s", command::PATH_PLACEHOLDER], "scrot"),
        CaptureCommand::new("import", [command::PATH_PLACEHOLDER], "import"),
    ]))
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn default_capture() -> Arc<dyn ScreenshotCapture> {
    Arc::new(UnsupportedCapture)
}

#[cfg(test)]
#[path = "../screenshot_tests.rs"]
mod tests;
