// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::classify::OutputClassifier;

/// Shell used when neither `--shell` nor `$SHELL` is set.
pub const FALLBACK_SHELL: &str = "/bin/bash";

/// Log output encoding.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => anyhow::bail!("invalid log format: {other}"),
        }
    }
}

/// Bridge between a browser client and local shell sessions.
#[derive(Debug, Parser)]
#[command(name = "termbridge", version, about)]
pub struct Config {
    /// Host address to bind to.
    #[arg(long, env = "BRIDGE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port for the WebSocket and HTTP listener.
    #[arg(long, env = "BRIDGE_PORT", default_value = "9876")]
    pub port: u16,

    /// Shell program for new sessions [default: $SHELL, else /bin/bash].
    #[arg(long, env = "BRIDGE_SHELL")]
    pub shell: Option<String>,

    /// Extra argument passed to the shell (repeatable).
    #[arg(long = "shell-arg", allow_hyphen_values = true)]
    pub shell_args: Vec<String>,

    /// Default working directory for new sessions
    /// [default: current directory, else $HOME, else /].
    #[arg(long, env = "BRIDGE_CWD")]
    pub cwd: Option<PathBuf>,

    /// Name of the session created at startup.
    #[arg(long, env = "BRIDGE_SESSION_NAME", default_value = "main")]
    pub session_name: String,

    /// Terminal columns.
    #[arg(long, env = "BRIDGE_COLS", default_value = "120")]
    pub cols: u16,

    /// Terminal rows.
    #[arg(long, env = "BRIDGE_ROWS", default_value = "30")]
    pub rows: u16,

    /// Output quiescence window that ends a command, in ms.
    #[arg(long, env = "BRIDGE_IDLE_TIMEOUT_MS", default_value = "2000")]
    pub idle_timeout_ms: u64,

    /// Hard timeout for a screenshot capture, in ms.
    #[arg(long, env = "BRIDGE_SCREENSHOT_TIMEOUT_MS", default_value = "30000")]
    pub screenshot_timeout_ms: u64,

    /// Custom capture command run via `sh -c`; `{path}` is replaced by the
    /// shell-quoted PNG path the command must write.
    #[arg(long, env = "BRIDGE_SCREENSHOT_CMD")]
    pub screenshot_cmd: Option<String>,

    /// Extra error pattern (regex) for output classification (repeatable).
    #[arg(long = "error-pattern")]
    pub error_patterns: Vec<String>,

    /// Delay between SIGHUP and SIGKILL when a session is removed, in ms.
    #[arg(long, env = "BRIDGE_KILL_GRACE_MS", default_value = "2000")]
    pub kill_grace_ms: u64,

    /// Log format (text or json).
    #[arg(long, env = "BRIDGE_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error) or an EnvFilter directive.
    #[arg(long, env = "BRIDGE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cols == 0 || self.rows == 0 {
            anyhow::bail!("--cols and --rows must be non-zero");
        }
        if self.idle_timeout_ms == 0 {
            anyhow::bail!("--idle-timeout-ms must be non-zero");
        }
        if self.screenshot_timeout_ms == 0 {
            anyhow::bail!("--screenshot-timeout-ms must be non-zero");
        }
        self.log_format()?;

        if let Some(ref cwd) = self.cwd {
            if !cwd.is_dir() {
                anyhow::bail!("--cwd is not a directory: {}", cwd.display());
            }
        }

        // Compile once here so a bad regex fails before anything starts.
        self.classifier()?;
        Ok(())
    }

    /// Parse the log format string into an enum.
    pub fn log_format(&self) -> anyhow::Result<LogFormat> {
        self.log_format.parse()
    }

    /// Resolved shell program: flag, then `$SHELL`, then [`FALLBACK_SHELL`].
    pub fn shell(&self) -> String {
        self.shell
            .clone()
            .or_else(|| std::env::var("SHELL").ok())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| FALLBACK_SHELL.to_owned())
    }

    /// Resolved default working directory.
    pub fn default_cwd(&self) -> PathBuf {
        if let Some(ref cwd) = self.cwd {
            return cwd.clone();
        }
        std::env::current_dir()
            .ok()
            .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("/"))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn screenshot_timeout(&self) -> Duration {
        Duration::from_millis(self.screenshot_timeout_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    /// Built-in error patterns plus any `--error-pattern` extras.
    pub fn classifier(&self) -> anyhow::Result<OutputClassifier> {
        OutputClassifier::new(&self.error_patterns)
    }

    /// Environment added to every child shell.
    pub fn child_env(&self) -> Vec<(String, String)> {
        vec![
            ("TERM".to_owned(), "xterm-256color".to_owned()),
            ("TERMBRIDGE".to_owned(), "1".to_owned()),
        ]
    }

    /// Build a minimal `Config` for tests (port 0, `/bin/sh`).
    #[doc(hidden)]
    pub fn test() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            shell: Some("/bin/sh".into()),
            shell_args: Vec::new(),
            cwd: None,
            session_name: "main".into(),
            cols: 80,
            rows: 24,
            idle_timeout_ms: 150,
            screenshot_timeout_ms: 1_000,
            screenshot_cmd: None,
            error_patterns: Vec::new(),
            kill_grace_ms: 200,
            log_format: "text".into(),
            log_level: "debug".into(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
