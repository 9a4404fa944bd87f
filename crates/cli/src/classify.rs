// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cleanup and success/failure classification of captured command output.

use regex::Regex;

/// Failure markers recognised in command output, in evaluation order.
///
/// Order does not change the outcome; the first hit is reported for logging.
pub const BUILTIN_ERROR_PATTERNS: &[&str] = &[
    r"(?i)Error:",
    r"ERR!",
    r"ENOENT",
    r"EACCES",
    r"EADDRINUSE",
    r"SyntaxError",
    r"TypeError",
    r"ReferenceError",
    r"ModuleNotFoundError",
    r"Traceback",
    r"FAILED",
    r"npm ERR",
    r"command not found",
    r"Permission denied",
    r"Cannot find module",
    r"FATAL",
];

/// CSI (`ESC [ params final`), OSC (`ESC ] ... BEL` or `ESC ] ... ESC \`),
/// charset designation, and two-byte `ESC x` escapes.
const ANSI_ESCAPE: &str = r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)?|\x1b[()#][0-9A-Za-z]|\x1b[@-_=>78]";

/// Result of classifying one completed command window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub has_error: bool,
    /// Source text of the first pattern that matched.
    pub matched: Option<String>,
}

impl Classification {
    /// Exit-code surrogate reported to clients.
    pub fn exit_code(&self) -> i32 {
        if self.has_error {
            1
        } else {
            0
        }
    }
}

/// Compiled ANSI stripper plus the ordered error matcher set.
pub struct OutputClassifier {
    ansi: Regex,
    patterns: Vec<Regex>,
}

impl std::fmt::Debug for OutputClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputClassifier").field("patterns", &self.patterns.len()).finish()
    }
}

impl OutputClassifier {
    /// Compile the built-in pattern set followed by any `extra` patterns.
    pub fn new(extra: &[String]) -> anyhow::Result<Self> {
        let ansi = Regex::new(ANSI_ESCAPE)?;
        let patterns = BUILTIN_ERROR_PATTERNS
            .iter()
            .copied()
            .chain(extra.iter().map(String::as_str))
            .map(Regex::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { ansi, patterns })
    }

    /// Strip escape sequences and carriage returns, then trim surrounding whitespace.
    pub fn clean(&self, raw: &str) -> String {
        let stripped = self.ansi.replace_all(raw, "");
        stripped.replace('\r', "").trim().to_owned()
    }

    /// Run the matcher set against already-cleaned text.
    pub fn classify(&self, text: &str) -> Classification {
        match self.patterns.iter().find(|p| p.is_match(text)) {
            Some(p) => Classification { has_error: true, matched: Some(p.as_str().to_owned()) },
            None => Classification { has_error: false, matched: None },
        }
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

#[cfg(test)]
#[path = "classify_tests.rs"]
mod tests;
