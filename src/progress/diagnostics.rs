// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Diagnostic extraction from build output
//!
//! Compiler output is scanned line by line. Color escapes are removed,
//! `make`/`ninja` directory changes are tracked so relative file names can be
//! resolved, and lines matching an error format become [`BuildDiagnostic`]s.

use regex::{Captures, Regex};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::errors::BuildlineResult;

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("constant regex pattern is valid")
});

static ENTERING_DIRECTORY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Entering directory [`'](?P<dir>[^'`]+)'").expect("constant regex pattern is valid")
});

static GCC_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<file>[^:\s][^:]*):(?P<line>\d+):(?:(?P<column>\d+):)?\s*(?P<level>fatal error|error|warning|note):\s*(?P<message>.*)$",
    )
    .expect("constant regex pattern is valid")
});

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Note,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    fn parse(level: &str) -> Self {
        match level.trim().to_lowercase().as_str() {
            "fatal error" | "fatal" => Self::Fatal,
            "error" => Self::Error,
            "warning" => Self::Warning,
            _ => Self::Note,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal error",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compiler diagnostic found in build output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildDiagnostic {
    pub file: PathBuf,
    pub line: u32,
    pub column: Option<u32>,
    pub severity: Severity,
    pub message: String,
}

/// Compiled error formats for a pipeline
///
/// The built-in GCC/Clang format is always tried last. Extra formats must
/// provide `file`, `line` and `message` named groups; `column` and `level`
/// are optional.
#[derive(Debug, Clone)]
pub struct DiagnosticPatterns {
    formats: Vec<Regex>,
}

impl DiagnosticPatterns {
    pub fn new(extra: &[String]) -> BuildlineResult<Self> {
        let mut formats = Vec::with_capacity(extra.len() + 1);
        for pattern in extra {
            formats.push(Regex::new(pattern)?);
        }
        formats.push(GCC_FORMAT.clone());
        Ok(Self { formats })
    }
}

impl Default for DiagnosticPatterns {
    fn default() -> Self {
        Self {
            formats: vec![GCC_FORMAT.clone()],
        }
    }
}

/// Stateful line scanner for one stage's output
#[derive(Debug)]
pub struct DiagnosticExtractor {
    patterns: DiagnosticPatterns,
    directory: PathBuf,
}

impl DiagnosticExtractor {
    /// `directory` resolves relative file names until the output says otherwise
    pub fn new(patterns: DiagnosticPatterns, directory: impl Into<PathBuf>) -> Self {
        Self {
            patterns,
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Feed one line of output
    pub fn feed(&mut self, line: &str) -> Option<BuildDiagnostic> {
        let line = strip_ansi(line);

        if let Some(caps) = ENTERING_DIRECTORY.captures(&line) {
            self.directory = PathBuf::from(&caps["dir"]);
            return None;
        }

        self.patterns
            .formats
            .iter()
            .find_map(|format| format.captures(&line))
            .and_then(|caps| self.diagnostic_from(&caps))
    }

    fn diagnostic_from(&self, caps: &Captures<'_>) -> Option<BuildDiagnostic> {
        let file = caps.name("file")?.as_str();
        let line = caps.name("line")?.as_str().parse().ok()?;
        let message = caps.name("message")?.as_str().trim().to_string();
        let column = caps.name("column").and_then(|c| c.as_str().parse().ok());
        let severity = caps
            .name("level")
            .map(|level| Severity::parse(level.as_str()))
            .unwrap_or(Severity::Error);

        let path = Path::new(file);
        let file = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.directory.join(path)
        };

        Some(BuildDiagnostic {
            file,
            line,
            column,
            severity,
            message,
        })
    }
}

/// Remove terminal color and cursor escapes
pub fn strip_ansi(line: &str) -> std::borrow::Cow<'_, str> {
    ANSI_ESCAPE.replace_all(line, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> DiagnosticExtractor {
        DiagnosticExtractor::new(DiagnosticPatterns::default(), "/work/_build")
    }

    #[test]
    fn test_gcc_error_with_column() {
        let diag = extractor()
            .feed("../src/main.c:12:5: error: expected ';' before '}' token")
            .unwrap();
        assert_eq!(diag.file, PathBuf::from("/work/_build/../src/main.c"));
        assert_eq!(diag.line, 12);
        assert_eq!(diag.column, Some(5));
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.message, "expected ';' before '}' token");
    }

    #[test]
    fn test_colored_warning_without_column() {
        let line = "\x1b[1m/abs/lib.c:3:\x1b[0m \x1b[35mwarning:\x1b[0m unused variable 'x'";
        let diag = extractor().feed(line).unwrap();
        assert_eq!(diag.file, PathBuf::from("/abs/lib.c"));
        assert_eq!(diag.column, None);
        assert_eq!(diag.severity, Severity::Warning);
    }

    #[test]
    fn test_entering_directory_changes_resolution() {
        let mut ex = extractor();
        assert!(ex.feed("make[1]: Entering directory '/work/sub'").is_none());
        assert_eq!(ex.directory(), Path::new("/work/sub"));

        let diag = ex.feed("foo.c:1: fatal error: bar.h: No such file").unwrap();
        assert_eq!(diag.file, PathBuf::from("/work/sub/foo.c"));
        assert_eq!(diag.severity, Severity::Fatal);
    }

    #[test]
    fn test_plain_output_is_ignored() {
        assert!(extractor().feed("[3/10] Compiling C object foo.o").is_none());
    }

    #[test]
    fn test_custom_format_is_tried_first() {
        let patterns = DiagnosticPatterns::new(&[
            r"^(?P<file>\S+\.vala)\.(?P<line>\d+)\.\d+-\d+\.\d+: (?P<level>error|warning): (?P<message>.*)$"
                .to_string(),
        ])
        .unwrap();
        let mut ex = DiagnosticExtractor::new(patterns, "/src");
        let diag = ex.feed("app.vala.7.1-7.9: warning: deprecated").unwrap();
        assert_eq!(diag.file, PathBuf::from("/src/app.vala"));
        assert_eq!(diag.line, 7);
        assert_eq!(diag.severity, Severity::Warning);
    }

    #[test]
    fn test_invalid_custom_format_is_rejected() {
        assert!(DiagnosticPatterns::new(&["(unclosed".to_string()]).is_err());
    }
}
