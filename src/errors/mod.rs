// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Error types for pipeline passes
//!
//! Every failure a caller can observe from a build, clean or install pass is
//! a [`BuildlineError`]. Errors carry miette codes and help text so the CLI
//! can render them directly.

use miette::Diagnostic;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for buildline operations
pub type BuildlineResult<T> = Result<T, BuildlineError>;

/// Main error type for buildline
#[derive(Error, Debug, Diagnostic)]
pub enum BuildlineError {
    // ─────────────────────────────────────────────────────────────────────────
    // Registry Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Stage '{kind}' not found in pipeline")]
    #[diagnostic(
        code(buildline::stage_not_found),
        help("Run 'buildline status' to list the stages registered for this project")
    )]
    StageNotFound { kind: String },

    #[error("Stage '{kind}' is already attached to a pipeline")]
    #[diagnostic(
        code(buildline::duplicate_stage),
        help("A stage instance may only be registered once; create a new stage instead")
    )]
    DuplicateStage { kind: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Another build, clean or install is already running for this pipeline")]
    #[diagnostic(
        code(buildline::already_in_progress),
        help("Wait for the running operation to finish or cancel it first")
    )]
    AlreadyInProgress,

    #[error("Operation was cancelled")]
    #[diagnostic(code(buildline::cancelled))]
    Cancelled,

    #[error("Stage '{stage}' exceeded its deadline of {:?}", .limit)]
    #[diagnostic(code(buildline::timeout))]
    Timeout { stage: String, limit: Duration },

    #[error("Stage '{stage}' failed: {message}")]
    #[diagnostic(code(buildline::stage_failed))]
    StageFailed { stage: String, message: String },

    #[error("Clean failed for {} stage(s)", errors.len())]
    #[diagnostic(
        code(buildline::clean_failed),
        help("Every stage's clean step was attempted; see the related errors")
    )]
    CleanFailed {
        #[related]
        errors: Vec<BuildlineError>,
    },

    #[error("Pipeline was disposed")]
    #[diagnostic(code(buildline::pipeline_disposed))]
    PipelineDisposed,

    // ─────────────────────────────────────────────────────────────────────────
    // Process Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to spawn '{program}': {error}")]
    #[diagnostic(code(buildline::process_spawn_failed))]
    ProcessSpawnFailed {
        program: String,
        error: String,
        #[help]
        help: Option<String>,
    },

    #[error("'{program}' {}", describe_exit(.code, .signal))]
    #[diagnostic(code(buildline::process_exit_non_zero))]
    ProcessExitNonZero {
        program: String,
        code: Option<i32>,
        signal: Option<i32>,
    },

    #[error("Program '{program}' was not found")]
    #[diagnostic(
        code(buildline::program_not_found),
        help("Install {program} inside the active SDK or adjust PATH")
    )]
    ProgramNotFound { program: String },

    // ─────────────────────────────────────────────────────────────────────────
    // SDK Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("SDK '{sdk}' is not installed")]
    #[diagnostic(
        code(buildline::sdk_unavailable),
        help("Install the SDK or switch the project to the host SDK")
    )]
    SdkUnavailable { sdk: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Configuration file not found: {}", path.display())]
    #[diagnostic(
        code(buildline::config_not_found),
        help("Create .buildline.yaml in the project root or pass --config")
    )]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid configuration: {reason}")]
    #[diagnostic(code(buildline::invalid_config))]
    InvalidConfig {
        reason: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(buildline::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(buildline::yaml_error))]
    Yaml { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(buildline::toml_error))]
    Toml { message: String },

    #[error("JSON error: {message}")]
    #[diagnostic(code(buildline::json_error))]
    Json { message: String },

    #[error("Invalid pattern: {message}")]
    #[diagnostic(code(buildline::regex_error))]
    Regex { message: String },

    #[error("Glob pattern error: {message}")]
    #[diagnostic(code(buildline::glob_error))]
    GlobPattern { message: String },

    #[error("File watcher error: {message}")]
    #[diagnostic(code(buildline::watch_error))]
    Watch { message: String },
}

fn describe_exit(code: &Option<i32>, signal: &Option<i32>) -> String {
    match (*code, *signal) {
        (Some(code), _) => format!("exited with status {}", code),
        (None, Some(signal)) => format!("was terminated by signal {}", signal),
        (None, None) => "exited abnormally".to_string(),
    }
}

impl From<std::io::Error> for BuildlineError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for BuildlineError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<toml::de::Error> for BuildlineError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for BuildlineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<regex::Error> for BuildlineError {
    fn from(e: regex::Error) -> Self {
        Self::Regex { message: e.to_string() }
    }
}

impl From<glob::PatternError> for BuildlineError {
    fn from(e: glob::PatternError) -> Self {
        Self::GlobPattern { message: e.to_string() }
    }
}

impl BuildlineError {
    /// Create a spawn failure with a hint derived from the OS error
    pub fn spawn_failed(program: &str, error: &std::io::Error) -> Self {
        let help = match error.kind() {
            std::io::ErrorKind::NotFound => {
                Some(format!("'{}' is not installed or not in PATH", program))
            }
            std::io::ErrorKind::PermissionDenied => {
                Some(format!("'{}' is not executable", program))
            }
            _ => None,
        };

        Self::ProcessSpawnFailed {
            program: program.to_string(),
            error: error.to_string(),
            help,
        }
    }

    /// Whether this error means the pass was cancelled rather than failed
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Errors contained in a clean aggregate, or this error alone
    pub fn flatten(&self) -> Vec<&BuildlineError> {
        match self {
            Self::CleanFailed { errors } => errors.iter().collect(),
            other => vec![other],
        }
    }
}
