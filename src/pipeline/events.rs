// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Pipeline notifications
//!
//! The registry and executor publish what they do on a broadcast channel so
//! that terminal output, watchers and tests can observe a pass without the
//! core knowing about any of them.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::broadcast;

use super::Phase;
use crate::progress::BuildDiagnostic;

/// Number of buffered events before slow subscribers start lagging
pub const EVENT_CAPACITY: usize = 1024;

/// Executor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorState {
    Idle,
    Preparing,
    Running(Phase),
    Completed,
    Failed,
    Cancelled,
}

impl ExecutorState {
    /// Whether the state ends a pass
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Preparing => f.write_str("preparing"),
            Self::Running(phase) => write!(f, "running {}", phase),
            Self::Completed => f.write_str("completed"),
            Self::Failed => f.write_str("failed"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Which stage hook a pass invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageAction {
    Build,
    Clean,
    Install,
    Purge,
}

impl StageAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Clean => "clean",
            Self::Install => "install",
            Self::Purge => "purge",
        }
    }
}

impl fmt::Display for StageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something observable happened to a pipeline
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    StageAdded {
        kind: String,
        phase: Phase,
    },
    StageRemoved {
        kind: String,
        phase: Phase,
    },
    StageInvalidated {
        kind: String,
    },
    StateChanged(ExecutorState),
    StageStarted {
        kind: String,
        title: String,
        phase: Phase,
        action: StageAction,
    },
    StageSkipped {
        kind: String,
        title: String,
        phase: Phase,
    },
    StageFinished {
        kind: String,
        title: String,
        action: StageAction,
        success: bool,
        duration: Duration,
    },
    /// One line of captured subprocess output, or a message printed by a stage
    Output {
        kind: String,
        line: String,
    },
    Diagnostic(BuildDiagnostic),
}

/// Sending half shared by the context and the registry
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventSender {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Publish an event; having no subscribers is not an error
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventSender {
    fn default() -> Self {
        Self::new()
    }
}
