// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Per-stage progress
//!
//! The executor creates one [`BuildProgress`] for every hook it invokes and
//! closes it before moving to the next stage. It carries the cancellation
//! token, the terminal descriptor subprocesses write to (if any), and
//! collects diagnostics and artifacts.

mod cancel;
mod diagnostics;

pub use cancel::Cancellable;
pub use diagnostics::{
    strip_ansi, BuildDiagnostic, DiagnosticExtractor, DiagnosticPatterns, Severity,
};

use std::io::Write;
use std::os::fd::OwnedFd;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use crate::errors::BuildlineResult;
use crate::pipeline::{Phase, PipelineContext, PipelineEvent};
use crate::process::{OutputSink, ProcessLauncher};

/// Progress of one stage hook
pub struct BuildProgress {
    context: Arc<PipelineContext>,
    kind: String,
    phase: Phase,
    cancellable: Cancellable,
    pty: Option<OwnedFd>,
    extractor: Arc<Mutex<DiagnosticExtractor>>,
    diagnostics: Arc<Mutex<Vec<BuildDiagnostic>>>,
    artifacts: Mutex<Vec<PathBuf>>,
}

impl BuildProgress {
    pub fn new(
        context: Arc<PipelineContext>,
        kind: impl Into<String>,
        phase: Phase,
        cancellable: Cancellable,
        pty: Option<OwnedFd>,
        patterns: DiagnosticPatterns,
    ) -> Self {
        let extractor = DiagnosticExtractor::new(patterns, context.builddir());
        Self {
            context,
            kind: kind.into(),
            phase,
            cancellable,
            pty,
            extractor: Arc::new(Mutex::new(extractor)),
            diagnostics: Arc::new(Mutex::new(Vec::new())),
            artifacts: Mutex::new(Vec::new()),
        }
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.context
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn cancellable(&self) -> &Cancellable {
        &self.cancellable
    }

    /// Terminal descriptor subprocesses should write to, if any
    pub fn pty(&self) -> Option<&OwnedFd> {
        self.pty.as_ref()
    }

    /// Attach a launcher's stdio to the terminal, or capture its output
    pub fn setup_pty(&self, launcher: &mut ProcessLauncher) -> BuildlineResult<()> {
        match &self.pty {
            Some(pty) => {
                for target in 0..=2 {
                    launcher.take_fd(pty.try_clone()?, target);
                }
            }
            None => launcher.set_output_sink(self.output_sink()),
        }
        Ok(())
    }

    /// Sink publishing captured lines and the diagnostics found in them
    pub fn output_sink(&self) -> OutputSink {
        let context = self.context.clone();
        let kind = self.kind.clone();
        let extractor = self.extractor.clone();
        let diagnostics = self.diagnostics.clone();

        Arc::new(move |line: &str| {
            context.emit(PipelineEvent::Output {
                kind: kind.clone(),
                line: line.to_string(),
            });

            let found = extractor
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .feed(line);
            if let Some(diagnostic) = found {
                context.emit(PipelineEvent::Diagnostic(diagnostic.clone()));
                diagnostics
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(diagnostic);
            }
        })
    }

    /// Prepare the launcher for the pipeline, attach it and wait for success
    pub async fn run(&self, mut launcher: ProcessLauncher) -> BuildlineResult<()> {
        self.cancellable.check()?;
        self.setup_pty(&mut launcher)?;
        launcher.spawn()?.wait_check(&self.cancellable).await
    }

    /// Write a message where subprocess output goes
    pub fn print(&self, message: &str) -> BuildlineResult<()> {
        match &self.pty {
            Some(pty) => {
                let mut out = std::fs::File::from(pty.try_clone()?);
                out.write_all(message.as_bytes())?;
                out.write_all(b"\n")?;
            }
            None => self.context.emit(PipelineEvent::Output {
                kind: self.kind.clone(),
                line: message.to_string(),
            }),
        }
        Ok(())
    }

    /// Record a file produced by the stage
    pub fn add_artifact(&self, path: impl Into<PathBuf>) {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.into());
    }

    pub fn diagnostics(&self) -> Vec<BuildDiagnostic> {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Close the terminal descriptor and hand back what was collected
    pub fn finish(self) -> (Vec<BuildDiagnostic>, Vec<PathBuf>) {
        let diagnostics = self.diagnostics();
        let artifacts = self
            .artifacts
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        (diagnostics, artifacts)
    }
}
