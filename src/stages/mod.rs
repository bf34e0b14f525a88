// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Stages
//!
//! A stage is one unit of build work tagged with a [`Phase`]. The executor
//! asks it whether it is already complete with [`Stage::query`] and runs the
//! hook for the requested operation otherwise.

mod command;
mod just;
mod linked;
mod meson;

pub use command::{Command, CommandStage};
pub use just::JustBuildStage;
pub use linked::LinkedPipelineStage;
pub use meson::{MesonBuildStage, MesonConfigStage, MesonInstallStage};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::errors::{BuildlineError, BuildlineResult};
use crate::pipeline::{Phase, PipelineContext};
use crate::process::ProcessLauncher;
use crate::progress::BuildProgress;

/// Bookkeeping the pipeline keeps for every stage
///
/// `completed` is never persisted; a new pipeline starts with every stage
/// incomplete.
#[derive(Debug, Default)]
pub struct StageState {
    completed: AtomicBool,
    attached: AtomicBool,
}

impl StageState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub fn set_completed(&self, completed: bool) {
        self.completed.store(completed, Ordering::Release);
    }

    /// Mark incomplete so the next pass runs the stage again
    pub fn invalidate(&self) {
        self.set_completed(false);
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Returns `false` if the stage was already attached
    pub(crate) fn attach(&self) -> bool {
        !self.attached.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn detach(&self) {
        self.attached.store(false, Ordering::Release);
        self.invalidate();
    }
}

/// Trait for units of build work
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stable identity of the stage type, such as `meson-build` or `command`
    fn kind(&self) -> &str;

    fn phase(&self) -> Phase;

    /// Human readable title
    fn title(&self) -> String {
        self.kind().to_string()
    }

    fn state(&self) -> &StageState;

    /// Deadline for a single hook invocation
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Report whether the stage's work is already done
    ///
    /// Must not change anything outside the stage. The executor stores the
    /// answer as the stage's completed flag. The default always rebuilds.
    async fn query(&self, _context: &PipelineContext) -> BuildlineResult<bool> {
        Ok(false)
    }

    /// Do the work
    async fn build(&self, progress: &BuildProgress) -> BuildlineResult<()>;

    /// Undo what `build` produced
    async fn clean(&self, _progress: &BuildProgress) -> BuildlineResult<()> {
        Ok(())
    }

    /// Install what `build` produced
    async fn install(&self, _progress: &BuildProgress) -> BuildlineResult<()> {
        Ok(())
    }

    /// Remove state that survives a clean, such as configure caches
    async fn purge(&self, _progress: &BuildProgress) -> BuildlineResult<()> {
        Ok(())
    }

    fn is_completed(&self) -> bool {
        self.state().is_completed()
    }

    fn invalidate(&self) {
        self.state().invalidate();
    }
}

/// Run `argv` inside the pipeline's SDK, checking that its program exists first
pub(crate) async fn run_tool(progress: &BuildProgress, argv: Vec<String>) -> BuildlineResult<()> {
    let context = progress.context();
    if let Some(program) = argv.first() {
        if !context.contains_program(program).await? {
            return Err(BuildlineError::ProgramNotFound {
                program: program.clone(),
            });
        }
    }

    let mut launcher = ProcessLauncher::new();
    context.prepare(&mut launcher, progress.phase()).await?;
    launcher.append_args(argv);
    progress.run(launcher).await
}

impl std::fmt::Debug for dyn Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("kind", &self.kind())
            .field("phase", &self.phase())
            .field("completed", &self.is_completed())
            .finish()
    }
}
