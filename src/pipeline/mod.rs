// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Build pipeline
//!
//! A [`Pipeline`] owns the stage registry and the executor of one project.
//! Addins register stages when the pipeline opens; passes then drive them
//! phase by phase.

mod context;
mod events;
mod executor;
mod phase;
mod registry;

pub use context::PipelineContext;
pub use events::{EventSender, ExecutorState, PipelineEvent, StageAction, EVENT_CAPACITY};
pub use executor::{PassReport, PipelineExecutor, StageRun, StageStatus};
pub use phase::Phase;
pub use registry::{same_stage, StageRegistry};

use std::os::fd::OwnedFd;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::addins::{default_addins, Addin, AddinSet};
use crate::config::{detect_build_system, ProjectConfig};
use crate::errors::{BuildlineError, BuildlineResult};
use crate::progress::DiagnosticPatterns;
use crate::stages::Stage;
use executor::Pass;

/// A project's build pipeline
pub struct Pipeline {
    context: Arc<PipelineContext>,
    registry: StageRegistry,
    executor: PipelineExecutor,
    pty: Mutex<Option<OwnedFd>>,
    patterns: DiagnosticPatterns,
    addins: tokio::sync::Mutex<AddinSet>,
    disposed: AtomicBool,
}

impl Pipeline {
    /// Create an empty pipeline around `context`
    pub fn new(context: PipelineContext) -> Self {
        let context = Arc::new(context);
        let events = context.events().clone();
        Self {
            registry: StageRegistry::new(events.clone()),
            executor: PipelineExecutor::new(events),
            context,
            pty: Mutex::new(None),
            patterns: DiagnosticPatterns::default(),
            addins: tokio::sync::Mutex::new(AddinSet::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Recognize additional compiler message formats
    pub fn with_error_formats(mut self, formats: &[String]) -> BuildlineResult<Self> {
        self.patterns = DiagnosticPatterns::new(formats)?;
        Ok(self)
    }

    /// Open the project in `srcdir` and load the default addins
    pub async fn open(srcdir: &Path, config: &ProjectConfig) -> BuildlineResult<Self> {
        let build_system = config
            .build_system
            .clone()
            .or_else(|| detect_build_system(srcdir).map(str::to_string));

        let context = PipelineContext::new(config.project_name(srcdir), srcdir, config.builddir_in(srcdir))
            .with_sdk(config.sdk.create())
            .with_build_system(build_system)
            .with_config_opts(config.config_opts.clone());

        info!(
            project = %context.name(),
            build_system = context.build_system().unwrap_or("none"),
            sdk = %context.sdk().id(),
            "opening pipeline"
        );

        let pipeline = Self::new(context).with_error_formats(&config.error_formats)?;
        pipeline.load_addins(default_addins(config)).await?;
        Ok(pipeline)
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.context
    }

    pub fn setenv(&self, key: impl Into<String>, value: impl Into<String>) {
        self.context.setenv(key, value);
    }

    pub fn unsetenv(&self, key: &str) {
        self.context.unsetenv(key);
    }

    /// Register a stage
    pub fn add_stage(&self, stage: Arc<dyn Stage>) -> BuildlineResult<()> {
        self.ensure_live()?;
        self.registry.register(stage)
    }

    /// Unregister a stage; returns whether it was registered
    pub fn remove_stage(&self, stage: &Arc<dyn Stage>) -> bool {
        self.registry.unregister(stage)
    }

    /// All stages in execution order
    pub fn stages(&self) -> Vec<Arc<dyn Stage>> {
        self.registry.all()
    }

    pub fn stages_in(&self, phase: Phase) -> Vec<Arc<dyn Stage>> {
        self.registry.list(phase)
    }

    pub fn find_stage(&self, kind: &str) -> BuildlineResult<Arc<dyn Stage>> {
        self.registry.find(kind)
    }

    /// Send subprocess output of later stages to this terminal descriptor
    pub fn set_pty(&self, pty: Option<OwnedFd>) {
        *self.pty.lock().unwrap_or_else(PoisonError::into_inner) = pty;
    }

    pub(crate) fn dup_pty(&self) -> BuildlineResult<Option<OwnedFd>> {
        let pty = self.pty.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(pty.as_ref().map(OwnedFd::try_clone).transpose()?)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.context.subscribe()
    }

    pub fn state(&self) -> ExecutorState {
        self.executor.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ExecutorState> {
        self.executor.watch()
    }

    pub fn is_busy(&self) -> bool {
        self.executor.is_busy()
    }

    /// Build every phase up to and including `build`
    pub async fn build(&self) -> BuildlineResult<PassReport> {
        self.build_to(Phase::Build).await
    }

    /// Build every phase up to and including `target`
    pub async fn build_to(&self, target: Phase) -> BuildlineResult<PassReport> {
        self.execute(Pass::Build(target)).await
    }

    /// Build up to the install phase, running install hooks for install stages
    pub async fn install(&self) -> BuildlineResult<PassReport> {
        self.execute(Pass::Install).await
    }

    /// Run every stage's clean hook in reverse order
    pub async fn clean(&self) -> BuildlineResult<PassReport> {
        self.execute(Pass::Clean).await
    }

    /// Purge every stage, then delete the build directory
    pub async fn purge(&self) -> BuildlineResult<PassReport> {
        self.execute(Pass::Purge).await
    }

    /// Purge, then build from scratch up to `build`
    pub async fn rebuild(&self) -> BuildlineResult<PassReport> {
        self.rebuild_to(Phase::Build).await
    }

    pub async fn rebuild_to(&self, target: Phase) -> BuildlineResult<PassReport> {
        self.execute(Pass::Rebuild(target)).await
    }

    /// Cancel the running pass, if any
    pub fn cancel(&self) -> bool {
        let cancelled = self.executor.cancel();
        if cancelled {
            info!(pipeline = %self.context.name(), "cancelling");
        }
        cancelled
    }

    /// Mark one stage incomplete
    pub fn invalidate(&self, stage: &Arc<dyn Stage>) {
        stage.invalidate();
        self.context.emit(PipelineEvent::StageInvalidated {
            kind: stage.kind().to_string(),
        });
    }

    /// Mark every stage of `kind` incomplete; returns how many matched
    pub fn invalidate_kind(&self, kind: &str) -> BuildlineResult<usize> {
        let matching: Vec<_> = self
            .registry
            .all()
            .into_iter()
            .filter(|stage| stage.kind() == kind)
            .collect();
        if matching.is_empty() {
            return Err(BuildlineError::StageNotFound {
                kind: kind.to_string(),
            });
        }
        for stage in &matching {
            self.invalidate(stage);
        }
        Ok(matching.len())
    }

    /// Mark every stage in `phase` and later phases incomplete
    pub fn invalidate_from(&self, phase: Phase) -> usize {
        let mut count = 0;
        for phase in phase.and_later() {
            for stage in self.registry.list(phase) {
                self.invalidate(&stage);
                count += 1;
            }
        }
        count
    }

    pub fn invalidate_all(&self) {
        for stage in self.registry.all() {
            self.invalidate(&stage);
        }
    }

    /// Load addins in order; stops at the first that fails
    pub async fn load_addins(&self, addins: Vec<Box<dyn Addin>>) -> BuildlineResult<()> {
        let mut set = self.addins.lock().await;
        for addin in addins {
            set.load(self, addin).await?;
        }
        Ok(())
    }

    /// Cancel, unload addins and drop every stage
    ///
    /// Passes started afterwards fail with `PipelineDisposed`.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel();
        self.addins.lock().await.unload_all(self).await;
        let removed = self.registry.clear();
        debug!(pipeline = %self.context.name(), stages = removed.len(), "disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> BuildlineResult<()> {
        if self.is_disposed() {
            return Err(BuildlineError::PipelineDisposed);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("context", &self.context)
            .field("stages", &self.registry.len())
            .field("state", &self.state())
            .finish()
    }
}
