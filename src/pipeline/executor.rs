// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Pipeline executor
//!
//! Drives build, install, clean and purge passes over the registered stages.
//! Phases run in ascending order (descending for clean and purge) and stages
//! run one at a time in registration order. Build, install and purge stop at
//! the first failing stage; clean attempts every stage and reports all
//! failures together.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::events::{EventSender, ExecutorState, PipelineEvent, StageAction};
use super::{Phase, Pipeline};
use crate::errors::{BuildlineError, BuildlineResult};
use crate::progress::{BuildDiagnostic, BuildProgress, Cancellable};
use crate::stages::Stage;
use crate::utils::contains_path;

/// Which operation a pass performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pass {
    Build(Phase),
    Install,
    Clean,
    Purge,
    Rebuild(Phase),
}

/// A stage the pass ran or skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRun {
    pub kind: String,
    pub title: String,
    pub phase: Phase,
    pub action: StageAction,
}

impl StageRun {
    fn new(stage: &dyn Stage, action: StageAction) -> Self {
        Self {
            kind: stage.kind().to_string(),
            title: stage.title(),
            phase: stage.phase(),
            action,
        }
    }
}

/// Outcome of a successful pass
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    pub executed: Vec<StageRun>,
    pub skipped: Vec<StageRun>,
    pub diagnostics: Vec<BuildDiagnostic>,
    pub artifacts: Vec<PathBuf>,
    pub duration: Duration,
}

/// Query result for one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageStatus {
    pub kind: String,
    pub title: String,
    pub phase: Phase,
    pub completed: bool,
}

/// Single-flight marker and state machine of a pipeline
pub struct PipelineExecutor {
    in_flight: AtomicBool,
    state: watch::Sender<ExecutorState>,
    current: Mutex<Option<Cancellable>>,
    events: EventSender,
}

/// Held for the duration of a pass; releasing it returns the executor to idle
pub(crate) struct FlightGuard<'a> {
    executor: &'a PipelineExecutor,
    cancellable: Cancellable,
}

impl FlightGuard<'_> {
    pub(crate) fn cancellable(&self) -> &Cancellable {
        &self.cancellable
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        *self
            .executor
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        if self.executor.state() != ExecutorState::Idle {
            self.executor.transition(ExecutorState::Idle);
        }
        self.executor.in_flight.store(false, Ordering::Release);
    }
}

impl PipelineExecutor {
    pub fn new(events: EventSender) -> Self {
        let (state, _) = watch::channel(ExecutorState::Idle);
        Self {
            in_flight: AtomicBool::new(false),
            state,
            current: Mutex::new(None),
            events,
        }
    }

    pub fn state(&self) -> ExecutorState {
        *self.state.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<ExecutorState> {
        self.state.subscribe()
    }

    /// Whether a pass or query is running
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Claim the pipeline, or fail without waiting if it is taken
    pub(crate) fn begin(&self) -> BuildlineResult<FlightGuard<'_>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BuildlineError::AlreadyInProgress);
        }

        let cancellable = Cancellable::new();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(cancellable.clone());
        Ok(FlightGuard {
            executor: self,
            cancellable,
        })
    }

    pub(crate) fn transition(&self, state: ExecutorState) {
        debug!(%state, "executor state");
        self.state.send_replace(state);
        self.events.emit(PipelineEvent::StateChanged(state));
    }

    /// Cancel the running pass; returns whether one was running
    pub fn cancel(&self) -> bool {
        match self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(cancellable) => {
                cancellable.cancel();
                true
            }
            None => false,
        }
    }
}

async fn invoke(stage: &dyn Stage, action: StageAction, progress: &BuildProgress) -> BuildlineResult<()> {
    match action {
        StageAction::Build => stage.build(progress).await,
        StageAction::Clean => stage.clean(progress).await,
        StageAction::Install => stage.install(progress).await,
        StageAction::Purge => stage.purge(progress).await,
    }
}

async fn invoke_with_deadline(
    stage: &dyn Stage,
    action: StageAction,
    progress: &BuildProgress,
    limit: Duration,
) -> BuildlineResult<()> {
    let hook = invoke(stage, action, progress);
    tokio::pin!(hook);

    tokio::select! {
        result = &mut hook => return result,
        _ = tokio::time::sleep(limit) => {}
    }

    warn!(stage = %stage.title(), ?limit, "deadline exceeded");
    progress.cancellable().cancel();
    let _ = hook.await;

    Err(BuildlineError::Timeout {
        stage: stage.title(),
        limit,
    })
}

impl Pipeline {
    pub(crate) async fn execute(&self, pass: Pass) -> BuildlineResult<PassReport> {
        self.ensure_live()?;
        let guard = self.executor.begin()?;
        let cancellable = guard.cancellable().clone();

        info!(pipeline = %self.context.name(), ?pass, "starting pass");
        let start = Instant::now();
        let mut report = PassReport::default();
        let result = self.drive(pass, &cancellable, &mut report).await;
        report.duration = start.elapsed();

        let terminal = match &result {
            Ok(()) => ExecutorState::Completed,
            Err(e) if e.is_cancelled() => ExecutorState::Cancelled,
            Err(_) => ExecutorState::Failed,
        };
        self.executor.transition(terminal);
        drop(guard);

        result.map(|()| report)
    }

    /// Query every stage without running anything
    pub async fn query(&self) -> BuildlineResult<Vec<StageStatus>> {
        self.ensure_live()?;
        let _guard = self.executor.begin()?;

        let mut statuses = Vec::new();
        for stage in self.registry.all() {
            let completed = self.query_stage(&stage).await;
            statuses.push(StageStatus {
                kind: stage.kind().to_string(),
                title: stage.title(),
                phase: stage.phase(),
                completed,
            });
        }
        Ok(statuses)
    }

    async fn drive(
        &self,
        pass: Pass,
        cancellable: &Cancellable,
        report: &mut PassReport,
    ) -> BuildlineResult<()> {
        self.executor.transition(ExecutorState::Preparing);
        self.prepare_pass().await?;

        match pass {
            Pass::Build(target) => self.run_forward(target, false, cancellable, report).await,
            Pass::Install => self.run_forward(Phase::Install, true, cancellable, report).await,
            Pass::Clean => self.run_clean(cancellable, report).await,
            Pass::Purge => self.run_purge(cancellable, report).await,
            Pass::Rebuild(target) => {
                self.run_purge(cancellable, report).await?;
                self.prepare_pass().await?;
                self.run_forward(target, false, cancellable, report).await
            }
        }
    }

    async fn prepare_pass(&self) -> BuildlineResult<()> {
        let sdk = self.context.sdk();
        if !sdk.installed().await {
            return Err(BuildlineError::SdkUnavailable {
                sdk: sdk.id().to_string(),
            });
        }

        tokio::fs::create_dir_all(self.context.builddir()).await?;
        debug!(
            sdk = %sdk.id(),
            builddir = %self.context.builddir().display(),
            env = ?self.context.environment(),
            "prepared"
        );
        Ok(())
    }

    async fn run_forward(
        &self,
        target: Phase,
        install: bool,
        cancellable: &Cancellable,
        report: &mut PassReport,
    ) -> BuildlineResult<()> {
        for phase in target.up_to() {
            cancellable.check()?;
            let stages = self.registry.list(phase);
            if stages.is_empty() {
                continue;
            }

            self.executor.transition(ExecutorState::Running(phase));
            let action = if install && phase == Phase::Install {
                StageAction::Install
            } else {
                StageAction::Build
            };

            for stage in stages {
                cancellable.check()?;

                if self.query_stage(&stage).await {
                    debug!(stage = %stage.title(), "already complete");
                    self.context.emit(PipelineEvent::StageSkipped {
                        kind: stage.kind().to_string(),
                        title: stage.title(),
                        phase,
                    });
                    report.skipped.push(StageRun::new(stage.as_ref(), action));
                    continue;
                }

                self.run_stage(&stage, action, cancellable, report).await?;
                if action == StageAction::Build {
                    stage.state().set_completed(true);
                }
            }
        }
        Ok(())
    }

    async fn run_clean(&self, cancellable: &Cancellable, report: &mut PassReport) -> BuildlineResult<()> {
        let mut errors = Vec::new();

        for phase in Phase::ALL.into_iter().rev() {
            let stages = self.registry.list(phase);
            if stages.is_empty() {
                continue;
            }
            cancellable.check()?;
            self.executor.transition(ExecutorState::Running(phase));

            for stage in stages.into_iter().rev() {
                cancellable.check()?;
                let result = self.run_stage(&stage, StageAction::Clean, cancellable, report).await;
                self.invalidate(&stage);

                match result {
                    Ok(()) => {}
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => {
                        warn!(stage = %stage.title(), error = %e, "clean failed, continuing");
                        errors.push(e);
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(BuildlineError::CleanFailed { errors })
        }
    }

    async fn run_purge(&self, cancellable: &Cancellable, report: &mut PassReport) -> BuildlineResult<()> {
        for phase in Phase::ALL.into_iter().rev() {
            let stages = self.registry.list(phase);
            if stages.is_empty() {
                continue;
            }
            cancellable.check()?;
            self.executor.transition(ExecutorState::Running(phase));

            for stage in stages.into_iter().rev() {
                cancellable.check()?;
                self.run_stage(&stage, StageAction::Purge, cancellable, report).await?;
            }
        }

        let builddir = self.context.builddir();
        if contains_path(builddir, self.context.srcdir()).await {
            warn!(builddir = %builddir.display(), "build directory contains the sources, not removing it");
        } else {
            match tokio::fs::remove_dir_all(builddir).await {
                Ok(()) => info!(builddir = %builddir.display(), "removed build directory"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.invalidate_all();
        Ok(())
    }

    /// Ask a stage whether it is complete and remember the answer
    ///
    /// A failing query counts as incomplete.
    pub(crate) async fn query_stage(&self, stage: &Arc<dyn Stage>) -> bool {
        let completed = match stage.query(&self.context).await {
            Ok(completed) => completed,
            Err(e) => {
                warn!(stage = %stage.title(), error = %e, "query failed, assuming incomplete");
                false
            }
        };
        stage.state().set_completed(completed);
        completed
    }

    async fn run_stage(
        &self,
        stage: &Arc<dyn Stage>,
        action: StageAction,
        cancellable: &Cancellable,
        report: &mut PassReport,
    ) -> BuildlineResult<()> {
        let title = stage.title();
        let progress = BuildProgress::new(
            self.context.clone(),
            stage.kind(),
            stage.phase(),
            cancellable.child(),
            self.dup_pty()?,
            self.patterns.clone(),
        );

        info!(stage = %title, %action, "running");
        self.context.emit(PipelineEvent::StageStarted {
            kind: stage.kind().to_string(),
            title: title.clone(),
            phase: stage.phase(),
            action,
        });

        let start = Instant::now();
        let result = match stage.timeout() {
            Some(limit) => invoke_with_deadline(stage.as_ref(), action, &progress, limit).await,
            None => invoke(stage.as_ref(), action, &progress).await,
        };
        let duration = start.elapsed();

        let (diagnostics, artifacts) = progress.finish();
        report.diagnostics.extend(diagnostics);
        report.artifacts.extend(artifacts);

        self.context.emit(PipelineEvent::StageFinished {
            kind: stage.kind().to_string(),
            title: title.clone(),
            action,
            success: result.is_ok(),
            duration,
        });

        match &result {
            Ok(()) => {
                info!(stage = %title, %action, elapsed = ?duration, "finished");
                report.executed.push(StageRun::new(stage.as_ref(), action));
            }
            Err(e) => debug!(stage = %title, %action, error = %e, "failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineContext;
    use crate::process::ProcessLauncher;
    use crate::stages::StageState;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Stage recording every hook call into a shared log
    struct Recording {
        name: String,
        phase: Phase,
        state: StageState,
        log: Log,
        fail_build: bool,
        fail_clean: bool,
        caches: bool,
        builds: AtomicUsize,
        timeout: Option<Duration>,
        gate: Option<(Arc<Notify>, Arc<Notify>)>,
        command: Option<Vec<String>>,
    }

    impl Recording {
        fn new(name: &str, phase: Phase, log: &Log) -> Self {
            Self {
                name: name.to_string(),
                phase,
                state: StageState::new(),
                log: log.clone(),
                fail_build: false,
                fail_clean: false,
                caches: false,
                builds: AtomicUsize::new(0),
                timeout: None,
                gate: None,
                command: None,
            }
        }

        fn record(&self, hook: &str) {
            self.log.lock().unwrap().push(format!("{}:{}", hook, self.name));
        }
    }

    #[async_trait]
    impl Stage for Recording {
        fn kind(&self) -> &str {
            &self.name
        }

        fn phase(&self) -> Phase {
            self.phase
        }

        fn state(&self) -> &StageState {
            &self.state
        }

        fn timeout(&self) -> Option<Duration> {
            self.timeout
        }

        async fn query(&self, _context: &PipelineContext) -> BuildlineResult<bool> {
            Ok(self.caches && self.state.is_completed())
        }

        async fn build(&self, progress: &BuildProgress) -> BuildlineResult<()> {
            self.record("build");
            self.builds.fetch_add(1, Ordering::SeqCst);

            if let Some((started, release)) = &self.gate {
                started.notify_one();
                release.notified().await;
            }

            if let Some(argv) = &self.command {
                let mut launcher = ProcessLauncher::new();
                progress.context().prepare(&mut launcher, self.phase).await?;
                launcher.append_args(argv.iter().cloned());
                return progress.run(launcher).await;
            }

            if self.fail_build {
                return Err(BuildlineError::ProcessExitNonZero {
                    program: self.name.clone(),
                    code: Some(1),
                    signal: None,
                });
            }
            Ok(())
        }

        async fn clean(&self, _progress: &BuildProgress) -> BuildlineResult<()> {
            self.record("clean");
            if self.fail_clean {
                return Err(BuildlineError::StageFailed {
                    stage: self.name.clone(),
                    message: "clean broke".into(),
                });
            }
            Ok(())
        }

        async fn install(&self, _progress: &BuildProgress) -> BuildlineResult<()> {
            self.record("install");
            Ok(())
        }

        async fn purge(&self, _progress: &BuildProgress) -> BuildlineResult<()> {
            self.record("purge");
            Ok(())
        }
    }

    fn pipeline(dir: &tempfile::TempDir) -> Pipeline {
        let srcdir = dir.path().join("src");
        Pipeline::new(PipelineContext::new("test", &srcdir, dir.path().join("build")))
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_build_runs_phases_then_registration_order() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&dir);
        let log = Log::default();

        // Deliberately scrambled registration across phases.
        let plan = [
            ("b1", Phase::Build),
            ("c1", Phase::Configure),
            ("p1", Phase::Prepare),
            ("b2", Phase::Build),
            ("a1", Phase::Autogen),
            ("c2", Phase::Configure),
            ("d1", Phase::Dependencies),
            ("b3", Phase::Build),
        ];
        for (name, phase) in plan {
            pipeline.add_stage(Arc::new(Recording::new(name, phase, &log))).unwrap();
        }

        pipeline.build().await.unwrap();

        let mut expected: Vec<_> = plan.to_vec();
        expected.sort_by_key(|(_, phase)| *phase);
        let expected: Vec<_> = expected.iter().map(|(n, _)| format!("build:{}", n)).collect();
        assert_eq!(entries(&log), expected);
    }

    proptest::proptest! {
        #[test]
        fn prop_build_order_is_stable_sort_by_phase(
            phases in proptest::collection::vec(proptest::sample::select(Phase::ALL.to_vec()), 0..24)
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let dir = tempfile::tempdir().unwrap();
            let pipeline = pipeline(&dir);
            let log = Log::default();

            let plan: Vec<(String, Phase)> = phases
                .iter()
                .enumerate()
                .map(|(i, phase)| (format!("s{}", i), *phase))
                .collect();
            for (name, phase) in &plan {
                pipeline.add_stage(Arc::new(Recording::new(name, *phase, &log))).unwrap();
            }

            runtime.block_on(pipeline.build_to(Phase::Final)).unwrap();

            let mut expected = plan.clone();
            expected.sort_by_key(|(_, phase)| *phase);
            let expected: Vec<_> = expected.iter().map(|(n, _)| format!("build:{}", n)).collect();
            proptest::prop_assert_eq!(entries(&log), expected);
        }
    }

    #[tokio::test]
    async fn test_configure_failure_stops_compile() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&dir);
        let log = Log::default();

        let mut configure = Recording::new("configure", Phase::Configure, &log);
        configure.fail_build = true;
        let compile = Arc::new(Recording::new("compile", Phase::Build, &log));
        pipeline.add_stage(Arc::new(configure)).unwrap();
        pipeline.add_stage(compile.clone()).unwrap();

        let err = pipeline.build().await.unwrap_err();
        assert!(matches!(err, BuildlineError::ProcessExitNonZero { .. }));
        assert_eq!(compile.builds.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.state(), ExecutorState::Idle);
    }

    #[tokio::test]
    async fn test_failed_build_never_reaches_install() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&dir);
        let log = Log::default();

        let mut broken = Recording::new("a", Phase::Build, &log);
        broken.fail_build = true;
        pipeline.add_stage(Arc::new(broken)).unwrap();
        pipeline
            .add_stage(Arc::new(Recording::new("b", Phase::Install, &log)))
            .unwrap();

        assert!(pipeline.install().await.is_err());
        assert_eq!(entries(&log), vec!["build:a"]);
    }

    #[tokio::test]
    async fn test_install_runs_install_hook_for_install_phase() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&dir);
        let log = Log::default();

        pipeline
            .add_stage(Arc::new(Recording::new("compile", Phase::Build, &log)))
            .unwrap();
        pipeline
            .add_stage(Arc::new(Recording::new("inst", Phase::Install, &log)))
            .unwrap();
        pipeline
            .add_stage(Arc::new(Recording::new("pkg", Phase::Export, &log)))
            .unwrap();

        let report = pipeline.install().await.unwrap();
        assert_eq!(entries(&log), vec!["build:compile", "install:inst"]);
        assert_eq!(report.executed.len(), 2);
    }

    #[tokio::test]
    async fn test_clean_attempts_all_and_aggregates() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&dir);
        let log = Log::default();

        let mut first = Recording::new("first", Phase::Configure, &log);
        first.fail_clean = true;
        let mut second = Recording::new("second", Phase::Build, &log);
        second.fail_clean = true;
        pipeline.add_stage(Arc::new(first)).unwrap();
        pipeline.add_stage(Arc::new(second)).unwrap();
        pipeline
            .add_stage(Arc::new(Recording::new("third", Phase::Build, &log)))
            .unwrap();

        let err = pipeline.clean().await.unwrap_err();
        match err {
            BuildlineError::CleanFailed { errors } => {
                assert_eq!(errors.len(), 2);
                let stages: Vec<_> = errors
                    .iter()
                    .map(|e| match e {
                        BuildlineError::StageFailed { stage, .. } => stage.clone(),
                        other => panic!("unexpected error: {other:?}"),
                    })
                    .collect();
                assert_eq!(stages, vec!["second", "first"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(entries(&log), vec!["clean:third", "clean:second", "clean:first"]);
    }

    #[tokio::test]
    async fn test_cached_stages_are_skipped_on_second_build() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&dir);
        let log = Log::default();

        let mut stage = Recording::new("gen", Phase::Build, &log);
        stage.caches = true;
        let stage = Arc::new(stage);
        pipeline.add_stage(stage.clone()).unwrap();

        pipeline.build().await.unwrap();
        let second = pipeline.build().await.unwrap();

        assert_eq!(stage.builds.load(Ordering::SeqCst), 1);
        assert!(second.executed.is_empty());
        assert_eq!(second.skipped.len(), 1);
    }

    #[tokio::test]
    async fn test_second_build_spawns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("spawned");
        let pipeline = pipeline(&dir);
        let log = Log::default();

        let mut stage = Recording::new("touch", Phase::Build, &log);
        stage.caches = true;
        stage.command = Some(vec![
            "sh".into(),
            "-c".into(),
            format!("echo x >> {}", marker.display()),
        ]);
        pipeline.add_stage(Arc::new(stage)).unwrap();

        pipeline.build().await.unwrap();
        pipeline.build().await.unwrap();

        assert_eq!(std::fs::read_to_string(&marker).unwrap(), "x\n");
    }

    #[tokio::test]
    async fn test_query_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&dir);
        let log = Log::default();

        let mut stage = Recording::new("gen", Phase::Build, &log);
        stage.caches = true;
        pipeline.add_stage(Arc::new(stage)).unwrap();
        pipeline.build().await.unwrap();

        let first = pipeline.query().await.unwrap();
        let second = pipeline.query().await.unwrap();
        assert_eq!(first, second);
        assert!(first[0].completed);
        assert_eq!(entries(&log), vec!["build:gen"]);
    }

    #[tokio::test]
    async fn test_invalidate_forces_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&dir);
        let log = Log::default();

        let mut stage = Recording::new("gen", Phase::Build, &log);
        stage.caches = true;
        let stage = Arc::new(stage);
        let handle: Arc<dyn Stage> = stage.clone();
        pipeline.add_stage(handle.clone()).unwrap();

        pipeline.build().await.unwrap();
        assert!(stage.is_completed());

        pipeline.invalidate(&handle);
        assert!(!pipeline.query().await.unwrap()[0].completed);

        pipeline.build().await.unwrap();
        assert_eq!(stage.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_build_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Arc::new(pipeline(&dir));
        let log = Log::default();

        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let mut stage = Recording::new("slow", Phase::Build, &log);
        stage.gate = Some((started.clone(), release.clone()));
        pipeline.add_stage(Arc::new(stage)).unwrap();

        let running = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.build().await })
        };
        started.notified().await;

        assert!(pipeline.is_busy());
        assert!(matches!(
            pipeline.build().await,
            Err(BuildlineError::AlreadyInProgress)
        ));
        assert!(matches!(
            pipeline.clean().await,
            Err(BuildlineError::AlreadyInProgress)
        ));

        release.notify_one();
        running.await.unwrap().unwrap();
        assert!(!pipeline.is_busy());
        pipeline.build().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_stops_running_process() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Arc::new(pipeline(&dir));
        let log = Log::default();

        let mut stage = Recording::new("sleepy", Phase::Build, &log);
        stage.command = Some(vec!["sleep".into(), "30".into()]);
        pipeline.add_stage(Arc::new(stage)).unwrap();
        let after = Arc::new(Recording::new("after", Phase::Install, &log));
        pipeline.add_stage(after.clone()).unwrap();

        let running = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.build_to(Phase::Final).await })
        };
        let mut state = pipeline.watch_state();
        while *state.borrow_and_update() != ExecutorState::Running(Phase::Build) {
            state.changed().await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(pipeline.cancel());

        let err = running.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(after.builds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_deadline_reports_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&dir);
        let log = Log::default();

        let mut stage = Recording::new("hang", Phase::Build, &log);
        stage.command = Some(vec!["sleep".into(), "30".into()]);
        stage.timeout = Some(Duration::from_millis(200));
        pipeline.add_stage(Arc::new(stage)).unwrap();

        let err = pipeline.build().await.unwrap_err();
        assert!(matches!(
            err,
            BuildlineError::Timeout { ref stage, limit }
                if stage == "hang" && limit == Duration::from_millis(200)
        ));
    }

    fn orphaning(name: &str, log: &Log) -> Recording {
        // The shell exits at once and leaves a sleeper holding its output.
        let mut stage = Recording::new(name, Phase::Build, log);
        stage.command = Some(vec![
            "sh".into(),
            "-c".into(),
            "sleep 30 & echo detached; exit 0".into(),
        ]);
        stage
    }

    #[tokio::test]
    async fn test_cancel_reaches_processes_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Arc::new(pipeline(&dir));
        let log = Log::default();
        pipeline.add_stage(Arc::new(orphaning("orphan", &log))).unwrap();

        let running = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.build().await })
        };
        let mut state = pipeline.watch_state();
        while *state.borrow_and_update() != ExecutorState::Running(Phase::Build) {
            state.changed().await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(pipeline.cancel());

        let result = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("cancelled pass should finish promptly")
            .unwrap();
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(pipeline.state(), ExecutorState::Idle);
    }

    #[tokio::test]
    async fn test_deadline_reaches_processes_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&dir);
        let log = Log::default();
        let mut stage = orphaning("orphan", &log);
        stage.timeout = Some(Duration::from_millis(300));
        pipeline.add_stage(Arc::new(stage)).unwrap();

        let err = tokio::time::timeout(Duration::from_secs(5), pipeline.build())
            .await
            .expect("deadline should end the pass promptly")
            .unwrap_err();
        assert!(matches!(err, BuildlineError::Timeout { ref stage, .. } if stage == "orphan"));
    }

    #[tokio::test]
    async fn test_purge_runs_in_reverse_and_removes_builddir() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&dir);
        let log = Log::default();

        pipeline
            .add_stage(Arc::new(Recording::new("conf", Phase::Configure, &log)))
            .unwrap();
        pipeline
            .add_stage(Arc::new(Recording::new("make", Phase::Build, &log)))
            .unwrap();

        pipeline.build().await.unwrap();
        assert!(dir.path().join("build").is_dir());

        pipeline.purge().await.unwrap();
        assert!(!dir.path().join("build").exists());
        assert_eq!(
            entries(&log),
            vec!["build:conf", "build:make", "purge:make", "purge:conf"]
        );
        assert!(pipeline.stages().iter().all(|s| !s.is_completed()));
    }

    #[tokio::test]
    async fn test_purge_keeps_builddir_that_resolves_to_sources() {
        let dir = tempfile::tempdir().unwrap();
        let srcdir = dir.path().join("src");
        std::fs::create_dir_all(srcdir.join("_build")).unwrap();
        std::fs::write(srcdir.join("main.c"), "int main;").unwrap();

        for builddir in [srcdir.join("_build/.."), srcdir.join("..")] {
            let pipeline = Pipeline::new(PipelineContext::new("p", &srcdir, builddir));
            pipeline.purge().await.unwrap();
            assert!(srcdir.join("main.c").exists());
        }
    }

    #[tokio::test]
    async fn test_state_changes_are_published() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&dir);
        let log = Log::default();
        pipeline
            .add_stage(Arc::new(Recording::new("x", Phase::Build, &log)))
            .unwrap();

        let mut events = pipeline.subscribe();
        pipeline.build().await.unwrap();

        let mut states = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let PipelineEvent::StateChanged(state) = event {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            vec![
                ExecutorState::Preparing,
                ExecutorState::Running(Phase::Build),
                ExecutorState::Completed,
                ExecutorState::Idle,
            ]
        );
    }
}
