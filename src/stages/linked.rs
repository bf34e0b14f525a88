// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Another pipeline built as a stage of this one

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use super::{Stage, StageState};
use crate::errors::{BuildlineError, BuildlineResult};
use crate::pipeline::{PassReport, Phase, Pipeline};
use crate::progress::BuildProgress;

/// Drives a linked workspace's pipeline when this stage runs
#[derive(Debug)]
pub struct LinkedPipelineStage {
    pipeline: Arc<Pipeline>,
    phase: Phase,
    state: StageState,
}

impl LinkedPipelineStage {
    pub fn new(pipeline: Arc<Pipeline>, phase: Phase) -> Self {
        Self {
            pipeline,
            phase,
            state: StageState::new(),
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Await a pass of the linked pipeline, cancelling it with ours
    async fn follow<F>(&self, pass: F, progress: &BuildProgress) -> BuildlineResult<()>
    where
        F: Future<Output = BuildlineResult<PassReport>>,
    {
        tokio::pin!(pass);
        tokio::select! {
            result = &mut pass => return result.map(|_| ()),
            _ = progress.cancellable().cancelled() => {}
        }

        self.pipeline.cancel();
        let _ = pass.await;
        Err(BuildlineError::Cancelled)
    }
}

#[async_trait]
impl Stage for LinkedPipelineStage {
    fn kind(&self) -> &str {
        "linked-workspace"
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn title(&self) -> String {
        format!("Build {}", self.pipeline.context().name())
    }

    fn state(&self) -> &StageState {
        &self.state
    }

    async fn build(&self, progress: &BuildProgress) -> BuildlineResult<()> {
        self.follow(self.pipeline.build(), progress).await
    }

    async fn clean(&self, progress: &BuildProgress) -> BuildlineResult<()> {
        self.follow(self.pipeline.clean(), progress).await
    }

    async fn install(&self, progress: &BuildProgress) -> BuildlineResult<()> {
        self.follow(self.pipeline.install(), progress).await
    }

    async fn purge(&self, progress: &BuildProgress) -> BuildlineResult<()> {
        self.follow(self.pipeline.purge(), progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineContext;
    use crate::stages::{Command, CommandStage};

    #[tokio::test]
    async fn test_linked_pipeline_builds_first() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("order.txt");

        let library = Arc::new(Pipeline::new(PipelineContext::new(
            "libfoo",
            dir.path().join("libfoo"),
            dir.path().join("libfoo/_build"),
        )));
        library
            .add_stage(Arc::new(CommandStage::new("lib", Phase::Build).with_build(
                Command::shell(format!("echo lib >> {}", marker.display())),
            )))
            .unwrap();

        let app = Pipeline::new(PipelineContext::new(
            "app",
            dir.path().join("app"),
            dir.path().join("app/_build"),
        ));
        let linked = LinkedPipelineStage::new(library.clone(), Phase::Dependencies);
        assert_eq!(linked.title(), "Build libfoo");
        app.add_stage(Arc::new(linked)).unwrap();
        app.add_stage(Arc::new(CommandStage::new("app", Phase::Build).with_build(
            Command::shell(format!("echo app >> {}", marker.display())),
        )))
        .unwrap();

        app.build().await.unwrap();
        assert_eq!(std::fs::read_to_string(&marker).unwrap(), "lib\napp\n");
        assert!(!library.is_busy());
    }
}
