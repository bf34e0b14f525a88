// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Addins
//!
//! Addins populate a pipeline with stages when it opens and take them away
//! again when it is disposed. The set is fixed at compile time; which addins
//! actually register anything depends on the project.

mod commands;
mod environment;
mod just;
mod meson;

pub use commands::CommandsAddin;
pub use environment::EnvironmentAddin;
pub use just::JustAddin;
pub use meson::MesonAddin;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ProjectConfig;
use crate::errors::BuildlineResult;
use crate::pipeline::Pipeline;
use crate::stages::Stage;

/// Extension loaded into a pipeline
#[async_trait]
pub trait Addin: Send + Sync {
    fn name(&self) -> &str;

    async fn load(&mut self, pipeline: &Pipeline) -> BuildlineResult<()>;

    /// Undo `load`; called at most once per successful load
    async fn unload(&mut self, pipeline: &Pipeline) -> BuildlineResult<()>;
}

/// Stages an addin registered, so it can remove exactly those
#[derive(Default)]
pub struct OwnedStages {
    stages: Vec<Arc<dyn Stage>>,
}

impl OwnedStages {
    pub fn add(&mut self, pipeline: &Pipeline, stage: Arc<dyn Stage>) -> BuildlineResult<()> {
        pipeline.add_stage(stage.clone())?;
        self.stages.push(stage);
        Ok(())
    }

    pub fn remove_all(&mut self, pipeline: &Pipeline) {
        for stage in self.stages.drain(..) {
            pipeline.remove_stage(&stage);
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Loaded addins in load order
#[derive(Default)]
pub struct AddinSet {
    loaded: Vec<Box<dyn Addin>>,
}

impl AddinSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(&mut self, pipeline: &Pipeline, mut addin: Box<dyn Addin>) -> BuildlineResult<()> {
        debug!(addin = addin.name(), "loading addin");
        addin.load(pipeline).await?;
        self.loaded.push(addin);
        Ok(())
    }

    /// Unload everything in reverse load order
    pub async fn unload_all(&mut self, pipeline: &Pipeline) {
        while let Some(mut addin) = self.loaded.pop() {
            debug!(addin = addin.name(), "unloading addin");
            if let Err(e) = addin.unload(pipeline).await {
                warn!(addin = addin.name(), error = %e, "failed to unload addin");
            }
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.loaded.iter().map(|addin| addin.name()).collect()
    }
}

/// The built-in addins, in load order
pub fn default_addins(config: &ProjectConfig) -> Vec<Box<dyn Addin>> {
    vec![
        Box::new(EnvironmentAddin::new(config.env.clone())),
        Box::new(MesonAddin::new()),
        Box::new(JustAddin::new()),
        Box::new(CommandsAddin::new(config.commands.clone(), config.stage_timeout_secs)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Phase, PipelineContext};
    use crate::stages::{Command, CommandStage};
    use std::sync::Mutex;

    struct Tracking {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        stages: OwnedStages,
    }

    #[async_trait]
    impl Addin for Tracking {
        fn name(&self) -> &str {
            self.name
        }

        async fn load(&mut self, pipeline: &Pipeline) -> BuildlineResult<()> {
            self.log.lock().unwrap().push(format!("load {}", self.name));
            let stage = CommandStage::new(self.name, Phase::Build).with_build(Command::shell("true"));
            self.stages.add(pipeline, Arc::new(stage))
        }

        async fn unload(&mut self, pipeline: &Pipeline) -> BuildlineResult<()> {
            self.log.lock().unwrap().push(format!("unload {}", self.name));
            self.stages.remove_all(pipeline);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unload_in_reverse_removes_stages() {
        let pipeline = Pipeline::new(PipelineContext::new("p", "/src", "/src/_build"));
        let log = Arc::new(Mutex::new(Vec::new()));
        let addins: Vec<Box<dyn Addin>> = ["first", "second"]
            .into_iter()
            .map(|name| {
                Box::new(Tracking {
                    name,
                    log: log.clone(),
                    stages: OwnedStages::default(),
                }) as Box<dyn Addin>
            })
            .collect();

        pipeline.load_addins(addins).await.unwrap();
        assert_eq!(pipeline.stages().len(), 2);

        pipeline.dispose().await;
        assert!(pipeline.stages().is_empty());
        assert_eq!(
            *log.lock().unwrap(),
            vec!["load first", "load second", "unload second", "unload first"]
        );

        // A second dispose does nothing.
        pipeline.dispose().await;
        assert_eq!(log.lock().unwrap().len(), 4);
    }
}
