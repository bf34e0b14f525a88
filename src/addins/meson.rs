// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{Addin, OwnedStages};
use crate::errors::BuildlineResult;
use crate::pipeline::Pipeline;
use crate::stages::{MesonBuildStage, MesonConfigStage, MesonInstallStage};

/// Configure, build and install stages for Meson projects
#[derive(Default)]
pub struct MesonAddin {
    stages: OwnedStages,
}

impl MesonAddin {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Addin for MesonAddin {
    fn name(&self) -> &str {
        "meson"
    }

    async fn load(&mut self, pipeline: &Pipeline) -> BuildlineResult<()> {
        if pipeline.context().build_system() != Some("meson") {
            return Ok(());
        }

        debug!("registering meson stages");
        self.stages.add(pipeline, Arc::new(MesonConfigStage::new()))?;
        self.stages.add(pipeline, Arc::new(MesonBuildStage::new()))?;
        self.stages.add(pipeline, Arc::new(MesonInstallStage::new()))?;
        Ok(())
    }

    async fn unload(&mut self, pipeline: &Pipeline) -> BuildlineResult<()> {
        self.stages.remove_all(pipeline);
        Ok(())
    }
}
