// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

use async_trait::async_trait;
use std::sync::Arc;

use super::{Addin, OwnedStages};
use crate::config::find_justfile;
use crate::errors::BuildlineResult;
use crate::pipeline::Pipeline;
use crate::stages::JustBuildStage;

/// Build stage for projects driven by a justfile
#[derive(Default)]
pub struct JustAddin {
    stages: OwnedStages,
}

impl JustAddin {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Addin for JustAddin {
    fn name(&self) -> &str {
        "just"
    }

    async fn load(&mut self, pipeline: &Pipeline) -> BuildlineResult<()> {
        let context = pipeline.context();
        if context.build_system() != Some("just") {
            return Ok(());
        }

        // A configured build system may still lack the file itself.
        let Some(justfile) = find_justfile(context.srcdir()) else {
            tracing::warn!(srcdir = %context.srcdir().display(), "no justfile found");
            return Ok(());
        };
        self.stages.add(pipeline, Arc::new(JustBuildStage::new(justfile)))
    }

    async fn unload(&mut self, pipeline: &Pipeline) -> BuildlineResult<()> {
        self.stages.remove_all(pipeline);
        Ok(())
    }
}
