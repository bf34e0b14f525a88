// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

use async_trait::async_trait;
use std::collections::BTreeMap;

use super::Addin;
use crate::errors::BuildlineResult;
use crate::pipeline::Pipeline;

/// Exports configured variables to every subprocess of the pipeline
pub struct EnvironmentAddin {
    env: BTreeMap<String, String>,
}

impl EnvironmentAddin {
    pub fn new(env: BTreeMap<String, String>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Addin for EnvironmentAddin {
    fn name(&self) -> &str {
        "environment"
    }

    async fn load(&mut self, pipeline: &Pipeline) -> BuildlineResult<()> {
        for (key, value) in &self.env {
            pipeline.setenv(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn unload(&mut self, pipeline: &Pipeline) -> BuildlineResult<()> {
        for key in self.env.keys() {
            pipeline.unsetenv(key);
        }
        Ok(())
    }
}
