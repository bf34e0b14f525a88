// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

use async_trait::async_trait;
use std::sync::Arc;

use super::{Addin, OwnedStages};
use crate::config::CommandConfig;
use crate::errors::BuildlineResult;
use crate::pipeline::Pipeline;

/// Registers a command stage for every command declared in the project config
pub struct CommandsAddin {
    commands: Vec<CommandConfig>,
    default_timeout: Option<u64>,
    stages: OwnedStages,
}

impl CommandsAddin {
    pub fn new(commands: Vec<CommandConfig>, default_timeout: Option<u64>) -> Self {
        Self {
            commands,
            default_timeout,
            stages: OwnedStages::default(),
        }
    }
}

#[async_trait]
impl Addin for CommandsAddin {
    fn name(&self) -> &str {
        "commands"
    }

    async fn load(&mut self, pipeline: &Pipeline) -> BuildlineResult<()> {
        for command in &self.commands {
            let stage = command.to_stage(self.default_timeout);
            self.stages.add(pipeline, Arc::new(stage))?;
        }
        Ok(())
    }

    async fn unload(&mut self, pipeline: &Pipeline) -> BuildlineResult<()> {
        self.stages.remove_all(pipeline);
        Ok(())
    }
}
