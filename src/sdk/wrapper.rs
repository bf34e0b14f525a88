// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

use async_trait::async_trait;
use std::collections::BTreeMap;

use super::Sdk;
use crate::errors::{BuildlineError, BuildlineResult};
use crate::pipeline::Phase;
use crate::process::{ProcessLauncher, WrapperLayer};
use crate::progress::Cancellable;

/// Build inside a command wrapper such as `jhbuild run`
#[derive(Debug, Clone)]
pub struct WrapperSdk {
    id: String,
    name: String,
    command: Vec<String>,
    env: BTreeMap<String, String>,
    minimal_env: bool,
}

impl WrapperSdk {
    pub fn new(id: impl Into<String>, command: Vec<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            command,
            env: BTreeMap::new(),
            minimal_env: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Start the wrapper from a minimal environment instead of ours
    pub fn with_minimal_env(mut self, minimal_env: bool) -> Self {
        self.minimal_env = minimal_env;
        self
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }
}

#[async_trait]
impl Sdk for WrapperSdk {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "wrapper"
    }

    async fn installed(&self) -> bool {
        let Some(program) = self.command.first().cloned() else {
            return false;
        };
        tokio::task::spawn_blocking(move || which::which(program).is_ok())
            .await
            .unwrap_or(false)
    }

    fn environment(&self) -> BTreeMap<String, String> {
        self.env.clone()
    }

    async fn prepare_to_build(
        &self,
        launcher: &mut ProcessLauncher,
        _phase: Phase,
    ) -> BuildlineResult<()> {
        if self.command.is_empty() {
            return Err(BuildlineError::SdkUnavailable {
                sdk: self.id.clone(),
            });
        }

        launcher.push_host();
        if self.minimal_env {
            launcher.add_minimal_environment();
        }
        launcher.push(WrapperLayer::new(self.command.clone(), BTreeMap::new()));
        Ok(())
    }

    async fn contains_program(&self, program: &str) -> BuildlineResult<bool> {
        let mut launcher = ProcessLauncher::new();
        self.prepare_to_build(&mut launcher, Phase::Prepare).await?;
        launcher.append_args(["sh", "-c", "command -v \"$0\"", program]);

        let mut process = launcher.spawn()?;
        match process.communicate(&Cancellable::new()).await {
            Ok(_) => Ok(true),
            Err(BuildlineError::ProcessExitNonZero { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
