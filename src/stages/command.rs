// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! User-declared command stages

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::{Stage, StageState};
use crate::errors::{BuildlineError, BuildlineResult};
use crate::pipeline::{Phase, PipelineContext};
use crate::process::ProcessLauncher;
use crate::progress::BuildProgress;

/// A program invocation run inside the pipeline's SDK
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    argv: Vec<String>,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
    shell: bool,
}

impl Command {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// A script run with `/bin/sh -c`
    pub fn shell(script: impl Into<String>) -> Self {
        Self {
            argv: vec![script.into()],
            shell: true,
            ..Self::default()
        }
    }

    /// Working directory, relative to the source directory
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn is_shell(&self) -> bool {
        self.shell
    }

    pub fn is_empty(&self) -> bool {
        self.argv.iter().all(|arg| arg.trim().is_empty())
    }

    /// Command line as a user would type it
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }

    /// Run to completion, failing on a non-zero exit
    pub async fn run(&self, progress: &BuildProgress) -> BuildlineResult<()> {
        let context = progress.context();
        let mut launcher = ProcessLauncher::new();
        context.prepare(&mut launcher, progress.phase()).await?;

        if self.shell {
            launcher.push_shell();
        }
        if let Some(cwd) = &self.cwd {
            launcher.set_cwd(context.srcdir().join(cwd));
        }
        for (key, value) in &self.env {
            launcher.setenv(key.clone(), value.clone());
        }
        launcher.append_args(self.argv.iter().cloned());

        progress.run(launcher).await
    }
}

/// Stage running a [`Command`] for each hook it was given
#[derive(Debug)]
pub struct CommandStage {
    name: String,
    phase: Phase,
    build: Option<Command>,
    clean: Option<Command>,
    purge: Option<Command>,
    query_file: Option<String>,
    timeout: Option<Duration>,
    state: StageState,
}

impl CommandStage {
    pub fn new(name: impl Into<String>, phase: Phase) -> Self {
        Self {
            name: name.into(),
            phase,
            build: None,
            clean: None,
            purge: None,
            query_file: None,
            timeout: None,
            state: StageState::new(),
        }
    }

    pub fn with_build(mut self, command: Command) -> Self {
        self.build = Some(command);
        self
    }

    pub fn with_clean(mut self, command: Command) -> Self {
        self.clean = Some(command);
        self
    }

    pub fn with_purge(mut self, command: Command) -> Self {
        self.purge = Some(command);
        self
    }

    /// Glob, relative to the build directory, whose match marks the stage done
    pub fn with_query_file(mut self, pattern: impl Into<String>) -> Self {
        self.query_file = Some(pattern.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn query_file_exists(&self, context: &PipelineContext, pattern: &str) -> BuildlineResult<bool> {
        let pattern = context.builddir().join(pattern).to_string_lossy().into_owned();
        let found = tokio::task::spawn_blocking(move || -> BuildlineResult<bool> {
            Ok(glob::glob(&pattern)?.any(|entry| entry.is_ok()))
        })
        .await
        .map_err(|e| BuildlineError::StageFailed {
            stage: self.name.clone(),
            message: e.to_string(),
        })??;
        Ok(found)
    }
}

#[async_trait]
impl Stage for CommandStage {
    fn kind(&self) -> &str {
        "command"
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn title(&self) -> String {
        self.name.clone()
    }

    fn state(&self) -> &StageState {
        &self.state
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn query(&self, context: &PipelineContext) -> BuildlineResult<bool> {
        if self.is_completed() {
            return Ok(true);
        }
        match &self.query_file {
            Some(pattern) => self.query_file_exists(context, pattern).await,
            None => Ok(false),
        }
    }

    async fn build(&self, progress: &BuildProgress) -> BuildlineResult<()> {
        match &self.build {
            Some(command) => command.run(progress).await,
            None => Ok(()),
        }
    }

    async fn clean(&self, progress: &BuildProgress) -> BuildlineResult<()> {
        match &self.clean {
            Some(command) => command.run(progress).await,
            None => Ok(()),
        }
    }

    async fn purge(&self, progress: &BuildProgress) -> BuildlineResult<()> {
        match &self.purge {
            Some(command) => command.run(progress).await,
            None => Ok(()),
        }
    }
}
