// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Just recipes as a build stage

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{run_tool, Stage, StageState};
use crate::errors::BuildlineResult;
use crate::pipeline::Phase;
use crate::progress::BuildProgress;

/// Runs the `build` and `clean` recipes of a justfile
#[derive(Debug)]
pub struct JustBuildStage {
    justfile: PathBuf,
    state: StageState,
}

impl JustBuildStage {
    pub fn new(justfile: impl Into<PathBuf>) -> Self {
        Self {
            justfile: justfile.into(),
            state: StageState::new(),
        }
    }

    pub fn justfile(&self) -> &Path {
        &self.justfile
    }

    fn recipe(&self, recipe: &str) -> Vec<String> {
        vec![
            "just".to_string(),
            "--justfile".to_string(),
            self.justfile.to_string_lossy().into_owned(),
            recipe.to_string(),
        ]
    }
}

#[async_trait]
impl Stage for JustBuildStage {
    fn kind(&self) -> &str {
        "just-build"
    }

    fn phase(&self) -> Phase {
        Phase::Build
    }

    fn title(&self) -> String {
        "Run just build".to_string()
    }

    fn state(&self) -> &StageState {
        &self.state
    }

    async fn build(&self, progress: &BuildProgress) -> BuildlineResult<()> {
        run_tool(progress, self.recipe("build")).await
    }

    async fn clean(&self, progress: &BuildProgress) -> BuildlineResult<()> {
        run_tool(progress, self.recipe("clean")).await
    }
}
