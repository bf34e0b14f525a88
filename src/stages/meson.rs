// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Meson configure, build and install stages

use async_trait::async_trait;
use std::path::PathBuf;

use super::{run_tool, Stage, StageState};
use crate::errors::BuildlineResult;
use crate::pipeline::{Phase, PipelineContext};
use crate::progress::BuildProgress;

/// Written by `meson setup` once a build directory is configured
fn coredata(context: &PipelineContext) -> PathBuf {
    context.builddir().join("meson-private").join("coredata.dat")
}

/// `meson setup` into the build directory
#[derive(Debug, Default)]
pub struct MesonConfigStage {
    state: StageState,
}

impl MesonConfigStage {
    pub fn new() -> Self {
        Self::default()
    }

    fn setup_args(context: &PipelineContext) -> Vec<String> {
        let mut argv = vec![
            "meson".to_string(),
            "setup".to_string(),
            context.builddir().to_string_lossy().into_owned(),
            context.srcdir().to_string_lossy().into_owned(),
        ];
        argv.extend(context.config_opts().iter().cloned());
        argv
    }
}

#[async_trait]
impl Stage for MesonConfigStage {
    fn kind(&self) -> &str {
        "meson-config"
    }

    fn phase(&self) -> Phase {
        Phase::Configure
    }

    fn title(&self) -> String {
        "Configure project".to_string()
    }

    fn state(&self) -> &StageState {
        &self.state
    }

    async fn query(&self, context: &PipelineContext) -> BuildlineResult<bool> {
        Ok(tokio::fs::try_exists(coredata(context)).await?)
    }

    async fn build(&self, progress: &BuildProgress) -> BuildlineResult<()> {
        run_tool(progress, Self::setup_args(progress.context())).await
    }

    async fn purge(&self, progress: &BuildProgress) -> BuildlineResult<()> {
        match tokio::fs::remove_file(coredata(progress.context())).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// `ninja` in the build directory
#[derive(Debug, Default)]
pub struct MesonBuildStage {
    state: StageState,
}

impl MesonBuildStage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Stage for MesonBuildStage {
    fn kind(&self) -> &str {
        "meson-build"
    }

    fn phase(&self) -> Phase {
        Phase::Build
    }

    fn title(&self) -> String {
        "Build project".to_string()
    }

    fn state(&self) -> &StageState {
        &self.state
    }

    async fn build(&self, progress: &BuildProgress) -> BuildlineResult<()> {
        run_tool(progress, vec!["ninja".into(), "all".into()]).await
    }

    async fn clean(&self, progress: &BuildProgress) -> BuildlineResult<()> {
        run_tool(progress, vec!["ninja".into(), "clean".into()]).await
    }
}

/// `meson install` of an already built tree
#[derive(Debug, Default)]
pub struct MesonInstallStage {
    state: StageState,
}

impl MesonInstallStage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Stage for MesonInstallStage {
    fn kind(&self) -> &str {
        "meson-install"
    }

    fn phase(&self) -> Phase {
        Phase::Install
    }

    fn title(&self) -> String {
        "Install project".to_string()
    }

    fn state(&self) -> &StageState {
        &self.state
    }

    async fn build(&self, progress: &BuildProgress) -> BuildlineResult<()> {
        self.install(progress).await
    }

    async fn install(&self, progress: &BuildProgress) -> BuildlineResult<()> {
        run_tool(
            progress,
            vec!["meson".into(), "install".into(), "--no-rebuild".into()],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{Cancellable, DiagnosticPatterns};
    use std::sync::Arc;

    #[test]
    fn test_setup_args_include_config_opts() {
        let ctx = PipelineContext::new("demo", "/src", "/src/_build")
            .with_config_opts(vec!["-Dtests=false".into()]);
        assert_eq!(
            MesonConfigStage::setup_args(&ctx),
            vec!["meson", "setup", "/src/_build", "/src", "-Dtests=false"]
        );
    }

    #[tokio::test]
    async fn test_configured_when_coredata_exists() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = PipelineContext::new("demo", dir.path(), dir.path().join("_build"));
        let stage = MesonConfigStage::new();
        assert!(!stage.query(&ctx).await.unwrap());

        std::fs::create_dir_all(dir.path().join("_build/meson-private")).unwrap();
        std::fs::write(coredata(&ctx), b"").unwrap();
        assert!(stage.query(&ctx).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_removes_coredata() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(PipelineContext::new("demo", dir.path(), dir.path().join("_build")));
        std::fs::create_dir_all(dir.path().join("_build/meson-private")).unwrap();
        std::fs::write(coredata(&ctx), b"").unwrap();

        let progress = BuildProgress::new(
            ctx.clone(),
            "meson-config",
            Phase::Configure,
            Cancellable::new(),
            None,
            DiagnosticPatterns::default(),
        );
        let stage = MesonConfigStage::new();
        stage.purge(&progress).await.unwrap();
        stage.purge(&progress).await.unwrap();
        assert!(!stage.query(&ctx).await.unwrap());
    }

    #[tokio::test]
    async fn test_build_and_install_always_run() {
        let ctx = PipelineContext::new("demo", "/src", "/src/_build");
        assert!(!MesonBuildStage::new().query(&ctx).await.unwrap());
        assert!(!MesonInstallStage::new().query(&ctx).await.unwrap());
    }
}
