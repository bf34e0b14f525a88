// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Per-project state shared with stages
//!
//! Stages never own the pipeline; they receive this context through
//! [`crate::progress::BuildProgress`] and `Stage::query`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::debug;

use super::events::{EventSender, PipelineEvent};
use super::Phase;
use crate::errors::BuildlineResult;
use crate::process::ProcessLauncher;
use crate::sdk::{HostSdk, Sdk};

/// Directories, SDK and environment of one pipeline
pub struct PipelineContext {
    name: String,
    srcdir: PathBuf,
    builddir: PathBuf,
    build_system: Option<String>,
    config_opts: Vec<String>,
    sdk: Arc<dyn Sdk>,
    env: RwLock<BTreeMap<String, String>>,
    path_prepend: RwLock<Vec<PathBuf>>,
    path_append: RwLock<Vec<PathBuf>>,
    events: EventSender,
}

impl PipelineContext {
    /// Create a context that builds on the host
    pub fn new(name: impl Into<String>, srcdir: impl Into<PathBuf>, builddir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            srcdir: srcdir.into(),
            builddir: builddir.into(),
            build_system: None,
            config_opts: Vec::new(),
            sdk: Arc::new(HostSdk::new()),
            env: RwLock::new(BTreeMap::new()),
            path_prepend: RwLock::new(Vec::new()),
            path_append: RwLock::new(Vec::new()),
            events: EventSender::new(),
        }
    }

    pub fn with_sdk(mut self, sdk: Arc<dyn Sdk>) -> Self {
        self.sdk = sdk;
        self
    }

    pub fn with_build_system(mut self, build_system: Option<String>) -> Self {
        self.build_system = build_system;
        self
    }

    pub fn with_config_opts(mut self, config_opts: Vec<String>) -> Self {
        self.config_opts = config_opts;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn srcdir(&self) -> &Path {
        &self.srcdir
    }

    pub fn builddir(&self) -> &Path {
        &self.builddir
    }

    /// Detected or configured build system, such as `meson` or `just`
    pub fn build_system(&self) -> Option<&str> {
        self.build_system.as_deref()
    }

    /// Extra arguments for configure steps
    pub fn config_opts(&self) -> &[String] {
        &self.config_opts
    }

    pub fn sdk(&self) -> &Arc<dyn Sdk> {
        &self.sdk
    }

    /// Export a variable to every subprocess spawned after this call
    pub fn setenv(&self, key: impl Into<String>, value: impl Into<String>) {
        self.env
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    /// Drop a variable from the overlay, restoring the inherited value
    pub fn unsetenv(&self, key: &str) {
        self.env
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn getenv(&self, key: &str) -> Option<String> {
        self.env
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Snapshot of the user overlay
    pub fn environment(&self) -> BTreeMap<String, String> {
        self.env.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn prepend_path(&self, dir: impl Into<PathBuf>) {
        self.path_prepend
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(dir.into());
    }

    pub fn append_path(&self, dir: impl Into<PathBuf>) {
        self.path_append
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(dir.into());
    }

    pub(crate) fn events(&self) -> &EventSender {
        &self.events
    }

    pub fn emit(&self, event: PipelineEvent) {
        self.events.emit(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Set up `launcher` to run a tool for `phase`
    ///
    /// The SDK pushes its layers first. The environment is then the
    /// inherited environment, overridden by SDK variables, overridden by the
    /// pipeline overlay. The working directory is the build directory.
    pub async fn prepare(&self, launcher: &mut ProcessLauncher, phase: Phase) -> BuildlineResult<()> {
        self.sdk.prepare_to_build(launcher, phase).await?;

        for (key, value) in self.sdk.environment() {
            launcher.setenv(key, value);
        }
        for (key, value) in self.environment() {
            launcher.setenv(key, value);
        }

        if let Some(path) = self.compose_path(launcher.getenv("PATH")) {
            launcher.setenv("PATH", path);
        }

        launcher.set_cwd(&self.builddir);
        Ok(())
    }

    fn compose_path(&self, current: Option<&str>) -> Option<String> {
        let prepend = self.path_prepend.read().unwrap_or_else(PoisonError::into_inner).clone();
        let append = self.path_append.read().unwrap_or_else(PoisonError::into_inner).clone();
        if prepend.is_empty() && append.is_empty() {
            return None;
        }

        let base = current
            .map(str::to_string)
            .or_else(|| std::env::var("PATH").ok())
            .unwrap_or_default();

        let mut parts: Vec<String> = prepend
            .iter()
            .map(|dir| dir.to_string_lossy().into_owned())
            .collect();
        parts.extend(base.split(':').filter(|s| !s.is_empty()).map(str::to_string));
        parts.extend(append.iter().map(|dir| dir.to_string_lossy().into_owned()));

        let path = parts.join(":");
        debug!(%path, "composed PATH");
        Some(path)
    }

    /// Whether the SDK can run `program`
    pub async fn contains_program(&self, program: &str) -> BuildlineResult<bool> {
        self.sdk.contains_program(program).await
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("name", &self.name)
            .field("srcdir", &self.srcdir)
            .field("builddir", &self.builddir)
            .field("build_system", &self.build_system)
            .field("sdk", &self.sdk.id())
            .finish()
    }
}
