// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Project configuration
//!
//! Read from `.buildline.yaml`, `.buildline.yml` or `.buildline.toml` in the
//! project root. Every field is optional.

mod detect;
mod validation;

pub use detect::{detect_build_system, find_justfile, is_build_definition};
pub use validation::{ConfigValidator, ValidationResult};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{BuildlineError, BuildlineResult};
use crate::pipeline::Phase;
use crate::sdk::{HostSdk, Sdk, WrapperSdk};
use crate::stages::{Command, CommandStage};
use crate::utils::normalize_path;

/// File names searched for, in order
pub const CONFIG_FILES: [&str; 3] = [".buildline.yaml", ".buildline.yml", ".buildline.toml"];

/// Top-level project configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project name, defaults to the source directory name
    pub name: Option<String>,

    /// `meson` or `just`; detected from the source tree when unset
    pub build_system: Option<String>,

    /// Build directory, relative to the source directory
    pub builddir: PathBuf,

    pub sdk: SdkConfig,

    /// Variables exported to every subprocess
    pub env: BTreeMap<String, String>,

    /// Extra arguments for the configure step
    pub config_opts: Vec<String>,

    /// Extra diagnostic regexes with `file`, `line`, `column`, `level` and
    /// `message` groups
    pub error_formats: Vec<String>,

    /// Deadline for declared commands that don't set their own
    pub stage_timeout_secs: Option<u64>,

    pub commands: Vec<CommandConfig>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: None,
            build_system: None,
            builddir: PathBuf::from("_build"),
            sdk: SdkConfig::default(),
            env: BTreeMap::new(),
            config_opts: Vec::new(),
            error_formats: Vec::new(),
            stage_timeout_secs: None,
            commands: Vec::new(),
        }
    }
}

impl ProjectConfig {
    /// Load from a file, choosing the format by extension
    pub fn from_file(path: &Path) -> BuildlineResult<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BuildlineError::ConfigNotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml(&content),
            _ => Self::from_yaml(&content),
        }
    }

    pub fn from_yaml(yaml: &str) -> BuildlineResult<Self> {
        // An empty file parses as null.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    pub fn from_toml(toml: &str) -> BuildlineResult<Self> {
        toml::from_str(toml).map_err(Into::into)
    }

    /// Find the config file in `srcdir`, if there is one
    pub fn find(srcdir: &Path) -> Option<PathBuf> {
        CONFIG_FILES
            .iter()
            .map(|name| srcdir.join(name))
            .find(|path| path.is_file())
    }

    /// Load `explicit` or the file found in `srcdir`, falling back to defaults
    ///
    /// An explicitly named file must exist.
    pub fn load(srcdir: &Path, explicit: Option<&Path>) -> BuildlineResult<Self> {
        match explicit {
            Some(path) => Self::from_file(&srcdir.join(path)),
            None => match Self::find(srcdir) {
                Some(path) => {
                    tracing::debug!(path = %path.display(), "loading project config");
                    Self::from_file(&path)
                }
                None => Ok(Self::default()),
            },
        }
    }

    pub fn project_name(&self, srcdir: &Path) -> String {
        self.name.clone().unwrap_or_else(|| {
            srcdir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "project".to_string())
        })
    }

    pub fn builddir_in(&self, srcdir: &Path) -> PathBuf {
        normalize_path(&srcdir.join(&self.builddir))
    }
}

/// Where subprocesses run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SdkConfig {
    /// Directly on the host
    #[default]
    Host,

    /// Through a command prefix such as `toolbox run` or `jhbuild run`
    Wrapper {
        id: String,
        #[serde(default)]
        name: Option<String>,
        command: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
        #[serde(default)]
        minimal_env: bool,
    },
}

impl SdkConfig {
    pub fn create(&self) -> Arc<dyn Sdk> {
        match self {
            SdkConfig::Host => Arc::new(HostSdk::new()),
            SdkConfig::Wrapper {
                id,
                name,
                command,
                env,
                minimal_env,
            } => {
                let mut sdk = WrapperSdk::new(id.clone(), command.clone())
                    .with_env(env.clone())
                    .with_minimal_env(*minimal_env);
                if let Some(name) = name {
                    sdk = sdk.with_name(name.clone());
                }
                Arc::new(sdk)
            }
        }
    }
}

/// A command as written in the config: a shell string or an argv list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Shell(String),
    Argv(Vec<String>),
}

impl CommandSpec {
    pub fn is_empty(&self) -> bool {
        match self {
            CommandSpec::Shell(script) => script.trim().is_empty(),
            CommandSpec::Argv(argv) => argv.is_empty(),
        }
    }

    pub fn to_command(&self) -> Command {
        match self {
            CommandSpec::Shell(script) => Command::shell(script.clone()),
            CommandSpec::Argv(argv) => Command::new(argv.iter().cloned()),
        }
    }
}

/// A user-declared command stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    pub name: String,

    #[serde(default)]
    pub phase: Phase,

    #[serde(default)]
    pub build: Option<CommandSpec>,

    #[serde(default)]
    pub clean: Option<CommandSpec>,

    #[serde(default)]
    pub purge: Option<CommandSpec>,

    /// Glob relative to the build directory; a match means nothing to do
    #[serde(default)]
    pub query_file: Option<String>,

    /// Working directory relative to the source directory
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl CommandConfig {
    pub fn to_stage(&self, default_timeout: Option<u64>) -> CommandStage {
        let command = |spec: &CommandSpec| {
            let mut command = spec.to_command().with_env(self.env.clone());
            if let Some(cwd) = &self.cwd {
                command = command.with_cwd(cwd);
            }
            command
        };

        let mut stage = CommandStage::new(&self.name, self.phase).with_timeout(
            self.timeout_secs
                .or(default_timeout)
                .map(Duration::from_secs),
        );
        if let Some(spec) = &self.build {
            stage = stage.with_build(command(spec));
        }
        if let Some(spec) = &self.clean {
            stage = stage.with_clean(command(spec));
        }
        if let Some(spec) = &self.purge {
            stage = stage.with_purge(command(spec));
        }
        if let Some(pattern) = &self.query_file {
            stage = stage.with_query_file(pattern.clone());
        }
        stage
    }
}
