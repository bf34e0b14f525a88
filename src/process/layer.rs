// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Launcher layers
//!
//! A layer rewrites the command line produced by the layers pushed after it.
//! The last pushed layer sees the caller's argv first; the first pushed layer
//! produces what is actually executed.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::errors::BuildlineResult;

/// Variables carried into a minimal environment
pub const MINIMAL_ENVIRONMENT: &[&str] = &[
    "COLORTERM",
    "DBUS_SESSION_BUS_ADDRESS",
    "DISPLAY",
    "HOME",
    "LANG",
    "LOGNAME",
    "PATH",
    "SHELL",
    "SSH_AUTH_SOCK",
    "TERM",
    "USER",
    "WAYLAND_DISPLAY",
    "XDG_RUNTIME_DIR",
];

/// What to execute, before any process is created
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    pub argv: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
}

/// One step of command line composition
pub trait LaunchLayer: Send + Sync + fmt::Debug {
    fn apply(&self, upper: CommandLine) -> BuildlineResult<CommandLine>;
}

/// Run directly on the host
#[derive(Debug, Clone, Copy, Default)]
pub struct HostLayer;

impl LaunchLayer for HostLayer {
    fn apply(&self, upper: CommandLine) -> BuildlineResult<CommandLine> {
        Ok(upper)
    }
}

/// Seed a cleared environment with a few session variables
#[derive(Debug, Clone, Default)]
pub struct MinimalEnvironment {
    values: BTreeMap<String, String>,
}

impl MinimalEnvironment {
    /// Capture the current process's values of [`MINIMAL_ENVIRONMENT`]
    pub fn capture() -> Self {
        let values = MINIMAL_ENVIRONMENT
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|value| (key.to_string(), value)))
            .collect();
        Self { values }
    }
}

impl LaunchLayer for MinimalEnvironment {
    fn apply(&self, mut upper: CommandLine) -> BuildlineResult<CommandLine> {
        for (key, value) in &self.values {
            upper.env.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Ok(upper)
    }
}

/// Run the argv as a script through `sh -c`
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellLayer;

impl LaunchLayer for ShellLayer {
    fn apply(&self, mut upper: CommandLine) -> BuildlineResult<CommandLine> {
        let script = upper.argv.join(" ");
        upper.argv = vec!["/bin/sh".to_string(), "-c".to_string(), script];
        Ok(upper)
    }
}

/// Run inside another program, passing the environment through `env`
///
/// `jhbuild run`, `toolbox run -c dev` and similar wrappers start a fresh
/// environment of their own, so variables are handed over on the command line.
#[derive(Debug, Clone)]
pub struct WrapperLayer {
    prefix: Vec<String>,
    env: BTreeMap<String, String>,
}

impl WrapperLayer {
    pub fn new(prefix: Vec<String>, env: BTreeMap<String, String>) -> Self {
        Self { prefix, env }
    }
}

impl LaunchLayer for WrapperLayer {
    fn apply(&self, upper: CommandLine) -> BuildlineResult<CommandLine> {
        let mut env = self.env.clone();
        env.extend(upper.env);

        let mut argv = self.prefix.clone();
        if !env.is_empty() {
            argv.push("env".to_string());
            argv.extend(env.iter().map(|(key, value)| format!("{}={}", key, value)));
        }
        argv.extend(upper.argv);

        Ok(CommandLine {
            argv,
            env: BTreeMap::new(),
            cwd: upper.cwd,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(argv: &[&str]) -> CommandLine {
        CommandLine {
            argv: argv.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_shell_layer_joins_script() {
        let out = ShellLayer.apply(line(&["echo", "hi", "&&", "true"])).unwrap();
        assert_eq!(out.argv, vec!["/bin/sh", "-c", "echo hi && true"]);
    }

    #[test]
    fn test_wrapper_moves_env_into_argv() {
        let layer = WrapperLayer::new(
            vec!["jhbuild".into(), "run".into()],
            BTreeMap::from([("A".to_string(), "sdk".to_string())]),
        );
        let mut upper = line(&["ninja"]);
        upper.env.insert("B".into(), "user".into());
        upper.cwd = Some(PathBuf::from("/build"));

        let out = layer.apply(upper).unwrap();
        assert_eq!(out.argv, vec!["jhbuild", "run", "env", "A=sdk", "B=user", "ninja"]);
        assert!(out.env.is_empty());
        assert_eq!(out.cwd, Some(PathBuf::from("/build")));
    }

    #[test]
    fn test_minimal_environment_does_not_override() {
        let layer = MinimalEnvironment {
            values: BTreeMap::from([("PATH".to_string(), "/usr/bin".to_string())]),
        };
        let mut upper = line(&["true"]);
        upper.env.insert("PATH".into(), "/opt/bin".into());

        let out = layer.apply(upper).unwrap();
        assert_eq!(out.env["PATH"], "/opt/bin");
    }
}
