// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Configuration validation
//!
//! Checks a project configuration before a pipeline is opened from it.

use regex::Regex;
use std::collections::HashSet;
use std::path::{Component, Path};

use super::{CommandConfig, ProjectConfig, SdkConfig};
use crate::utils::normalize_path;

const KNOWN_BUILD_SYSTEMS: [&str; 2] = ["meson", "just"];

/// Project configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &ProjectConfig) -> ValidationResult {
        let mut result = ValidationResult::new();

        if let Some(system) = &config.build_system {
            if !KNOWN_BUILD_SYSTEMS.contains(&system.as_str()) {
                result.add_warning(&format!(
                    "Unknown build system '{}'; only declared commands will run",
                    system
                ));
            }
        }

        match Self::builddir_location(&config.builddir) {
            BuilddirLocation::Inside => {}
            BuilddirLocation::SourceDir => result
                .add_warning("Build directory is the source directory; purge will not remove it"),
            BuilddirLocation::Escapes => result.add_error(&format!(
                "Build directory '{}' resolves to the source directory or one of its parents",
                config.builddir.display()
            )),
        }

        if let SdkConfig::Wrapper { id, command, .. } = &config.sdk {
            if command.is_empty() {
                result.add_error(&format!("SDK '{}' has an empty command prefix", id));
            }
        }

        for (index, pattern) in config.error_formats.iter().enumerate() {
            if let Err(e) = Regex::new(pattern) {
                result.add_error(&format!("error_formats[{}] is not a valid regex: {}", index, e));
            }
        }

        let mut seen_names = HashSet::new();
        for command in &config.commands {
            if !seen_names.insert(command.name.as_str()) {
                result.add_warning(&format!(
                    "Command name '{}' is used more than once; stages run in declaration order",
                    command.name
                ));
            }
            Self::validate_command(command, &mut result);
        }

        result
    }

    fn validate_command(command: &CommandConfig, result: &mut ValidationResult) {
        if command.name.trim().is_empty() {
            result.add_error("Command with an empty name");
        }

        let hooks = [
            ("build", &command.build),
            ("clean", &command.clean),
            ("purge", &command.purge),
        ];
        for (hook, spec) in &hooks {
            if spec.as_ref().is_some_and(|spec| spec.is_empty()) {
                result.add_error(&format!("Command '{}' has an empty {} command", command.name, hook));
            }
        }
        if hooks.iter().all(|(_, spec)| spec.is_none()) {
            result.add_warning(&format!("Command '{}' does nothing", command.name));
        }

        if command.timeout_secs == Some(0) {
            result.add_error(&format!("Command '{}' has a zero timeout", command.name));
        }
    }

    fn builddir_location(builddir: &Path) -> BuilddirLocation {
        let has_parent = builddir.components().any(|c| matches!(c, Component::ParentDir));
        let resolved = normalize_path(builddir);
        let ancestor = resolved
            .components()
            .all(|c| matches!(c, Component::ParentDir));

        match (ancestor, has_parent) {
            (true, true) => BuilddirLocation::Escapes,
            (true, false) => BuilddirLocation::SourceDir,
            (false, _) => BuilddirLocation::Inside,
        }
    }
}

enum BuilddirLocation {
    Inside,
    SourceDir,
    Escapes,
}

/// Result of configuration validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> ProjectConfig {
        ProjectConfig::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        let result = ConfigValidator::validate(&ProjectConfig::default());
        assert!(result.is_valid());
        assert!(!result.has_warnings());
    }

    #[test]
    fn test_empty_commands_are_errors() {
        let result = ConfigValidator::validate(&parse(
            "commands:\n  - name: a\n    build: []\n  - name: b\n    clean: '  '\n",
        ));
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].contains("empty build command"));
    }

    #[test]
    fn test_duplicate_names_only_warn() {
        let result = ConfigValidator::validate(&parse(
            "commands:\n  - name: gen\n    build: a\n  - name: gen\n    build: b\n",
        ));
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.contains("more than once")));
    }

    #[test]
    fn test_sdk_and_error_formats() {
        let result = ConfigValidator::validate(&parse(
            "sdk:\n  kind: wrapper\n  id: box\n  command: []\nerror_formats: ['(unclosed']\n",
        ));
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn test_builddir_and_build_system_warnings() {
        let result = ConfigValidator::validate(&parse("builddir: .\nbuild_system: cmake\n"));
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn test_builddir_escaping_sources_is_an_error() {
        for builddir in ["_build/..", "..", "./_build/../../x/.."] {
            let result = ConfigValidator::validate(&parse(&format!("builddir: '{}'\n", builddir)));
            assert!(!result.is_valid(), "{builddir} should be rejected");
            assert!(result.errors[0].contains("resolves to the source directory"));
        }
    }

    #[test]
    fn test_builddir_outside_sources_is_allowed() {
        for builddir in ["../app-build", "out/../_build", "/tmp/app-build"] {
            let result = ConfigValidator::validate(&parse(&format!("builddir: '{}'\n", builddir)));
            assert!(result.is_valid(), "{builddir} should be accepted");
        }
    }
}
