// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for buildline.

pub mod build;
pub mod clean;
pub mod install;
pub mod session;
pub mod status;
pub mod watch;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::pipeline::Phase;

/// Phase-ordered build pipeline
#[derive(Parser, Debug)]
#[clap(
    name = "buildline",
    version,
    about = "Phase-ordered build pipeline for Meson, Just and declared commands",
    long_about = None,
    after_help = "Examples:\n\
        buildline build                 Build up to the build phase\n\
        buildline build --phase final   Run every phase\n\
        buildline build --rebuild       Purge, then build from scratch\n\
        buildline status                Show which stages would run\n\
        buildline watch                 Rebuild on file changes\n\n\
        See 'buildline <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Project configuration file (default: .buildline.yaml, .buildline.yml or .buildline.toml)
    #[clap(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the project
    Build {
        /// Last phase to run
        #[clap(short, long, default_value = "build")]
        phase: Phase,

        /// Purge the build directory first
        #[clap(long)]
        rebuild: bool,
    },

    /// Build and install the project
    Install,

    /// Clean build outputs
    Clean,

    /// Show each stage and whether a build would run it
    Status {
        /// Output format (text, json)
        #[clap(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Watch mode - rebuild on file changes
    Watch {
        /// Debounce delay in milliseconds
        #[clap(long, default_value = "500")]
        debounce: u64,
    },
}

/// Output format for the status command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}
