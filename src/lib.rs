// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! # buildline - Phase-ordered build pipeline
//!
//! `buildline` drives a project's build as a sequence of stages grouped into
//! fixed phases (prepare, downloads, dependencies, autogen, configure, build,
//! install, commit, export, final).
//!
//! ## Features
//!
//! - **Incremental** - stages report whether their work is already done and
//!   are skipped until invalidated
//! - **Single-flight** - one pass per pipeline at a time; a second request
//!   fails immediately
//! - **Cancellable** - cancelling a pass kills the whole process group of
//!   the running tool
//! - **SDK aware** - tools run on the host or through a wrapper command
//! - **Diagnostics** - compiler messages are extracted from build output
//!
//! ## Quick Start
//!
//! ```bash
//! # Build up to the build phase
//! buildline build
//!
//! # See which stages a build would run
//! buildline status
//!
//! # Rebuild on every change
//! buildline watch
//! ```

pub mod addins;
pub mod cli;
pub mod config;
pub mod errors;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod sdk;
pub mod stages;
pub mod utils;

// Re-export commonly used types
pub use errors::{BuildlineError, BuildlineResult};
pub use pipeline::{PassReport, Phase, Pipeline, PipelineContext, PipelineEvent};
pub use progress::{BuildProgress, Cancellable};
pub use stages::{Stage, StageState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
