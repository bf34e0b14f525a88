// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Toolchain providers
//!
//! An SDK decides where build tools run: directly on the host, or through a
//! wrapper such as `jhbuild run` or `toolbox run`.

mod host;
mod wrapper;

pub use host::HostSdk;
pub use wrapper::WrapperSdk;

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::errors::BuildlineResult;
use crate::pipeline::Phase;
use crate::process::ProcessLauncher;

/// Trait for toolchain providers
#[async_trait]
pub trait Sdk: Send + Sync {
    /// Stable identifier
    fn id(&self) -> &str;

    /// Human readable name
    fn name(&self) -> &str;

    /// Provider family, such as `host` or `wrapper`
    fn kind(&self) -> &str;

    /// Whether the SDK can be used right now
    async fn installed(&self) -> bool {
        true
    }

    /// Variables the SDK injects into every subprocess
    fn environment(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Push the layers needed to run a build tool for `phase`
    async fn prepare_to_build(
        &self,
        launcher: &mut ProcessLauncher,
        phase: Phase,
    ) -> BuildlineResult<()>;

    /// Whether `program` can be executed inside the SDK
    async fn contains_program(&self, program: &str) -> BuildlineResult<bool>;
}
