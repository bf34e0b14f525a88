// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

use async_trait::async_trait;

use super::Sdk;
use crate::errors::{BuildlineError, BuildlineResult};
use crate::pipeline::Phase;
use crate::process::ProcessLauncher;

/// Build with whatever is installed on the host
#[derive(Debug, Clone, Default)]
pub struct HostSdk;

impl HostSdk {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Sdk for HostSdk {
    fn id(&self) -> &str {
        "host"
    }

    fn name(&self) -> &str {
        "Host System"
    }

    fn kind(&self) -> &str {
        "host"
    }

    async fn prepare_to_build(
        &self,
        launcher: &mut ProcessLauncher,
        _phase: Phase,
    ) -> BuildlineResult<()> {
        launcher.push_host();
        Ok(())
    }

    async fn contains_program(&self, program: &str) -> BuildlineResult<bool> {
        let program = program.to_string();
        tokio::task::spawn_blocking(move || which::which(program).is_ok())
            .await
            .map_err(|e| BuildlineError::Io {
                message: format!("program lookup failed: {}", e),
            })
    }
}
