// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Build command - run the pipeline up to a phase

use miette::Result;
use std::path::PathBuf;

use super::session::Session;
use crate::pipeline::Phase;
use crate::utils::print_header;

pub async fn run(phase: Phase, rebuild: bool, config: Option<PathBuf>, verbose: bool) -> Result<()> {
    let session = Session::open(config, verbose).await?;
    print_header(&format!("Building {}", session.pipeline().context().name()));

    let result = if rebuild {
        session.pipeline().rebuild_to(phase).await
    } else {
        session.pipeline().build_to(phase).await
    };

    session.finish("Build", result, verbose).await
}
