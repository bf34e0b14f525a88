// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Clean command - best-effort clean of every stage

use miette::Result;
use std::path::PathBuf;

use super::session::Session;
use crate::utils::print_header;

pub async fn run(config: Option<PathBuf>, verbose: bool) -> Result<()> {
    let session = Session::open(config, verbose).await?;
    print_header(&format!("Cleaning {}", session.pipeline().context().name()));

    // Every failed stage is listed as a related diagnostic of the error.
    let result = session.pipeline().clean().await;
    session.finish("Clean", result, verbose).await
}
