// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Install command

use miette::Result;
use std::path::PathBuf;

use super::session::Session;
use crate::utils::print_header;

pub async fn run(config: Option<PathBuf>, verbose: bool) -> Result<()> {
    let session = Session::open(config, verbose).await?;
    print_header(&format!("Installing {}", session.pipeline().context().name()));

    let result = session.pipeline().install().await;
    session.finish("Install", result, verbose).await
}
