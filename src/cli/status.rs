// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Status command - query every stage without running anything

use miette::Result;
use std::fmt::Write;
use std::path::PathBuf;

use super::session::Session;
use super::OutputFormat;
use crate::errors::BuildlineError;
use crate::pipeline::StageStatus;
use crate::utils::create_spinner;

pub async fn run(format: OutputFormat, config: Option<PathBuf>, verbose: bool) -> Result<()> {
    let session = Session::open(config, verbose).await?;

    let spinner = (format == OutputFormat::Text).then(|| create_spinner("Querying stages..."));
    let result = session.pipeline().query().await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    session.close().await;
    let statuses = result?;

    match format {
        OutputFormat::Text => print!("{}", render_status(&statuses)),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&statuses).map_err(BuildlineError::from)?;
            println!("{}", json);
        }
    }
    Ok(())
}

/// Plain-text table of stages in execution order
pub fn render_status(statuses: &[StageStatus]) -> String {
    if statuses.is_empty() {
        return "No stages registered\n".to_string();
    }

    let width = statuses
        .iter()
        .map(|status| status.title.chars().count())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for status in statuses {
        let _ = writeln!(
            out,
            "{:<13}{:<width$}  {}",
            status.phase.as_str(),
            status.title,
            if status.completed { "up to date" } else { "will run" },
            width = width
        );
    }
    out
}
