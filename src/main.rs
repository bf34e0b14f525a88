// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! buildline - phase-ordered build pipeline

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use buildline::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "buildline=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    buildline::utils::configure_colors();

    let cli = Cli::parse();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    // Dispatch to command handlers
    match cli.command {
        Commands::Build { phase, rebuild } => {
            buildline::cli::build::run(phase, rebuild, cli.config, cli.verbose).await
        }
        Commands::Install => buildline::cli::install::run(cli.config, cli.verbose).await,
        Commands::Clean => buildline::cli::clean::run(cli.config, cli.verbose).await,
        Commands::Status { format } => {
            buildline::cli::status::run(format, cli.config, cli.verbose).await
        }
        Commands::Watch { debounce } => {
            buildline::cli::watch::run(debounce, cli.config, cli.verbose).await
        }
    }
}
