// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Shared setup for commands that open the project pipeline

use colored::Colorize;
use miette::Result;
use std::io::IsTerminal;
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use crate::config::{ConfigValidator, ProjectConfig};
use crate::errors::BuildlineError;
use crate::pipeline::{PassReport, Pipeline, PipelineEvent};
use crate::progress::Severity;
use crate::utils::{print_error, print_info, print_skipped, print_success, print_warning};

/// An open pipeline plus the tasks printing its events and handling Ctrl-C
pub struct Session {
    pipeline: Arc<Pipeline>,
    printer: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
    interrupt: JoinHandle<()>,
}

impl Session {
    /// Load the project in the current directory and open its pipeline
    pub async fn open(config_path: Option<PathBuf>, verbose: bool) -> Result<Self> {
        let srcdir = std::env::current_dir()
            .map_err(|e| miette::miette!("Failed to get current directory: {}", e))?;
        let config = ProjectConfig::load(&srcdir, config_path.as_deref())?;
        check_config(&config, verbose)?;

        let pipeline = Arc::new(Pipeline::open(&srcdir, &config).await?);

        // Subprocesses write straight to the terminal when there is one.
        let stdout = std::io::stdout();
        let live = stdout.is_terminal();
        if live {
            let pty = stdout
                .as_fd()
                .try_clone_to_owned()
                .map_err(BuildlineError::from)?;
            pipeline.set_pty(Some(pty));
        }

        let (shutdown, shutdown_rx) = oneshot::channel();
        let printer = tokio::spawn(print_events(pipeline.subscribe(), shutdown_rx, verbose));
        let interrupt = spawn_interrupt(&pipeline);

        Ok(Self {
            pipeline,
            printer,
            shutdown,
            interrupt,
        })
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn srcdir(&self) -> &Path {
        self.pipeline.context().srcdir()
    }

    /// Dispose the pipeline and flush pending output
    pub async fn close(self) {
        self.interrupt.abort();
        self.pipeline.dispose().await;
        let _ = self.shutdown.send(());
        let _ = self.printer.await;
    }

    /// Close, then report the outcome of a pass
    pub async fn finish(
        self,
        label: &str,
        result: Result<PassReport, BuildlineError>,
        verbose: bool,
    ) -> Result<()> {
        self.close().await;
        let report = result?;
        print_report(label, &report, verbose);
        Ok(())
    }
}

fn check_config(config: &ProjectConfig, verbose: bool) -> Result<()> {
    let validation = ConfigValidator::validate(config);

    if !validation.is_valid() {
        eprintln!("{}", "Configuration validation failed:".red().bold());
        for error in &validation.errors {
            eprintln!("  {} {}", "✗".red(), error);
        }
        return Err(BuildlineError::InvalidConfig {
            reason: validation.errors.join("; "),
            help: Some("Fix the project configuration file".to_string()),
        }
        .into());
    }

    if validation.has_warnings() && verbose {
        eprintln!("{}", "Configuration warnings:".yellow().bold());
        for warning in &validation.warnings {
            eprintln!("  {} {}", "⚠".yellow(), warning);
        }
        eprintln!();
    }
    Ok(())
}

fn spawn_interrupt(pipeline: &Arc<Pipeline>) -> JoinHandle<()> {
    let pipeline = Arc::downgrade(pipeline);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            let Some(pipeline) = pipeline.upgrade() else {
                return;
            };
            if pipeline.cancel() {
                eprintln!("{}", "Cancelling...".yellow());
            }
        }
    })
}

async fn print_events(
    mut events: broadcast::Receiver<PipelineEvent>,
    mut shutdown: oneshot::Receiver<()>,
    verbose: bool,
) {
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => print_event(&event, verbose),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    print_warning(&format!("{} output line(s) dropped", missed));
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
            _ = &mut shutdown => break,
        }
    }

    // Everything a finished pass emitted is already queued.
    while let Ok(event) = events.try_recv() {
        print_event(&event, verbose);
    }
}

fn print_event(event: &PipelineEvent, verbose: bool) {
    match event {
        PipelineEvent::StageStarted { title, .. } => print_info(title),
        PipelineEvent::StageSkipped { title, .. } => {
            print_skipped(&format!("{} (up to date)", title));
        }
        PipelineEvent::StageFinished {
            title,
            action,
            success,
            duration,
            ..
        } => {
            let line = format!("{} {} ({:.2}s)", title, action, duration.as_secs_f64());
            if *success {
                print_success(&line);
            } else {
                print_error(&line);
            }
        }
        PipelineEvent::Output { line, .. } => println!("{}", line),
        PipelineEvent::StateChanged(state) if verbose => {
            println!("  {}", format!("[{}]", state).dimmed());
        }
        _ => {}
    }
}

/// Summary printed after a successful pass
pub fn print_report(label: &str, report: &PassReport, verbose: bool) {
    println!();
    println!(
        "{} {} ran, {} up to date ({:.2}s)",
        format!("{} completed:", label).green().bold(),
        report.executed.len(),
        report.skipped.len(),
        report.duration.as_secs_f64()
    );

    let errors = report
        .diagnostics
        .iter()
        .filter(|d| d.severity >= Severity::Error)
        .count();
    let warnings = report
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Warning)
        .count();
    if errors + warnings > 0 {
        println!("  {} error(s), {} warning(s)", errors, warnings);
    }

    if verbose {
        for diagnostic in &report.diagnostics {
            println!(
                "  {}:{}: {}: {}",
                diagnostic.file.display(),
                diagnostic.line,
                diagnostic.severity,
                diagnostic.message
            );
        }
        for artifact in &report.artifacts {
            println!("  - {}", artifact.display());
        }
    }
}
