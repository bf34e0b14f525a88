// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Watch command - rebuild on file changes

use colored::Colorize;
use miette::Result;
use notify::{RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use super::session::{print_report, Session};
use crate::config::is_build_definition;
use crate::errors::BuildlineError;
use crate::pipeline::{Phase, Pipeline};

/// Run the watch command
pub async fn run(debounce_ms: u64, config: Option<PathBuf>, verbose: bool) -> Result<()> {
    let session = Session::open(config, verbose).await?;
    let pipeline = session.pipeline().clone();
    let srcdir = session.srcdir().to_path_buf();
    let builddir = pipeline.context().builddir().to_path_buf();

    println!("{}", "Starting watch mode...".bold());
    println!("Watching {} (debounce: {}ms)", srcdir.display(), debounce_ms);
    println!("Press {} to exit.", "Ctrl+C".cyan());
    println!();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut debouncer = new_debouncer(
        Duration::from_millis(debounce_ms),
        move |result: DebounceEventResult| {
            let _ = tx.send(result);
        },
    )
    .map_err(|e| BuildlineError::Watch {
        message: format!("Failed to create file watcher: {}", e),
    })?;

    debouncer
        .watcher()
        .watch(&srcdir, RecursiveMode::Recursive)
        .map_err(|e| BuildlineError::Watch {
            message: format!("Failed to start watching: {}", e),
        })?;

    let mut watching = build_until(&pipeline, verbose, tokio::signal::ctrl_c()).await;

    while watching {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = rx.recv() => match received {
                Some(Ok(events)) => {
                    let changed: Vec<_> = events
                        .iter()
                        .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
                        .map(|e| e.path.as_path())
                        .filter(|path| is_relevant(path, &builddir))
                        .collect();
                    if changed.is_empty() {
                        continue;
                    }

                    println!();
                    println!("{}", "─".repeat(50).dimmed());
                    println!("{}: {} file(s) changed", "Change detected".yellow(), changed.len());
                    if verbose {
                        for path in &changed {
                            println!("  {}", path.display());
                        }
                    }
                    println!();

                    invalidate_for(&pipeline, &changed);
                    watching = build_until(&pipeline, verbose, tokio::signal::ctrl_c()).await;
                }
                Some(Err(e)) => eprintln!("{}: {}", "Watch error".red(), e),
                None => break,
            }
        }
    }

    drop(debouncer);
    drop(pipeline);
    session.close().await;
    Ok(())
}

/// Skip build output and VCS metadata
fn is_relevant(path: &Path, builddir: &Path) -> bool {
    !path.starts_with(builddir) && !path.components().any(|c| c.as_os_str() == ".git")
}

/// Invalidate what a set of changes can affect
///
/// Build definitions may change how the project is configured, so every
/// stage runs again. Other files only affect the build phase onwards.
fn invalidate_for(pipeline: &Pipeline, changed: &[&Path]) {
    if changed.iter().any(|path| is_build_definition(path)) {
        pipeline.invalidate_all();
    } else {
        pipeline.invalidate_from(Phase::Build);
    }
}

async fn build_once(pipeline: &Pipeline, verbose: bool) {
    match pipeline.build().await {
        Ok(report) => print_report("Build", &report, verbose),
        Err(e) => eprintln!("{}: {}", "Build failed".red(), e),
    }
}

/// Build once, cancelling if `interrupt` completes first
///
/// Returns `false` when interrupted so the caller stops watching.
async fn build_until<F: Future>(pipeline: &Pipeline, verbose: bool, interrupt: F) -> bool {
    let build = build_once(pipeline, verbose);
    tokio::pin!(build);

    tokio::select! {
        _ = &mut build => true,
        _ = interrupt => {
            pipeline.cancel();
            build.await;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineContext;
    use crate::stages::{Command, CommandStage, Stage};
    use std::sync::Arc;

    #[test]
    fn test_relevance() {
        let builddir = Path::new("/src/_build");
        assert!(is_relevant(Path::new("/src/main.c"), builddir));
        assert!(!is_relevant(Path::new("/src/_build/main.o"), builddir));
        assert!(!is_relevant(Path::new("/src/.git/index"), builddir));
    }

    #[tokio::test]
    async fn test_interrupt_ends_a_running_build() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(PipelineContext::new("p", dir.path(), dir.path().join("_build")));
        let sleeper: Arc<dyn Stage> = Arc::new(
            CommandStage::new("sleeper", Phase::Build).with_build(Command::shell("sleep 30")),
        );
        pipeline.add_stage(sleeper).unwrap();

        let interrupt = tokio::time::sleep(Duration::from_millis(300));
        let watching = tokio::time::timeout(
            Duration::from_secs(5),
            build_until(&pipeline, false, interrupt),
        )
        .await
        .unwrap();

        assert!(!watching);
        assert!(!pipeline.is_busy());
    }

    #[tokio::test]
    async fn test_finished_build_keeps_watching() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(PipelineContext::new("p", dir.path(), dir.path().join("_build")));

        assert!(build_until(&pipeline, false, std::future::pending::<()>()).await);
    }

    #[test]
    fn test_source_change_keeps_configure() {
        let pipeline = Pipeline::new(PipelineContext::new("p", "/src", "/src/_build"));
        let configure: Arc<dyn Stage> =
            Arc::new(CommandStage::new("conf", Phase::Configure).with_build(Command::shell("true")));
        let compile: Arc<dyn Stage> =
            Arc::new(CommandStage::new("make", Phase::Build).with_build(Command::shell("true")));
        for stage in [&configure, &compile] {
            stage.state().set_completed(true);
            pipeline.add_stage(stage.clone()).unwrap();
        }

        invalidate_for(&pipeline, &[Path::new("/src/main.c")]);
        assert!(configure.is_completed());
        assert!(!compile.is_completed());

        invalidate_for(&pipeline, &[Path::new("/src/meson.build")]);
        assert!(!configure.is_completed());
    }
}
