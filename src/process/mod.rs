// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 buildline contributors

//! Process launching and supervision
//!
//! [`ProcessLauncher`] composes argv, environment and working directory
//! through a stack of [`LaunchLayer`]s and spawns the result in its own
//! process group. [`Subprocess`] waits for it, honoring cancellation by
//! killing the whole group.

mod layer;

pub use layer::{
    CommandLine, HostLayer, LaunchLayer, MinimalEnvironment, ShellLayer, WrapperLayer,
    MINIMAL_ENVIRONMENT,
};

use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::errors::{BuildlineError, BuildlineResult};
use crate::progress::Cancellable;

/// Receives captured output one line at a time
pub type OutputSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Builder for a supervised subprocess
pub struct ProcessLauncher {
    top: CommandLine,
    layers: Vec<Box<dyn LaunchLayer>>,
    inherit_environment: bool,
    fds: Vec<(OwnedFd, RawFd)>,
    sink: Option<OutputSink>,
}

impl ProcessLauncher {
    pub fn new() -> Self {
        Self {
            top: CommandLine::default(),
            layers: Vec::new(),
            inherit_environment: true,
            fds: Vec::new(),
            sink: None,
        }
    }

    /// Execute directly on the host, inheriting this process's environment
    pub fn push_host(&mut self) {
        self.inherit_environment = true;
        self.layers.push(Box::new(HostLayer));
    }

    /// Replace the inherited environment with [`MINIMAL_ENVIRONMENT`]
    pub fn add_minimal_environment(&mut self) {
        self.inherit_environment = false;
        self.layers.push(Box::new(MinimalEnvironment::capture()));
    }

    /// Run the argv as a shell script
    pub fn push_shell(&mut self) {
        self.layers.push(Box::new(ShellLayer));
    }

    pub fn push(&mut self, layer: impl LaunchLayer + 'static) {
        self.layers.push(Box::new(layer));
    }

    pub fn setenv(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.top.env.insert(key.into(), value.into());
    }

    pub fn unsetenv(&mut self, key: &str) {
        self.top.env.remove(key);
    }

    pub fn getenv(&self, key: &str) -> Option<&str> {
        self.top.env.get(key).map(String::as_str)
    }

    pub fn append_argv(&mut self, arg: impl Into<String>) {
        self.top.argv.push(arg.into());
    }

    pub fn append_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.top.argv.extend(args.into_iter().map(Into::into));
    }

    pub fn set_cwd(&mut self, cwd: impl Into<PathBuf>) {
        self.top.cwd = Some(cwd.into());
    }

    pub fn cwd(&self) -> Option<&std::path::Path> {
        self.top.cwd.as_deref()
    }

    /// Hand `fd` to the child as descriptor `target`
    ///
    /// Descriptors not taken this way are closed in the child.
    pub fn take_fd(&mut self, fd: OwnedFd, target: RawFd) {
        self.fds.retain(|(_, existing)| *existing != target);
        self.fds.push((fd, target));
    }

    /// Forward captured stdout and stderr lines to `sink`
    ///
    /// Without a sink, stdout is collected for [`Subprocess::communicate`].
    pub fn set_output_sink(&mut self, sink: OutputSink) {
        self.sink = Some(sink);
    }

    /// The command line after folding every layer
    pub fn command_line(&self) -> BuildlineResult<CommandLine> {
        self.layers
            .iter()
            .rev()
            .try_fold(self.top.clone(), |line, layer| layer.apply(line))
    }

    /// Start the process
    pub fn spawn(self) -> BuildlineResult<Subprocess> {
        let line = self.command_line()?;
        let Some((program, args)) = line.argv.split_first() else {
            return Err(BuildlineError::ProcessSpawnFailed {
                program: String::new(),
                error: "empty argument vector".to_string(),
                help: Some("Configure a command to run for this stage".to_string()),
            });
        };

        trace!(argv = ?line.argv, cwd = ?line.cwd, "spawning");

        let mut cmd = Command::new(program);
        cmd.args(args);
        if !self.inherit_environment {
            cmd.env_clear();
        }
        cmd.envs(&line.env);
        if let Some(cwd) = &line.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut extra = Vec::new();
        for (fd, target) in self.fds {
            match target {
                0 => {
                    cmd.stdin(Stdio::from(fd));
                }
                1 => {
                    cmd.stdout(Stdio::from(fd));
                }
                2 => {
                    cmd.stderr(Stdio::from(fd));
                }
                _ => extra.push((fd, target)),
            }
        }

        let mapping: Vec<(RawFd, RawFd)> =
            extra.iter().map(|(fd, target)| (fd.as_raw_fd(), *target)).collect();
        // SAFETY: only async-signal-safe libc calls run between fork and exec.
        unsafe {
            cmd.pre_exec(move || {
                if libc::setpgid(0, 0) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                for &(source, target) in &mapping {
                    if source == target {
                        let flags = libc::fcntl(source, libc::F_GETFD);
                        if flags == -1
                            || libc::fcntl(source, libc::F_SETFD, flags & !libc::FD_CLOEXEC) == -1
                        {
                            return Err(std::io::Error::last_os_error());
                        }
                    } else if libc::dup2(source, target) == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                }
                Ok(())
            });
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| BuildlineError::spawn_failed(program, &e))?;
        drop(extra);

        let pgid = child.id().map(|pid| pid as libc::pid_t);
        debug!(program = %program, pid = ?pgid, "spawned");

        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(pump(out, self.sink.clone())));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(pump(err, self.sink.clone())));

        Ok(Subprocess {
            program: program.clone(),
            child,
            pgid,
            stdout,
            stderr,
        })
    }
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

async fn pump<R: AsyncRead + Unpin>(reader: R, sink: Option<OutputSink>) -> String {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut collected = String::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let text = String::from_utf8_lossy(&buf);
        let line = text.trim_end_matches(&['\r', '\n'][..]);
        match &sink {
            Some(sink) => sink(line),
            None => {
                collected.push_str(line);
                collected.push('\n');
            }
        }
    }

    collected
}

/// A running child process
///
/// Dropping a `Subprocess` before it has been reaped and its output drained
/// kills its process group.
pub struct Subprocess {
    program: String,
    child: Child,
    pgid: Option<libc::pid_t>,
    stdout: Option<JoinHandle<String>>,
    stderr: Option<JoinHandle<String>>,
}

impl Subprocess {
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Process id, or `None` once reaped
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Kill the child's process group
    ///
    /// The group outlives its leader, so background children are reached
    /// even after the leader has been reaped.
    pub fn force_exit(&mut self) {
        if let Some(pgid) = self.pgid {
            debug!(program = %self.program, pgid, "killing process group");
            // SAFETY: plain syscall on the group created in `pre_exec`.
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
        let _ = self.child.start_kill();
    }

    /// Wait for exit, killing the process group if `cancellable` fires first
    pub async fn wait(&mut self, cancellable: &Cancellable) -> BuildlineResult<ExitStatus> {
        tokio::select! {
            status = self.child.wait() => return Ok(status?),
            _ = cancellable.cancelled() => {}
        }
        Err(self.abandon().await)
    }

    /// Wait for a successful exit
    pub async fn wait_check(mut self, cancellable: &Cancellable) -> BuildlineResult<()> {
        self.communicate(cancellable).await.map(|_| ())
    }

    /// Wait for a successful exit and return collected stdout
    ///
    /// Output is drained until every process holding the pipes closes them,
    /// and cancellation is honored throughout.
    pub async fn communicate(&mut self, cancellable: &Cancellable) -> BuildlineResult<String> {
        let collected = tokio::select! {
            collected = self.collect() => Some(collected),
            _ = cancellable.cancelled() => None,
        };
        let Some(collected) = collected else {
            return Err(self.abandon().await);
        };
        let (status, stdout) = collected?;

        if status.success() {
            Ok(stdout)
        } else {
            Err(BuildlineError::ProcessExitNonZero {
                program: self.program.clone(),
                code: status.code(),
                signal: status.signal(),
            })
        }
    }

    async fn collect(&mut self) -> BuildlineResult<(ExitStatus, String)> {
        let status = self.child.wait().await?;

        let mut stdout = String::new();
        if let Some(reader) = self.stdout.as_mut() {
            stdout = reader.await.unwrap_or_default();
            self.stdout = None;
        }
        if let Some(reader) = self.stderr.as_mut() {
            let _ = reader.await;
            self.stderr = None;
        }
        Ok((status, stdout))
    }

    async fn abandon(&mut self) -> BuildlineError {
        self.force_exit();
        let _ = self.child.wait().await;
        for reader in [self.stdout.take(), self.stderr.take()].into_iter().flatten() {
            reader.abort();
        }
        BuildlineError::Cancelled
    }

    fn is_settled(&self) -> bool {
        self.child.id().is_none() && self.stdout.is_none() && self.stderr.is_none()
    }
}

impl Drop for Subprocess {
    fn drop(&mut self) {
        if !self.is_settled() {
            self.force_exit();
        }
    }
}
