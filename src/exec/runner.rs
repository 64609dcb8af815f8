// src/exec/runner.rs

//! Task process runner capability.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Raw result of running a task's command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    /// Process ran to completion with this exit code.
    Exited(i32),
    /// Cancellation was requested and the process was terminated.
    Cancelled,
    /// The process could not be started.
    SpawnFailed(std::io::ErrorKind),
}

/// Capability for executing a task's effective command.
///
/// Implementations must honor `cancel` by terminating the child promptly and
/// reporting [`RunResult::Cancelled`].
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, argv: &[String], cwd: &Path, cancel: CancellationToken) -> RunResult;
}

/// Production runner: spawns the argv directly (no shell), pipes stdout and
/// stderr into the log at debug level, and kills the child on cancellation.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

#[async_trait]
impl TaskRunner for ProcessRunner {
    async fn run(&self, argv: &[String], cwd: &Path, cancel: CancellationToken) -> RunResult {
        let (program, args) = match argv.split_first() {
            Some(split) => split,
            None => return RunResult::SpawnFailed(std::io::ErrorKind::InvalidInput),
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(program = %program, error = %err, "failed to spawn task process");
                return RunResult::SpawnFailed(err.kind());
            }
        };

        // Drain both pipes so the child never blocks on a full buffer.
        if let Some(stdout) = child.stdout.take() {
            let program = program.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(program = %program, "stdout: {line}");
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let program = program.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(program = %program, "stderr: {line}");
                }
            });
        }

        tokio::select! {
            status = child.wait() => match status {
                Ok(status) => {
                    let code = status.code().unwrap_or(-1);
                    debug!(program = %program, exit_code = code, "task process exited");
                    RunResult::Exited(code)
                }
                Err(err) => {
                    warn!(program = %program, error = %err, "failed waiting for task process");
                    RunResult::SpawnFailed(err.kind())
                }
            },
            _ = cancel.cancelled() => {
                info!(program = %program, "cancellation requested; killing task process");
                if let Err(err) = child.kill().await {
                    warn!(program = %program, error = %err, "failed to kill task process");
                }
                RunResult::Cancelled
            }
        }
    }
}
