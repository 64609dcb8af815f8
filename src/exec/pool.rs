// src/exec/pool.rs

//! Fixed-size worker pool.
//!
//! Each worker is a Tokio task with a one-slot assignment mailbox. Workers
//! pull an assignment, prepare output directories, invoke the task runner,
//! stat the declared outputs, and report a [`WorkerOutcome`] to the reactor.
//! The reactor only hands out an assignment when it knows the worker is
//! idle, so nothing ever queues behind a busy worker.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::cache::FileStat;
use crate::engine::ReactorEvent;
use crate::errors::{Result, TaskleError};
use crate::fs::FileSystem;

use super::runner::{RunResult, TaskRunner};

pub type WorkerId = usize;

/// One unit of work handed to a worker.
#[derive(Debug, Clone)]
pub struct Assignment {
    /// Unique per dispatch; outcomes are matched back by token, so results
    /// arriving after a graph rebuild can be remapped or dropped.
    pub token: u64,
    pub desc: String,
    pub argv: Vec<String>,
    pub cwd: PathBuf,
    /// Declared outputs, resolved to absolute paths.
    pub outputs: Vec<PathBuf>,
    pub cancel: CancellationToken,
}

/// Outcome of one assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Exit status 0 and every declared output exists; stats included.
    Ok {
        output_stats: Vec<(PathBuf, FileStat)>,
    },
    /// Exit status 0 but one or more declared outputs are absent.
    MissingOutput { missing: Vec<PathBuf> },
    NonZeroExit(i32),
    SpawnError(std::io::ErrorKind),
    /// Cancellation was requested; no stats are reported.
    Cancelled,
}

impl WorkerOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            WorkerOutcome::MissingOutput { .. }
                | WorkerOutcome::NonZeroExit(_)
                | WorkerOutcome::SpawnError(_)
        )
    }

    /// Short human-readable label for log records.
    pub fn describe(&self) -> String {
        match self {
            WorkerOutcome::Ok { .. } => "ok".to_string(),
            WorkerOutcome::MissingOutput { missing } => {
                let paths: Vec<String> =
                    missing.iter().map(|p| p.display().to_string()).collect();
                format!("missing outputs: {}", paths.join(", "))
            }
            WorkerOutcome::NonZeroExit(code) => format!("exit code {code}"),
            WorkerOutcome::SpawnError(kind) => format!("spawn error: {kind}"),
            WorkerOutcome::Cancelled => "cancelled".to_string(),
        }
    }
}

/// Handle to the spawned workers.
#[derive(Debug)]
pub struct WorkerPool {
    assign_txs: Vec<mpsc::Sender<Assignment>>,
}

impl WorkerPool {
    /// Spawn `count` workers reporting outcomes on `events_tx`.
    pub fn spawn(
        count: usize,
        runner: Arc<dyn TaskRunner>,
        fs: Arc<dyn FileSystem>,
        events_tx: mpsc::Sender<ReactorEvent>,
    ) -> Self {
        let count = count.max(1);
        let mut assign_txs = Vec::with_capacity(count);
        for worker in 0..count {
            let (tx, rx) = mpsc::channel::<Assignment>(1);
            assign_txs.push(tx);
            tokio::spawn(worker_loop(
                worker,
                rx,
                Arc::clone(&runner),
                Arc::clone(&fs),
                events_tx.clone(),
            ));
        }
        Self { assign_txs }
    }

    pub fn size(&self) -> usize {
        self.assign_txs.len()
    }

    pub async fn assign(&self, worker: WorkerId, assignment: Assignment) -> Result<()> {
        self.assign_txs[worker]
            .send(assignment)
            .await
            .map_err(|_| TaskleError::Internal(format!("worker {worker} mailbox closed")))
    }
}

async fn worker_loop(
    worker: WorkerId,
    mut assignments: mpsc::Receiver<Assignment>,
    runner: Arc<dyn TaskRunner>,
    fs: Arc<dyn FileSystem>,
    events_tx: mpsc::Sender<ReactorEvent>,
) {
    debug!(worker, "worker started");
    while let Some(assignment) = assignments.recv().await {
        let token = assignment.token;
        let outcome = execute(worker, assignment, runner.as_ref(), fs.as_ref()).await;
        if events_tx
            .send(ReactorEvent::TaskFinished {
                worker,
                token,
                outcome,
            })
            .await
            .is_err()
        {
            // Reactor is gone; nothing left to report to.
            break;
        }
    }
    debug!(worker, "worker finished");
}

async fn execute(
    worker: WorkerId,
    assignment: Assignment,
    runner: &dyn TaskRunner,
    fs: &dyn FileSystem,
) -> WorkerOutcome {
    debug!(
        worker,
        task = %assignment.desc,
        command = %assignment.argv.join(" "),
        "worker picked up task"
    );

    for output in &assignment.outputs {
        if let Some(parent) = output.parent() {
            if let Err(err) = fs.create_dir_all(parent) {
                error!(
                    worker,
                    task = %assignment.desc,
                    dir = %parent.display(),
                    error = %err,
                    "failed to create output directory"
                );
                return WorkerOutcome::SpawnError(err.kind());
            }
        }
    }

    match runner
        .run(&assignment.argv, &assignment.cwd, assignment.cancel.clone())
        .await
    {
        RunResult::Exited(0) => collect_output_stats(&assignment, fs),
        RunResult::Exited(code) => WorkerOutcome::NonZeroExit(code),
        RunResult::Cancelled => WorkerOutcome::Cancelled,
        RunResult::SpawnFailed(kind) => WorkerOutcome::SpawnError(kind),
    }
}

fn collect_output_stats(assignment: &Assignment, fs: &dyn FileSystem) -> WorkerOutcome {
    let mut output_stats = Vec::with_capacity(assignment.outputs.len());
    let mut missing = Vec::new();
    for output in &assignment.outputs {
        match fs.stat(output) {
            Some(stat) => output_stats.push((output.clone(), stat)),
            None => missing.push(output.clone()),
        }
    }
    if missing.is_empty() {
        WorkerOutcome::Ok { output_stats }
    } else {
        WorkerOutcome::MissingOutput { missing }
    }
}
