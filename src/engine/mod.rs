// src/engine/mod.rs

//! Evaluation engine.
//!
//! The reactor is the single owner of all mutable evaluation state: the
//! graph, the scheduler, and the stat store. Workers, the filesystem
//! watcher, and the signal handler only ever talk to it through the bounded
//! [`ReactorEvent`] channel, so there is no shared mutable data anywhere.

use std::path::PathBuf;

use crate::exec::{WorkerId, WorkerOutcome};
use crate::watch::ChangeKind;

pub mod reactor;

pub use reactor::{Reactor, ReactorSetup};

/// Events flowing into the reactor from workers, watchers, and signals.
#[derive(Debug, Clone)]
pub enum ReactorEvent {
    /// A worker finished an assignment.
    TaskFinished {
        worker: WorkerId,
        /// Dispatch token from the assignment; the reactor resolves it to
        /// the current task identity (or drops it after a rebuild).
        token: u64,
        outcome: WorkerOutcome,
    },
    /// A watched path changed on disk. Changes to the agenda or depend
    /// documents trigger a graph rebuild; changes to source files flip
    /// their stored stat dirty and re-run the stale analysis.
    PathChanged { path: PathBuf, kind: ChangeKind },
    /// Graceful shutdown (e.g. Ctrl-C).
    ShutdownRequested,
}

#[derive(Debug, Clone, Copy)]
pub struct ReactorOptions {
    /// Online mode stays in the loop after quiescence and reacts to
    /// filesystem changes; offline mode exits at quiescence.
    pub online: bool,
}

/// How the reactor loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    /// At least one task failed during the run.
    TaskFailure,
}

/// Locations the reactor needs across its lifetime.
#[derive(Debug, Clone)]
pub struct ReactorPaths {
    pub agenda: PathBuf,
    pub depend: PathBuf,
    pub cache: PathBuf,
    /// Project root; relative agenda/depend paths resolve against it and
    /// task processes run inside it.
    pub root: PathBuf,
}
