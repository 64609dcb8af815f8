// src/engine/reactor.rs

//! The reactor: online/offline evaluation driver.
//!
//! A single cooperative loop owns the graph, the scheduler, and the stat
//! store, and multiplexes worker completions, filesystem change events, and
//! shutdown over one channel. The loop blocks only on that channel; workers
//! block only on their child process; the scheduler never blocks.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::agenda::{self, Agenda};
use crate::cache::{FileStat, StatStore};
use crate::depend::{self, Depend};
use crate::engine::{ExitOutcome, ReactorEvent, ReactorOptions, ReactorPaths};
use crate::errors::{Result, TaskleError};
use crate::exec::{Assignment, WorkerId, WorkerOutcome, WorkerPool};
use crate::fs::FileSystem;
use crate::graph::scheduler::Completion;
use crate::graph::{stale, Graph, Scheduler, TaskId};
use crate::watch::{ChangeKind, FileWatch};

/// Everything the reactor needs at construction time.
pub struct ReactorSetup {
    pub agenda: Agenda,
    pub depend: Depend,
    pub store: StatStore,
    pub fs: Arc<dyn FileSystem>,
    pub pool: WorkerPool,
    pub options: ReactorOptions,
    pub paths: ReactorPaths,
    pub events_rx: mpsc::Receiver<ReactorEvent>,
    pub watch: Option<Box<dyn FileWatch>>,
}

/// Bookkeeping for one dispatched assignment.
#[derive(Debug)]
struct RunningTask {
    /// Current task id, or `None` once a graph rebuild removed the task's
    /// identity (the eventual outcome is then dropped).
    task: Option<TaskId>,
    cancel: CancellationToken,
    cancel_requested: bool,
}

pub struct Reactor {
    agenda: Agenda,
    depend: Depend,
    graph: Graph,
    scheduler: Scheduler,
    store: StatStore,
    store_dirty: bool,
    fs: Arc<dyn FileSystem>,
    pool: WorkerPool,
    idle: VecDeque<WorkerId>,
    running: HashMap<u64, RunningTask>,
    next_token: u64,
    /// Source paths whose change events are meaningful; everything else
    /// reported by the watcher is noise from shared parent directories.
    watched: HashSet<PathBuf>,
    options: ReactorOptions,
    paths: ReactorPaths,
    events_rx: mpsc::Receiver<ReactorEvent>,
    watch: Option<Box<dyn FileWatch>>,
    failed_any: bool,
}

impl Reactor {
    /// Build the graph, run the initial stale analysis, and arm the watcher.
    ///
    /// An invalid agenda or depend document is fatal here; later reloads in
    /// online mode keep the previous graph in force instead.
    pub fn new(setup: ReactorSetup) -> Result<Self> {
        let ReactorSetup {
            agenda,
            depend,
            store,
            fs,
            pool,
            options,
            paths,
            events_rx,
            watch,
        } = setup;

        let graph = Graph::build(&agenda, &depend, &paths.root)?;
        let scheduler = Scheduler::new(&graph);
        let idle = (0..pool.size()).collect();

        let mut reactor = Self {
            agenda,
            depend,
            graph,
            scheduler,
            store,
            store_dirty: false,
            fs,
            pool,
            idle,
            running: HashMap::new(),
            next_token: 0,
            watched: HashSet::new(),
            options,
            paths,
            events_rx,
            watch,
            failed_any: false,
        };
        reactor.reanalyze();
        reactor.update_watches();
        Ok(reactor)
    }

    /// Drive the evaluation to completion (offline) or until shutdown
    /// (online). Returns whether any task failed along the way.
    pub async fn run(mut self) -> Result<ExitOutcome> {
        info!(
            tasks = self.graph.task_count(),
            workers = self.pool.size(),
            online = self.options.online,
            "reactor started"
        );

        self.dispatch_ready().await?;
        if self.try_quiesce() && !self.options.online {
            info!("nothing to do; all tasks up to date");
            return Ok(self.exit_outcome());
        }

        loop {
            let Some(event) = self.events_rx.recv().await else {
                return Err(TaskleError::Internal(
                    "reactor event channel closed".to_string(),
                ));
            };
            trace!(?event, "reactor received event");

            let keep_running = self.handle_event(event).await?;
            if !keep_running {
                break;
            }

            self.dispatch_ready().await?;
            if self.try_quiesce() && !self.options.online {
                break;
            }
        }

        info!("reactor exiting");
        Ok(self.exit_outcome())
    }

    fn exit_outcome(&self) -> ExitOutcome {
        if self.failed_any {
            ExitOutcome::TaskFailure
        } else {
            ExitOutcome::Success
        }
    }

    async fn handle_event(&mut self, event: ReactorEvent) -> Result<bool> {
        match event {
            ReactorEvent::TaskFinished {
                worker,
                token,
                outcome,
            } => {
                self.handle_task_finished(worker, token, outcome);
                Ok(true)
            }
            ReactorEvent::PathChanged { path, kind } => {
                self.handle_path_changed(path, kind);
                Ok(true)
            }
            ReactorEvent::ShutdownRequested => {
                info!("shutdown requested; cancelling running tasks");
                for running in self.running.values_mut() {
                    if !running.cancel_requested {
                        running.cancel_requested = true;
                        running.cancel.cancel();
                    }
                }
                self.persist_store();
                Ok(false)
            }
        }
    }

    fn handle_task_finished(&mut self, worker: WorkerId, token: u64, outcome: WorkerOutcome) {
        self.idle.push_back(worker);

        let Some(running) = self.running.remove(&token) else {
            warn!(token, "outcome for unknown dispatch token; ignoring");
            return;
        };
        let Some(task) = running.task else {
            debug!(token, "outcome for task removed by rebuild; dropping");
            return;
        };

        // A completion that raced a cancellation request is treated as
        // cancelled: the task ran against invalidated inputs, so nothing it
        // produced may enter the stat store.
        let outcome = if running.cancel_requested && !matches!(outcome, WorkerOutcome::Cancelled) {
            debug!(
                task = %self.graph.task(task).spec.desc,
                "completion raced cancellation; treating as cancelled"
            );
            WorkerOutcome::Cancelled
        } else {
            outcome
        };

        match outcome {
            WorkerOutcome::Ok { output_stats } => {
                // Refresh stats before the status flips to Done, so no
                // successor observes Done with stale bookkeeping.
                self.record_input_stats(task);
                for (path, stat) in output_stats {
                    self.store.put(path, stat);
                }
                self.store_dirty = true;
                info!(task = %self.graph.task(task).spec.desc, "task done");
                self.scheduler.complete(&self.graph, task, Completion::Done);
            }
            WorkerOutcome::Cancelled => {
                info!(
                    task = %self.graph.task(task).spec.desc,
                    "task cancelled; rescheduling"
                );
                self.scheduler.cancelled(&self.graph, task);
            }
            failure => {
                self.failed_any = true;
                let spec = &self.graph.task(task).spec;
                error!(
                    task = %spec.desc,
                    command = %spec.command_line(),
                    outcome = %failure.describe(),
                    "task failed"
                );
                let cascaded = self.scheduler.complete(&self.graph, task, Completion::Failed);
                if !cascaded.is_empty() {
                    let names: Vec<&str> = cascaded
                        .iter()
                        .map(|&t| self.graph.task(t).spec.desc.as_str())
                        .collect();
                    warn!(
                        origin = %self.graph.task(task).spec.desc,
                        skipped = %names.join(", "),
                        "dependent tasks will not run"
                    );
                }
            }
        }
    }

    fn handle_path_changed(&mut self, path: PathBuf, kind: ChangeKind) {
        if path == self.paths.agenda {
            info!(path = %path.display(), "agenda changed, rebuilding");
            self.reload_agenda();
            return;
        }
        if path == self.paths.depend {
            info!(path = %path.display(), "depend changed, rebuilding");
            self.reload_depend();
            return;
        }
        if !self.watched.contains(&path) {
            trace!(path = %path.display(), "change outside watch set; ignoring");
            return;
        }

        info!(path = %path.display(), ?kind, "source changed, rescheduling");
        self.store.put(path, FileStat::DIRTY);
        self.store_dirty = true;
        self.reanalyze();
    }

    /// Re-run the stale analysis and re-arm the scheduler.
    ///
    /// Running tasks whose input closure was dirtied, or whose predecessors
    /// must run again, are working against invalidated inputs: they get a
    /// cancel request and re-enter as Pending once the cancellation comes
    /// back.
    fn reanalyze(&mut self) {
        let stale = stale::analyze(&self.graph, &self.store, self.fs.as_ref());

        for running in self.running.values_mut() {
            let Some(task) = running.task else { continue };
            if running.cancel_requested {
                continue;
            }
            let dirtied = self
                .graph
                .input_closure(task)
                .iter()
                .any(|&f| self.store.get(&self.graph.file(f).path) == Some(FileStat::DIRTY));
            let stale_pred = self
                .graph
                .predecessors(task)
                .iter()
                .any(|&p| stale.is_stale(p));
            if dirtied || stale_pred {
                info!(
                    task = %self.graph.task(task).spec.desc,
                    "inputs invalidated while running; cancelling"
                );
                running.cancel_requested = true;
                running.cancel.cancel();
            }
        }

        self.scheduler.seed(&self.graph, &stale);
    }

    fn reload_agenda(&mut self) {
        match agenda::load_and_validate(&self.paths.agenda) {
            Ok(agenda) => {
                self.agenda = agenda;
                self.rebuild_graph();
            }
            Err(err) => {
                error!(error = %err, "agenda reload failed; previous graph remains in force");
            }
        }
    }

    fn reload_depend(&mut self) {
        match depend::load(&self.paths.depend) {
            Ok(depend) => {
                self.depend = depend;
                self.rebuild_graph();
            }
            Err(err) => {
                error!(error = %err, "depend reload failed; previous graph remains in force");
            }
        }
    }

    /// Rebuild the graph after an agenda/depend edit.
    ///
    /// Running tasks whose structural identity survives the rebuild keep
    /// running under their new id; the rest are cancelled and their eventual
    /// outcomes dropped.
    fn rebuild_graph(&mut self) {
        let graph = match Graph::build(&self.agenda, &self.depend, &self.paths.root) {
            Ok(graph) => graph,
            Err(err) => {
                error!(error = %err, "graph rebuild failed; previous graph remains in force");
                return;
            }
        };

        let identities = graph.identity_map();
        let mut scheduler = Scheduler::new(&graph);

        for running in self.running.values_mut() {
            let Some(old) = running.task else { continue };
            let identity = self.graph.task(old).spec.identity();
            match identities.get(&identity) {
                Some(&new) => {
                    running.task = Some(new);
                    scheduler.set_running(new);
                }
                None => {
                    info!(
                        task = %self.graph.task(old).spec.desc,
                        "task no longer in agenda; cancelling"
                    );
                    running.task = None;
                    if !running.cancel_requested {
                        running.cancel_requested = true;
                        running.cancel.cancel();
                    }
                }
            }
        }

        self.graph = graph;
        self.scheduler = scheduler;
        self.reanalyze();
        self.update_watches();
    }

    /// Hand ready tasks to idle workers, lowest stage first, FIFO within a
    /// stage.
    async fn dispatch_ready(&mut self) -> Result<()> {
        while let Some(&worker) = self.idle.front() {
            let Some(task) = self.scheduler.next_ready(&self.graph) else {
                break;
            };
            self.idle.pop_front();

            let token = self.next_token;
            self.next_token += 1;
            let cancel = CancellationToken::new();
            self.running.insert(
                token,
                RunningTask {
                    task: Some(task),
                    cancel: cancel.clone(),
                    cancel_requested: false,
                },
            );

            let spec = &self.graph.task(task).spec;
            info!(task = %spec.desc, stage = spec.stage, worker, "starting task");
            let assignment = Assignment {
                token,
                desc: spec.desc.clone(),
                argv: spec.command.clone(),
                cwd: self.paths.root.clone(),
                outputs: self
                    .graph
                    .outputs(task)
                    .iter()
                    .map(|&f| self.graph.file(f).path.clone())
                    .collect(),
                cancel,
            };
            self.pool.assign(worker, assignment).await?;
        }
        Ok(())
    }

    /// Record live stats for a completed task's input closure, so the next
    /// analysis sees these exact inputs as the ones the outputs were built
    /// from.
    fn record_input_stats(&mut self, task: TaskId) {
        for file in self.graph.input_closure(task) {
            let path = self.graph.file(file).path.clone();
            match self.fs.stat(&path) {
                Some(stat) => self.store.put(path, stat),
                None => self.store.forget(&path),
            }
        }
    }

    /// Persist the store once nothing is pending, ready, or in flight.
    fn try_quiesce(&mut self) -> bool {
        if !self.scheduler.drained() || !self.running.is_empty() {
            return false;
        }
        self.persist_store();
        true
    }

    fn persist_store(&mut self) {
        if !self.store_dirty {
            return;
        }
        match self.store.persist(&self.paths.cache) {
            Ok(()) => self.store_dirty = false,
            Err(err) => {
                warn!(
                    path = %self.paths.cache.display(),
                    error = %err,
                    "failed to persist stat cache"
                );
            }
        }
    }

    fn update_watches(&mut self) {
        let mut paths = self.graph.watch_sources();
        self.watched = paths.iter().cloned().collect();
        paths.push(self.paths.agenda.clone());
        paths.push(self.paths.depend.clone());

        if let Some(watch) = self.watch.as_mut() {
            if let Err(err) = watch.rewatch(&paths) {
                warn!(error = %err, "failed to update watch set");
            }
        }
    }
}
