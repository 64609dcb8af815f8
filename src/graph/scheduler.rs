// src/graph/scheduler.rs

//! Ready-queue scheduler with stage barriers.
//!
//! The scheduler owns per-task statuses and a per-stage FIFO of ready tasks.
//! Stages are barriers: a task of stage k+1 is never handed out while any
//! task of stage <= k is still pending, ready, or running. Within a stage,
//! dispatch order is insertion order, so the sequence of dispatches is
//! deterministic for identical inputs.

use std::collections::{BTreeMap, VecDeque};

use tracing::debug;

use crate::graph::stale::StaleSet;
use crate::graph::{Graph, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Classified MustRun, waiting on predecessors.
    Pending,
    /// All predecessors resolved; queued for a worker.
    Ready,
    /// Dispatched to a worker.
    Running,
    Done,
    /// Classified Skip: nothing about the task's files changed.
    Skipped,
    /// Failed, or cascaded from a failed predecessor.
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Skipped | TaskStatus::Failed)
    }
}

/// Completion outcome as far as scheduling is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Done,
    Failed,
}

#[derive(Debug)]
pub struct Scheduler {
    status: Vec<TaskStatus>,
    /// Unresolved (non-terminal) predecessor count, meaningful for Pending.
    blocked_on: Vec<usize>,
    /// Stage index to FIFO of task ids that became Ready, in order.
    ready: BTreeMap<usize, VecDeque<TaskId>>,
    /// For Failed tasks, the task whose failure originated the cascade.
    origin: Vec<Option<TaskId>>,
}

impl Scheduler {
    /// A fresh scheduler with every task Skipped; call [`Scheduler::seed`]
    /// with a stale set to arm it.
    pub fn new(graph: &Graph) -> Self {
        Self {
            status: vec![TaskStatus::Skipped; graph.task_count()],
            blocked_on: vec![0; graph.task_count()],
            ready: BTreeMap::new(),
            origin: vec![None; graph.task_count()],
        }
    }

    pub fn status(&self, task: TaskId) -> TaskStatus {
        self.status[task.0 as usize]
    }

    /// For Failed tasks, the originating failure (itself, or the failed
    /// predecessor whose cascade reached it).
    pub fn failure_origin(&self, task: TaskId) -> Option<TaskId> {
        self.origin[task.0 as usize]
    }

    /// True when no task is Pending, Ready, or Running.
    pub fn drained(&self) -> bool {
        !self
            .status
            .iter()
            .any(|s| matches!(s, TaskStatus::Pending | TaskStatus::Ready | TaskStatus::Running))
    }

    /// Lowest stage index that still has a non-terminal task.
    pub fn active_stage(&self, graph: &Graph) -> Option<usize> {
        graph
            .task_ids()
            .filter(|&t| !self.status(t).is_terminal())
            .map(|t| graph.stage_of(t))
            .min()
    }

    /// (Re)arm the scheduler from a stale analysis.
    ///
    /// Tasks classified MustRun become Pending (unless currently Running;
    /// those are left for the reactor to cancel and re-enter). Non-stale
    /// tasks that were Pending or Ready are demoted back to Skipped; Done,
    /// Skipped, and Failed tasks keep their status. Predecessor counts and
    /// the ready queues are rebuilt from scratch in topological order, which
    /// also fixes the deterministic intra-stage dispatch order.
    pub fn seed(&mut self, graph: &Graph, stale: &StaleSet) {
        for &task in graph.topological_order() {
            let index = task.0 as usize;
            if self.status[index] == TaskStatus::Running {
                continue;
            }
            if stale.is_stale(task) {
                self.status[index] = TaskStatus::Pending;
                self.origin[index] = None;
            } else if matches!(self.status[index], TaskStatus::Pending | TaskStatus::Ready) {
                self.status[index] = TaskStatus::Skipped;
            }
        }
        self.rebuild_queues(graph);
    }

    /// Pop the next task allowed to run, marking it Running.
    ///
    /// The head of the lowest-staged non-empty queue is handed out only if
    /// its stage does not exceed the active stage; stages above the barrier
    /// stay queued until every earlier stage drains.
    pub fn next_ready(&mut self, graph: &Graph) -> Option<TaskId> {
        let active = self.active_stage(graph)?;
        for (&stage, queue) in self.ready.range_mut(..=active) {
            while let Some(task) = queue.pop_front() {
                // Entries can go stale when a task is failed or re-seeded
                // while queued; only a still-Ready head counts.
                if self.status[task.0 as usize] == TaskStatus::Ready {
                    self.status[task.0 as usize] = TaskStatus::Running;
                    debug!(task = task.0, stage, "dispatching task");
                    return Some(task);
                }
            }
        }
        None
    }

    /// Record a completion reported by a worker.
    ///
    /// On `Done`, successors with no unresolved predecessors left become
    /// Ready. On `Failed`, every transitive successor that has not already
    /// finished is failed too; the returned list holds the cascaded tasks
    /// (not the failed task itself).
    pub fn complete(&mut self, graph: &Graph, task: TaskId, outcome: Completion) -> Vec<TaskId> {
        let index = task.0 as usize;
        debug_assert_eq!(self.status[index], TaskStatus::Running);
        match outcome {
            Completion::Done => {
                self.status[index] = TaskStatus::Done;
                self.unblock_successors(graph, task);
                Vec::new()
            }
            Completion::Failed => {
                self.status[index] = TaskStatus::Failed;
                self.origin[index] = Some(task);
                self.cascade_failure(graph, task)
            }
        }
    }

    /// Re-enter a cancelled task as Pending with a fresh predecessor count.
    pub fn cancelled(&mut self, graph: &Graph, task: TaskId) {
        let index = task.0 as usize;
        debug_assert_eq!(self.status[index], TaskStatus::Running);
        if let Some(failed) = self.failed_predecessor(graph, task) {
            self.status[index] = TaskStatus::Failed;
            self.origin[index] = self.origin[failed.0 as usize];
            return;
        }
        self.status[index] = TaskStatus::Pending;
        let blocked = self.unresolved_predecessors(graph, task);
        self.blocked_on[index] = blocked;
        if blocked == 0 {
            self.promote(graph, task);
        }
    }

    fn rebuild_queues(&mut self, graph: &Graph) {
        self.ready.clear();

        // Pending tasks inherit failure from predecessors that stay Failed.
        for &task in graph.topological_order() {
            let index = task.0 as usize;
            if self.status[index] != TaskStatus::Pending {
                continue;
            }
            if let Some(failed) = self.failed_predecessor(graph, task) {
                self.status[index] = TaskStatus::Failed;
                self.origin[index] = self.origin[failed.0 as usize].or(Some(failed));
            }
        }

        for &task in graph.topological_order() {
            let index = task.0 as usize;
            if self.status[index] != TaskStatus::Pending {
                continue;
            }
            let blocked = self.unresolved_predecessors(graph, task);
            self.blocked_on[index] = blocked;
            if blocked == 0 {
                self.promote(graph, task);
            }
        }
    }

    fn unresolved_predecessors(&self, graph: &Graph, task: TaskId) -> usize {
        graph
            .predecessors(task)
            .iter()
            .filter(|&&pred| !self.status(pred).is_terminal())
            .count()
    }

    fn failed_predecessor(&self, graph: &Graph, task: TaskId) -> Option<TaskId> {
        graph
            .predecessors(task)
            .iter()
            .copied()
            .find(|&pred| self.status(pred) == TaskStatus::Failed)
    }

    fn promote(&mut self, graph: &Graph, task: TaskId) {
        self.status[task.0 as usize] = TaskStatus::Ready;
        self.ready
            .entry(graph.stage_of(task))
            .or_default()
            .push_back(task);
    }

    fn unblock_successors(&mut self, graph: &Graph, task: TaskId) {
        for &succ in graph.successors(task) {
            let index = succ.0 as usize;
            if self.status[index] != TaskStatus::Pending {
                continue;
            }
            self.blocked_on[index] = self.blocked_on[index].saturating_sub(1);
            if self.blocked_on[index] == 0 {
                self.promote(graph, succ);
            }
        }
    }

    fn cascade_failure(&mut self, graph: &Graph, failed: TaskId) -> Vec<TaskId> {
        let mut cascaded = Vec::new();
        let mut stack: Vec<TaskId> = graph.successors(failed).to_vec();
        while let Some(task) = stack.pop() {
            let index = task.0 as usize;
            if matches!(self.status[index], TaskStatus::Pending | TaskStatus::Ready) {
                self.status[index] = TaskStatus::Failed;
                self.origin[index] = Some(failed);
                cascaded.push(task);
                stack.extend(graph.successors(task).iter().copied());
            }
        }
        cascaded.sort();
        cascaded
    }

    /// Force a task to Running without going through the ready queue.
    ///
    /// Used after a graph rebuild for tasks whose identity survived and whose
    /// process is still executing.
    pub fn set_running(&mut self, task: TaskId) {
        self.status[task.0 as usize] = TaskStatus::Running;
    }
}
