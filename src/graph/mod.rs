// src/graph/mod.rs

//! Bipartite task/file dependency graph.
//!
//! Nodes live in two arena tables indexed by [`TaskId`] and [`FileId`]; every
//! cross-reference is an id, never an owning handle, so the back-pointers
//! (file to producing task, file to consuming tasks) cannot form reference
//! cycles.
//!
//! Explicit edges come from the agenda (task consumes/produces file);
//! implicit edges come from the depend document (file depends on file) and
//! are resolved into per-file transitive closures at build time. Implicit
//! edges never create task-to-task edges directly.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::agenda::{Agenda, TaskIdentity, TaskSpec};
use crate::depend::Depend;
use crate::errors::LoadError;

pub mod scheduler;
pub mod stale;

pub use scheduler::{Scheduler, TaskStatus};
pub use stale::{analyze, StaleSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

impl TaskId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl FileId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct TaskNode {
    pub spec: TaskSpec,
    pub inputs: Vec<FileId>,
    pub outputs: Vec<FileId>,
}

#[derive(Debug, Clone)]
pub struct FileNode {
    /// Absolute path, resolved against the project root.
    pub path: PathBuf,
    pub produced_by: Option<TaskId>,
    pub consumed_by: Vec<TaskId>,
}

impl FileNode {
    /// A file is initial if no task produces it.
    pub fn is_initial(&self) -> bool {
        self.produced_by.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct Graph {
    tasks: Vec<TaskNode>,
    files: Vec<FileNode>,
    by_path: HashMap<PathBuf, FileId>,
    /// Per file: files it directly depends on via implicit edges.
    implicit: Vec<Vec<FileId>>,
    /// Per file: transitive implicit closure, sorted by id.
    closures: Vec<Vec<FileId>>,
    /// Per task: direct predecessors/successors through explicit edges.
    preds: Vec<Vec<TaskId>>,
    succs: Vec<Vec<TaskId>>,
    topo: Vec<TaskId>,
    stage_count: usize,
}

impl Graph {
    /// Build and validate the graph from a normalized agenda and depend
    /// document. Relative paths are resolved against `root`.
    ///
    /// Fails on: a duplicate output producer, a cycle in the task DAG, a
    /// cycle in the implicit file DAG, or a producer staged after one of its
    /// consumers.
    pub fn build(agenda: &Agenda, depend: &Depend, root: &Path) -> Result<Self, LoadError> {
        let mut builder = Builder::new(root);

        for (index, spec) in agenda.tasks.iter().enumerate() {
            builder.add_task(TaskId(index as u32), spec)?;
        }
        builder.add_implicit(depend)?;

        builder.finish(agenda.stage_count)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn task(&self, id: TaskId) -> &TaskNode {
        &self.tasks[id.index()]
    }

    pub fn file(&self, id: FileId) -> &FileNode {
        &self.files[id.index()]
    }

    pub fn file_id(&self, path: &Path) -> Option<FileId> {
        self.by_path.get(path).copied()
    }

    pub fn task_ids(&self) -> impl Iterator<Item = TaskId> {
        (0..self.tasks.len() as u32).map(TaskId)
    }

    pub fn file_ids(&self) -> impl Iterator<Item = FileId> {
        (0..self.files.len() as u32).map(FileId)
    }

    pub fn inputs(&self, task: TaskId) -> &[FileId] {
        &self.tasks[task.index()].inputs
    }

    pub fn outputs(&self, task: TaskId) -> &[FileId] {
        &self.tasks[task.index()].outputs
    }

    pub fn task_producing(&self, file: FileId) -> Option<TaskId> {
        self.files[file.index()].produced_by
    }

    pub fn tasks_consuming(&self, file: FileId) -> &[TaskId] {
        &self.files[file.index()].consumed_by
    }

    /// Files this file directly depends on via implicit edges.
    pub fn implicit_deps(&self, file: FileId) -> &[FileId] {
        &self.implicit[file.index()]
    }

    /// All files transitively reachable from `file` via implicit edges,
    /// excluding `file` itself.
    pub fn implicit_closure(&self, file: FileId) -> &[FileId] {
        &self.closures[file.index()]
    }

    pub fn stage_of(&self, task: TaskId) -> usize {
        self.tasks[task.index()].spec.stage
    }

    pub fn stage_count(&self) -> usize {
        self.stage_count
    }

    /// Direct predecessor tasks: producers of this task's inputs.
    pub fn predecessors(&self, task: TaskId) -> &[TaskId] {
        &self.preds[task.index()]
    }

    /// Direct successor tasks: consumers of this task's outputs.
    pub fn successors(&self, task: TaskId) -> &[TaskId] {
        &self.succs[task.index()]
    }

    /// Tasks in a deterministic topological order of the explicit DAG.
    pub fn topological_order(&self) -> &[TaskId] {
        &self.topo
    }

    /// Structural identity of every task, for continuity across rebuilds.
    pub fn identity_map(&self) -> HashMap<TaskIdentity, TaskId> {
        self.task_ids()
            .map(|id| (self.task(id).spec.identity(), id))
            .collect()
    }

    /// Input closure of a task: its declared inputs plus every file in each
    /// input's implicit closure, deduplicated.
    pub fn input_closure(&self, task: TaskId) -> Vec<FileId> {
        let mut out: BTreeSet<FileId> = BTreeSet::new();
        for &input in self.inputs(task) {
            out.insert(input);
            out.extend(self.implicit_closure(input).iter().copied());
        }
        out.into_iter().collect()
    }

    /// Initial files whose changes can invalidate some task: every file in
    /// the input closure of any task that is not produced by a task.
    pub fn watch_sources(&self) -> Vec<PathBuf> {
        let mut out: BTreeSet<PathBuf> = BTreeSet::new();
        for task in self.task_ids() {
            for file in self.input_closure(task) {
                let node = self.file(file);
                if node.is_initial() {
                    out.insert(node.path.clone());
                }
            }
        }
        out.into_iter().collect()
    }
}

struct Builder {
    root: PathBuf,
    tasks: Vec<TaskNode>,
    files: Vec<FileNode>,
    by_path: HashMap<PathBuf, FileId>,
    implicit: Vec<Vec<FileId>>,
}

impl Builder {
    fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            tasks: Vec::new(),
            files: Vec::new(),
            by_path: HashMap::new(),
            implicit: Vec::new(),
        }
    }

    fn intern(&mut self, path: &Path) -> FileId {
        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        if let Some(&id) = self.by_path.get(&resolved) {
            return id;
        }
        let id = FileId(self.files.len() as u32);
        self.files.push(FileNode {
            path: resolved.clone(),
            produced_by: None,
            consumed_by: Vec::new(),
        });
        self.implicit.push(Vec::new());
        self.by_path.insert(resolved, id);
        id
    }

    fn add_task(&mut self, id: TaskId, spec: &TaskSpec) -> Result<(), LoadError> {
        debug_assert_eq!(id.index(), self.tasks.len());

        let inputs: Vec<FileId> = spec.inputs.iter().map(|p| self.intern(p)).collect();
        let outputs: Vec<FileId> = spec.outputs.iter().map(|p| self.intern(p)).collect();

        for &output in &outputs {
            let node = &mut self.files[output.index()];
            if node.produced_by.is_some() {
                return Err(LoadError::DuplicateOutput {
                    path: node.path.clone(),
                });
            }
            node.produced_by = Some(id);
        }
        for &input in &inputs {
            self.files[input.index()].consumed_by.push(id);
        }

        self.tasks.push(TaskNode {
            spec: spec.clone(),
            inputs,
            outputs,
        });
        Ok(())
    }

    fn add_implicit(&mut self, depend: &Depend) -> Result<(), LoadError> {
        for (src, dsts) in &depend.edges {
            let src = self.intern(src);
            for dst in dsts {
                let dst = self.intern(dst);
                if !self.implicit[src.index()].contains(&dst) {
                    self.implicit[src.index()].push(dst);
                }
            }
        }
        Ok(())
    }

    fn finish(self, stage_count: usize) -> Result<Graph, LoadError> {
        let Builder {
            tasks,
            files,
            by_path,
            implicit,
            ..
        } = self;

        // Explicit task edges through file production/consumption.
        let mut preds: Vec<Vec<TaskId>> = vec![Vec::new(); tasks.len()];
        let mut succs: Vec<Vec<TaskId>> = vec![Vec::new(); tasks.len()];
        for (index, task) in tasks.iter().enumerate() {
            let consumer = TaskId(index as u32);
            for &input in &task.inputs {
                if let Some(producer) = files[input.index()].produced_by {
                    if producer == consumer {
                        // A task reading its own output forms a one-task cycle.
                        return Err(LoadError::TaskCycle {
                            task: task.spec.desc.clone(),
                        });
                    }
                    if !preds[consumer.index()].contains(&producer) {
                        preds[consumer.index()].push(producer);
                        succs[producer.index()].push(consumer);
                    }
                }
            }
        }

        // Stage order must be consistent with the explicit DAG, otherwise
        // the stage barrier can never be satisfied.
        for (index, task) in tasks.iter().enumerate() {
            let consumer = TaskId(index as u32);
            for &producer in &preds[consumer.index()] {
                let producer_stage = tasks[producer.index()].spec.stage;
                if producer_stage > task.spec.stage {
                    return Err(LoadError::StageOrder {
                        producer: tasks[producer.index()].spec.desc.clone(),
                        consumer: task.spec.desc.clone(),
                        producer_stage,
                        consumer_stage: task.spec.stage,
                    });
                }
            }
        }

        let topo = task_topological_order(&tasks, &preds, &succs)?;
        let closures = implicit_closures(&files, &implicit)?;

        Ok(Graph {
            tasks,
            files,
            by_path,
            implicit,
            closures,
            preds,
            succs,
            topo,
            stage_count,
        })
    }
}

/// Deterministic Kahn topological sort over the task DAG; detects cycles.
///
/// Among simultaneously unblocked tasks the lowest id goes first, so the
/// order is stable for identical inputs.
fn task_topological_order(
    tasks: &[TaskNode],
    preds: &[Vec<TaskId>],
    succs: &[Vec<TaskId>],
) -> Result<Vec<TaskId>, LoadError> {
    let mut indegree: Vec<usize> = preds.iter().map(|p| p.len()).collect();
    let mut frontier: BTreeSet<TaskId> = indegree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| TaskId(i as u32))
        .collect();

    let mut order = Vec::with_capacity(tasks.len());
    while let Some(&next) = frontier.iter().next() {
        frontier.remove(&next);
        order.push(next);
        for &succ in &succs[next.index()] {
            indegree[succ.index()] -= 1;
            if indegree[succ.index()] == 0 {
                frontier.insert(succ);
            }
        }
    }

    if order.len() != tasks.len() {
        let stuck = indegree
            .iter()
            .position(|&d| d > 0)
            .expect("an unordered task must have unresolved predecessors");
        return Err(LoadError::TaskCycle {
            task: tasks[stuck].spec.desc.clone(),
        });
    }
    Ok(order)
}

/// Validate the implicit file graph is acyclic and compute per-file
/// transitive closures.
fn implicit_closures(
    files: &[FileNode],
    implicit: &[Vec<FileId>],
) -> Result<Vec<Vec<FileId>>, LoadError> {
    let mut graph: DiGraphMap<u32, ()> = DiGraphMap::new();
    for id in 0..files.len() as u32 {
        graph.add_node(id);
    }
    for (index, deps) in implicit.iter().enumerate() {
        for dep in deps {
            graph.add_edge(index as u32, dep.0, ());
        }
    }

    // Edges point from a file to its dependencies, so the sort yields
    // dependents before dependencies; walking it in reverse guarantees every
    // dependency's closure is complete before it is needed.
    let order = toposort(&graph, None).map_err(|cycle| LoadError::FileCycle {
        path: files[cycle.node_id() as usize].path.clone(),
    })?;

    let mut closures: Vec<Vec<FileId>> = vec![Vec::new(); files.len()];
    for id in order.into_iter().rev() {
        let index = id as usize;
        let mut closure: BTreeSet<FileId> = BTreeSet::new();
        for &dep in &implicit[index] {
            closure.insert(dep);
            closure.extend(closures[dep.index()].iter().copied());
        }
        closures[index] = closure.into_iter().collect();
    }
    Ok(closures)
}
