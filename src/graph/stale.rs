// src/graph/stale.rs

//! Stale analysis: deciding which tasks must run.
//!
//! A task must run when any of its outputs is absent on disk, when any file
//! in the implicit closure of any of its inputs stats differently from the
//! stored value (or has no stored value at all), or when one of its explicit
//! predecessors must run. Everything else is skipped.
//!
//! The comparison is equality on `(mtime_ns, size)`, not ordering, so a
//! clock regression still reads as a change. One pass over the tasks in
//! topological order handles predecessor propagation; the cost is linear in
//! tasks plus edges.

use std::collections::HashMap;

use tracing::debug;

use crate::cache::{FileStat, StatStore};
use crate::fs::FileSystem;
use crate::graph::{FileId, Graph, TaskId};

/// Result of a stale analysis pass: the set of tasks classified MustRun.
#[derive(Debug, Clone)]
pub struct StaleSet {
    must_run: Vec<bool>,
}

impl StaleSet {
    pub fn is_stale(&self, task: TaskId) -> bool {
        self.must_run[task.0 as usize]
    }

    pub fn iter_stale(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.must_run
            .iter()
            .enumerate()
            .filter(|(_, &stale)| stale)
            .map(|(index, _)| TaskId(index as u32))
    }

    pub fn count(&self) -> usize {
        self.must_run.iter().filter(|&&stale| stale).count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

/// Classify every task in the graph as MustRun or Skip.
pub fn analyze(graph: &Graph, store: &StatStore, fs: &dyn FileSystem) -> StaleSet {
    let mut live: HashMap<FileId, Option<FileStat>> = HashMap::new();
    let mut must_run = vec![false; graph.task_count()];

    for &task in graph.topological_order() {
        let stale = task_is_locally_stale(graph, store, fs, &mut live, task)
            || graph
                .predecessors(task)
                .iter()
                .any(|pred| must_run[pred.0 as usize]);
        must_run[task.0 as usize] = stale;
    }

    let set = StaleSet { must_run };
    debug!(stale = set.count(), total = graph.task_count(), "stale analysis complete");
    set
}

fn task_is_locally_stale(
    graph: &Graph,
    store: &StatStore,
    fs: &dyn FileSystem,
    live: &mut HashMap<FileId, Option<FileStat>>,
    task: TaskId,
) -> bool {
    for &output in graph.outputs(task) {
        if stat_live(graph, fs, live, output).is_none() {
            debug!(
                task = %graph.task(task).spec.desc,
                output = %graph.file(output).path.display(),
                "output absent; task must run"
            );
            return true;
        }
    }

    for file in graph.input_closure(task) {
        let path = &graph.file(file).path;
        match store.get(path) {
            None => {
                debug!(
                    task = %graph.task(task).spec.desc,
                    input = %path.display(),
                    "input has no recorded stat; task must run"
                );
                return true;
            }
            Some(stored) => {
                if stat_live(graph, fs, live, file) != Some(stored) {
                    debug!(
                        task = %graph.task(task).spec.desc,
                        input = %path.display(),
                        "input stat changed; task must run"
                    );
                    return true;
                }
            }
        }
    }

    false
}

fn stat_live(
    graph: &Graph,
    fs: &dyn FileSystem,
    live: &mut HashMap<FileId, Option<FileStat>>,
    file: FileId,
) -> Option<FileStat> {
    *live
        .entry(file)
        .or_insert_with(|| fs.stat(&graph.file(file).path))
}
