// src/agenda/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

/// Agenda document exactly as parsed from YAML.
///
/// Unknown keys are rejected at every level.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawAgenda {
    /// Procedure name to ordered command words. A word starting with `$` is
    /// a parameter reference.
    pub procs: BTreeMap<String, Vec<String>>,
    /// Stage index to the set of procedure names admitted in that stage.
    pub stages: Vec<Vec<String>>,
    pub tasks: Vec<RawTask>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawTask {
    pub desc: String,
    pub proc: String,
    pub args: BTreeMap<String, Vec<String>>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// A fully normalized task: command expanded, paths deduplicated in first
/// occurrence order, stage resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub desc: String,
    pub proc: String,
    pub args: BTreeMap<String, Vec<String>>,
    /// Effective command: the procedure's words with every `$param`
    /// reference replaced in place by that parameter's argument values.
    pub command: Vec<String>,
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
    /// Lowest-indexed stage whose procedure set admits `proc`.
    pub stage: usize,
}

impl TaskSpec {
    /// Structural identity of the task, ignoring its description and stage.
    ///
    /// Used across graph rebuilds to decide whether an in-flight task is
    /// still the same work and may keep running.
    pub fn identity(&self) -> TaskIdentity {
        TaskIdentity {
            proc: self.proc.clone(),
            args: self.args.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
        }
    }

    /// Rendered command line for log records.
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskIdentity {
    pub proc: String,
    pub args: BTreeMap<String, Vec<String>>,
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
}

/// A validated, normalized agenda.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agenda {
    pub tasks: Vec<TaskSpec>,
    pub stage_count: usize,
}
