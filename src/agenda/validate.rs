// src/agenda/validate.rs

use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;

use crate::agenda::model::{Agenda, RawAgenda, RawTask, TaskSpec};
use crate::errors::LoadError;

const PARAM_MARKER: char = '$';

/// Validate a raw agenda document and normalize it into an [`Agenda`].
///
/// Checks, in order:
/// - every procedure has a non-empty command
/// - every stage entry names a known procedure
/// - every task names a known procedure
/// - the task's args bind exactly the parameters its procedure uses
/// - every task's procedure is admitted by some stage
/// - no two tasks declare the same output file
pub fn normalize(raw: RawAgenda) -> Result<Agenda, LoadError> {
    for (name, words) in &raw.procs {
        if words.iter().all(|w| w.is_empty()) {
            return Err(LoadError::EmptyCommand { proc: name.clone() });
        }
    }

    for (index, stage) in raw.stages.iter().enumerate() {
        for proc in stage {
            if !raw.procs.contains_key(proc) {
                return Err(LoadError::UnknownStageProc {
                    stage: index,
                    proc: proc.clone(),
                });
            }
        }
    }

    let stage_count = raw.stages.len();
    let mut tasks = Vec::with_capacity(raw.tasks.len());
    let mut seen_outputs: HashSet<PathBuf> = HashSet::new();

    for task in &raw.tasks {
        let spec = normalize_task(&raw, task)?;

        for output in &spec.outputs {
            if !seen_outputs.insert(output.clone()) {
                return Err(LoadError::DuplicateOutput {
                    path: output.clone(),
                });
            }
        }

        tasks.push(spec);
    }

    Ok(Agenda { tasks, stage_count })
}

fn normalize_task(raw: &RawAgenda, task: &RawTask) -> Result<TaskSpec, LoadError> {
    let words = raw
        .procs
        .get(&task.proc)
        .ok_or_else(|| LoadError::UnknownProc {
            task: task.desc.clone(),
            proc: task.proc.clone(),
        })?;

    let command = expand_command(words, task)?;
    if command.is_empty() {
        return Err(LoadError::EmptyCommand {
            proc: task.proc.clone(),
        });
    }

    let stage = stage_of(raw, &task.proc).ok_or_else(|| LoadError::Unstaged {
        task: task.desc.clone(),
        proc: task.proc.clone(),
    })?;

    Ok(TaskSpec {
        desc: task.desc.clone(),
        proc: task.proc.clone(),
        args: task.args.clone(),
        command,
        inputs: dedup_paths(&task.inputs),
        outputs: dedup_paths(&task.outputs),
        stage,
    })
}

/// Substitute parameter references, expanding multi-value arguments in place.
fn expand_command(words: &[String], task: &RawTask) -> Result<Vec<String>, LoadError> {
    let mut command = Vec::with_capacity(words.len());
    let mut used: BTreeSet<&str> = BTreeSet::new();

    for word in words {
        if word.is_empty() {
            continue;
        }
        match word.strip_prefix(PARAM_MARKER) {
            Some(param) => {
                let values = task.args.get(param).ok_or_else(|| LoadError::UnboundParam {
                    task: task.desc.clone(),
                    proc: task.proc.clone(),
                    param: param.to_string(),
                })?;
                used.insert(param);
                command.extend(values.iter().filter(|v| !v.is_empty()).cloned());
            }
            None => command.push(word.clone()),
        }
    }

    for param in task.args.keys() {
        if !used.contains(param.as_str()) {
            return Err(LoadError::UnusedArg {
                task: task.desc.clone(),
                proc: task.proc.clone(),
                param: param.clone(),
            });
        }
    }

    Ok(command)
}

/// Lowest-indexed stage whose procedure set contains `proc`.
fn stage_of(raw: &RawAgenda, proc: &str) -> Option<usize> {
    raw.stages
        .iter()
        .position(|stage| stage.iter().any(|p| p == proc))
}

/// Keep first occurrence order, drop duplicates.
fn dedup_paths(paths: &[String]) -> Vec<PathBuf> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        if seen.insert(path.as_str()) {
            out.push(PathBuf::from(path));
        }
    }
    out
}
