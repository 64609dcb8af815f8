//! Builders for agenda documents used across the integration tests.

use std::collections::BTreeMap;

use taskle::agenda::validate::normalize;
use taskle::agenda::{Agenda, RawAgenda, RawTask};

#[derive(Debug, Clone, Default)]
pub struct AgendaBuilder {
    procs: BTreeMap<String, Vec<String>>,
    stages: Vec<Vec<String>>,
    tasks: Vec<RawTask>,
}

impl AgendaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn proc(mut self, name: &str, words: &[&str]) -> Self {
        self.procs
            .insert(name.to_string(), words.iter().map(|w| w.to_string()).collect());
        self
    }

    pub fn stage(mut self, procs: &[&str]) -> Self {
        self.stages.push(procs.iter().map(|p| p.to_string()).collect());
        self
    }

    pub fn task(mut self, task: TaskBuilder) -> Self {
        self.tasks.push(task.raw());
        self
    }

    pub fn raw(self) -> RawAgenda {
        RawAgenda {
            procs: self.procs,
            stages: self.stages,
            tasks: self.tasks,
        }
    }

    pub fn build(self) -> Agenda {
        normalize(self.raw()).expect("builder agenda should be valid")
    }

    pub fn try_build(self) -> Result<Agenda, taskle::errors::LoadError> {
        normalize(self.raw())
    }
}

#[derive(Debug, Clone)]
pub struct TaskBuilder {
    desc: String,
    proc: String,
    args: BTreeMap<String, Vec<String>>,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl TaskBuilder {
    pub fn new(desc: &str, proc: &str) -> Self {
        Self {
            desc: desc.to_string(),
            proc: proc.to_string(),
            args: BTreeMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn arg(mut self, name: &str, values: &[&str]) -> Self {
        self.args
            .insert(name.to_string(), values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn inputs(mut self, paths: &[&str]) -> Self {
        self.inputs.extend(paths.iter().map(|p| p.to_string()));
        self
    }

    pub fn outputs(mut self, paths: &[&str]) -> Self {
        self.outputs.extend(paths.iter().map(|p| p.to_string()));
        self
    }

    fn raw(self) -> RawTask {
        RawTask {
            desc: self.desc,
            proc: self.proc,
            args: self.args,
            inputs: self.inputs,
            outputs: self.outputs,
        }
    }
}

/// Agenda with one `touch`-style procedure in a single stage, where each
/// task's command simply materialises its declared outputs.
///
/// `tasks` entries are `(desc, inputs, outputs)`.
pub fn touch_agenda(tasks: &[(&str, &[&str], &[&str])]) -> Agenda {
    let mut builder = AgendaBuilder::new()
        .proc("touch", &["touch", "$out"])
        .stage(&["touch"]);
    for (desc, inputs, outputs) in tasks {
        builder = builder.task(
            TaskBuilder::new(desc, "touch")
                .arg("out", outputs)
                .inputs(inputs)
                .outputs(outputs),
        );
    }
    builder.build()
}
