// tests/graph_build.rs

mod common;

use std::path::{Path, PathBuf};

use common::builders::{touch_agenda, AgendaBuilder, TaskBuilder};
use taskle::depend::{self, Depend};
use taskle::errors::LoadError;
use taskle::graph::Graph;

const ROOT: &str = "/proj";

fn graph(agenda: taskle::agenda::Agenda, depend: Depend) -> Graph {
    Graph::build(&agenda, &depend, Path::new(ROOT)).unwrap()
}

fn resolved(path: &str) -> PathBuf {
    Path::new(ROOT).join(path)
}

#[test]
fn explicit_edges_follow_file_production() {
    let agenda = touch_agenda(&[
        ("make a", &[], &["a.o"]),
        ("make b", &["a.o"], &["b.o"]),
        ("make c", &["a.o", "b.o"], &["c.o"]),
    ]);
    let graph = graph(agenda, Depend::default());

    let a = graph.topological_order()[0];
    let b = graph.topological_order()[1];
    let c = graph.topological_order()[2];
    assert_eq!(graph.task(a).spec.desc, "make a");
    assert_eq!(graph.task(b).spec.desc, "make b");
    assert_eq!(graph.task(c).spec.desc, "make c");

    assert_eq!(graph.predecessors(c), &[a, b]);
    assert_eq!(graph.successors(a), &[b, c]);

    let a_o = graph.file_id(&resolved("a.o")).unwrap();
    assert_eq!(graph.task_producing(a_o), Some(a));
    assert_eq!(graph.tasks_consuming(a_o), &[b, c]);
}

#[test]
fn implicit_closure_is_transitive() {
    let agenda = touch_agenda(&[("compile", &["main.c"], &["main.o"])]);
    let depend = depend::load_from_str(
        r#"
main.c: [util.h]
util.h: [types.h]
"#,
    )
    .unwrap();
    let graph = graph(agenda, depend);

    let main_c = graph.file_id(&resolved("main.c")).unwrap();
    let util_h = graph.file_id(&resolved("util.h")).unwrap();
    let types_h = graph.file_id(&resolved("types.h")).unwrap();

    let closure = graph.implicit_closure(main_c);
    assert!(closure.contains(&util_h));
    assert!(closure.contains(&types_h));
    assert_eq!(closure.len(), 2);

    // The closure participates in the task's input set.
    let task = graph.topological_order()[0];
    let input_closure = graph.input_closure(task);
    assert!(input_closure.contains(&main_c));
    assert!(input_closure.contains(&util_h));
    assert!(input_closure.contains(&types_h));
}

#[test]
fn watch_sources_are_initial_files_only() {
    let agenda = touch_agenda(&[
        ("make a", &["src.txt"], &["a.o"]),
        ("make b", &["a.o"], &["b.o"]),
    ]);
    let depend = depend::load_from_str("src.txt: [header.h]").unwrap();
    let graph = graph(agenda, depend);

    let sources = graph.watch_sources();
    assert!(sources.contains(&resolved("src.txt")));
    assert!(sources.contains(&resolved("header.h")));
    // Produced files are never watched, or the tool would trigger itself.
    assert!(!sources.contains(&resolved("a.o")));
    assert!(!sources.contains(&resolved("b.o")));
}

#[test]
fn topological_order_is_deterministic_and_consistent() {
    let agenda = touch_agenda(&[
        ("z", &["m.o"], &["z.o"]),
        ("m", &[], &["m.o"]),
        ("q", &["m.o", "z.o"], &["q.o"]),
    ]);
    let first = graph(agenda.clone(), Depend::default());
    let second = graph(agenda, Depend::default());

    assert_eq!(first.topological_order(), second.topological_order());
    for &task in first.topological_order() {
        for &pred in first.predecessors(task) {
            let pos = |t| {
                first
                    .topological_order()
                    .iter()
                    .position(|&x| x == t)
                    .unwrap()
            };
            assert!(pos(pred) < pos(task));
        }
    }
}

#[test]
fn task_cycle_is_rejected() {
    let agenda = touch_agenda(&[
        ("forward", &["b.o"], &["a.o"]),
        ("backward", &["a.o"], &["b.o"]),
    ]);
    let err = Graph::build(&agenda, &Depend::default(), Path::new(ROOT)).unwrap_err();
    assert!(matches!(err, LoadError::TaskCycle { .. }), "got {err:?}");
}

#[test]
fn task_consuming_its_own_output_is_rejected() {
    let agenda = touch_agenda(&[("ouroboros", &["a.o"], &["a.o"])]);
    let err = Graph::build(&agenda, &Depend::default(), Path::new(ROOT)).unwrap_err();
    assert!(matches!(err, LoadError::TaskCycle { .. }), "got {err:?}");
}

#[test]
fn implicit_cycle_is_rejected() {
    let agenda = touch_agenda(&[("compile", &["main.c"], &["main.o"])]);
    let depend = depend::load_from_str(
        r#"
main.c: [util.h]
util.h: [main.c]
"#,
    )
    .unwrap();
    let err = Graph::build(&agenda, &depend, Path::new(ROOT)).unwrap_err();
    assert!(matches!(err, LoadError::FileCycle { .. }), "got {err:?}");
}

#[test]
fn depend_self_loop_is_rejected_at_load() {
    let err = depend::load_from_str("main.c: [main.c]").unwrap_err();
    assert!(matches!(err, LoadError::SelfLoop { .. }), "got {err:?}");
}

#[test]
fn missing_depend_file_is_empty() {
    let depend = depend::load("/definitely/not/here/depend.yaml").unwrap();
    assert!(depend.edges.is_empty());
}

#[test]
fn producer_staged_after_consumer_is_rejected() {
    let agenda = AgendaBuilder::new()
        .proc("early", &["early", "$out"])
        .proc("late", &["late", "$out"])
        .stage(&["early"])
        .stage(&["late"])
        .task(
            TaskBuilder::new("producer", "late")
                .arg("out", &["lib.o"])
                .outputs(&["lib.o"]),
        )
        .task(
            TaskBuilder::new("consumer", "early")
                .arg("out", &["app"])
                .inputs(&["lib.o"])
                .outputs(&["app"]),
        )
        .build();
    let err = Graph::build(&agenda, &Depend::default(), Path::new(ROOT)).unwrap_err();
    assert!(matches!(err, LoadError::StageOrder { .. }), "got {err:?}");
}
