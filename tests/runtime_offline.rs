// tests/runtime_offline.rs

mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::builders::{touch_agenda, AgendaBuilder, TaskBuilder};
use common::runner::FakeRunner;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use taskle::agenda::Agenda;
use taskle::cache::StatStore;
use taskle::depend::{self, Depend};
use taskle::engine::{ExitOutcome, Reactor, ReactorEvent, ReactorOptions, ReactorPaths, ReactorSetup};
use taskle::exec::WorkerPool;
use taskle::fs::{FileSystem, MockFileSystem};

const ROOT: &str = "/proj";

fn resolved(path: &str) -> PathBuf {
    Path::new(ROOT).join(path)
}

/// Run one offline evaluation against the shared mock filesystem, returning
/// the exit outcome and the commands the fake runner saw.
async fn run_offline(
    agenda: Agenda,
    depend: Depend,
    fs: &MockFileSystem,
    cache: &Path,
    workers: usize,
) -> (ExitOutcome, Vec<String>) {
    common::init_tracing();

    let runner = Arc::new(FakeRunner::new(fs.clone()));
    let (events_tx, events_rx) = mpsc::channel::<ReactorEvent>(64);
    let pool = WorkerPool::spawn(
        workers,
        runner.clone(),
        Arc::new(fs.clone()),
        events_tx.clone(),
    );

    let reactor = Reactor::new(ReactorSetup {
        agenda,
        depend,
        store: StatStore::load(cache),
        fs: Arc::new(fs.clone()),
        pool,
        options: ReactorOptions { online: false },
        paths: ReactorPaths {
            agenda: resolved("agenda.yaml"),
            depend: resolved("depend.yaml"),
            cache: cache.to_path_buf(),
            root: PathBuf::from(ROOT),
        },
        events_rx,
        watch: None,
    })
    .expect("reactor setup should succeed");

    let outcome = timeout(Duration::from_secs(5), reactor.run())
        .await
        .expect("offline run should reach quiescence")
        .expect("reactor should not fail internally");

    (outcome, runner.commands())
}

#[tokio::test]
async fn first_run_executes_then_second_run_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("taskle.cache");
    let fs = MockFileSystem::new();

    let agenda = touch_agenda(&[("make out", &[], &["out.txt"])]);

    let (outcome, commands) =
        run_offline(agenda.clone(), Depend::default(), &fs, &cache, 2).await;
    assert_eq!(outcome, ExitOutcome::Success);
    assert_eq!(commands, vec!["touch out.txt"]);
    assert!(fs.stat(&resolved("out.txt")).is_some());

    let (outcome, commands) = run_offline(agenda, Depend::default(), &fs, &cache, 2).await;
    assert_eq!(outcome, ExitOutcome::Success);
    assert!(commands.is_empty(), "second run must execute zero tasks");
}

#[tokio::test]
async fn editing_an_input_reruns_the_task() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("taskle.cache");
    let fs = MockFileSystem::new();
    fs.touch(resolved("in.txt"));

    let agenda = touch_agenda(&[("build", &["in.txt"], &["out.txt"])]);

    let (_, commands) = run_offline(agenda.clone(), Depend::default(), &fs, &cache, 1).await;
    assert_eq!(commands.len(), 1);

    fs.touch(resolved("in.txt"));
    let (_, commands) = run_offline(agenda.clone(), Depend::default(), &fs, &cache, 1).await;
    assert_eq!(commands.len(), 1, "edited input must re-run the task");

    let (_, commands) = run_offline(agenda, Depend::default(), &fs, &cache, 1).await;
    assert!(commands.is_empty(), "unchanged third run must be a no-op");
}

#[tokio::test]
async fn implicit_dependency_edit_reruns_the_task() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("taskle.cache");
    let fs = MockFileSystem::new();
    fs.touch(resolved("main.c"));
    fs.touch(resolved("util.h"));

    let agenda = touch_agenda(&[("compile", &["main.c"], &["main.o"])]);
    let depend = depend::load_from_str("main.c: [util.h]").unwrap();

    let (_, commands) = run_offline(agenda.clone(), depend.clone(), &fs, &cache, 1).await;
    assert_eq!(commands.len(), 1);

    fs.touch(resolved("util.h"));
    let (_, commands) = run_offline(agenda, depend, &fs, &cache, 1).await;
    assert_eq!(
        commands.len(),
        1,
        "implicit dependency edit must re-run the task"
    );
}

#[tokio::test]
async fn fan_out_tasks_overlap_with_enough_workers() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("taskle.cache");
    let fs = MockFileSystem::new();

    // B and C rendezvous with each other: the run only reaches quiescence if
    // both are in flight at the same time.
    let agenda = AgendaBuilder::new()
        .proc("touch", &["touch", "$out"])
        .proc("rendezvous", &["rendezvous", "$out"])
        .stage(&["touch", "rendezvous"])
        .task(TaskBuilder::new("a", "touch").arg("out", &["a.o"]).outputs(&["a.o"]))
        .task(
            TaskBuilder::new("b", "rendezvous")
                .arg("out", &["b.o"])
                .inputs(&["a.o"])
                .outputs(&["b.o"]),
        )
        .task(
            TaskBuilder::new("c", "rendezvous")
                .arg("out", &["c.o"])
                .inputs(&["a.o"])
                .outputs(&["c.o"]),
        )
        .build();

    let (outcome, commands) = run_offline(agenda, Depend::default(), &fs, &cache, 2).await;
    assert_eq!(outcome, ExitOutcome::Success);
    assert_eq!(commands.len(), 3);
    assert_eq!(commands[0], "touch a.o");
    assert!(fs.stat(&resolved("b.o")).is_some());
    assert!(fs.stat(&resolved("c.o")).is_some());
}

#[tokio::test]
async fn failure_cascades_and_reports_task_failure() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("taskle.cache");
    let fs = MockFileSystem::new();

    let agenda = AgendaBuilder::new()
        .proc("touch", &["touch", "$out"])
        .proc("fail", &["fail"])
        .stage(&["touch", "fail"])
        .task(TaskBuilder::new("broken", "fail").outputs(&["a.o"]))
        .task(
            TaskBuilder::new("dependent", "touch")
                .arg("out", &["b.o"])
                .inputs(&["a.o"])
                .outputs(&["b.o"]),
        )
        .task(
            TaskBuilder::new("independent", "touch")
                .arg("out", &["c.o"])
                .outputs(&["c.o"]),
        )
        .build();

    let (outcome, commands) = run_offline(agenda, Depend::default(), &fs, &cache, 2).await;
    assert_eq!(outcome, ExitOutcome::TaskFailure);
    assert!(commands.contains(&"fail".to_string()));
    assert!(commands.contains(&"touch c.o".to_string()));
    assert!(
        !commands.contains(&"touch b.o".to_string()),
        "cascaded task must not execute"
    );
    assert!(fs.stat(&resolved("b.o")).is_none());
    assert!(fs.stat(&resolved("c.o")).is_some());
}

#[tokio::test]
async fn missing_output_is_a_task_failure() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("taskle.cache");
    let fs = MockFileSystem::new();

    let agenda = AgendaBuilder::new()
        .proc("vanish", &["vanish"])
        .stage(&["vanish"])
        .task(TaskBuilder::new("liar", "vanish").outputs(&["ghost.o"]))
        .build();

    let (outcome, commands) = run_offline(agenda, Depend::default(), &fs, &cache, 1).await;
    assert_eq!(outcome, ExitOutcome::TaskFailure);
    assert_eq!(commands.len(), 1);
}

#[tokio::test]
async fn stage_barrier_orders_cross_stage_tasks_without_file_edges() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("taskle.cache");
    let fs = MockFileSystem::new();

    let agenda = AgendaBuilder::new()
        .proc("early", &["touch", "$out"])
        .proc("late", &["touch", "$out"])
        .stage(&["early"])
        .stage(&["late"])
        .task(TaskBuilder::new("s0-a", "early").arg("out", &["a"]).outputs(&["a"]))
        .task(TaskBuilder::new("s0-b", "early").arg("out", &["b"]).outputs(&["b"]))
        .task(TaskBuilder::new("s1-c", "late").arg("out", &["c"]).outputs(&["c"]))
        .build();

    let (_, commands) = run_offline(agenda, Depend::default(), &fs, &cache, 4).await;
    assert_eq!(commands.len(), 3);
    assert_eq!(
        commands.last().map(String::as_str),
        Some("touch c"),
        "stage 1 task must start only after stage 0 drains"
    );
}

#[tokio::test]
async fn cache_survives_on_disk_between_runs() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("taskle.cache");
    let fs = MockFileSystem::new();
    fs.touch(resolved("in.txt"));

    let agenda = touch_agenda(&[("build", &["in.txt"], &["out.txt"])]);
    run_offline(agenda, Depend::default(), &fs, &cache, 1).await;

    let store = StatStore::try_load(&cache).expect("cache should be written at quiescence");
    assert!(store.get(&resolved("in.txt")).is_some());
    assert!(store.get(&resolved("out.txt")).is_some());
}
