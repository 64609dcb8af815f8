//! Fake task runner for engine tests.
//!
//! Commands are interpreted by their first word instead of spawning real
//! processes; file effects go through a shared [`MockFileSystem`]:
//!
//! - `touch <paths..>`      materialise each path and exit 0
//! - `fail`                 exit 1
//! - `vanish`               exit 0 without creating anything
//! - `block <paths..>`      wait for cancellation, always
//! - `block-once <paths..>` first invocation waits for cancellation;
//!                          later invocations behave like `touch`
//! - `rendezvous <paths..>` wait until a second rendezvous task arrives,
//!                          then behave like `touch`

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Barrier};
use tokio_util::sync::CancellationToken;

use taskle::exec::{RunResult, TaskRunner};
use taskle::fs::MockFileSystem;

/// Observable lifecycle of one fake invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerMsg {
    Started(String),
    Finished(String),
}

#[derive(Debug)]
pub struct FakeRunner {
    fs: MockFileSystem,
    /// Commands in start order, space-joined.
    pub log: Arc<Mutex<Vec<String>>>,
    counts: Mutex<HashMap<String, usize>>,
    barrier: Barrier,
    events: Option<mpsc::UnboundedSender<RunnerMsg>>,
}

impl FakeRunner {
    pub fn new(fs: MockFileSystem) -> Self {
        Self {
            fs,
            log: Arc::new(Mutex::new(Vec::new())),
            counts: Mutex::new(HashMap::new()),
            barrier: Barrier::new(2),
            events: None,
        }
    }

    /// Report invocation starts/finishes on the given channel.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<RunnerMsg>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn emit(&self, msg: RunnerMsg) {
        if let Some(events) = &self.events {
            let _ = events.send(msg);
        }
    }

    fn touch_all(&self, cwd: &Path, paths: &[String]) {
        for path in paths {
            self.fs.touch(cwd.join(path));
        }
    }
}

#[async_trait]
impl TaskRunner for FakeRunner {
    async fn run(&self, argv: &[String], cwd: &Path, cancel: CancellationToken) -> RunResult {
        let command = argv.join(" ");
        self.log.lock().unwrap().push(command.clone());
        let invocation = {
            let mut counts = self.counts.lock().unwrap();
            let count = counts.entry(command.clone()).or_insert(0);
            let current = *count;
            *count += 1;
            current
        };
        self.emit(RunnerMsg::Started(command.clone()));

        let result = match argv[0].as_str() {
            "touch" => {
                self.touch_all(cwd, &argv[1..]);
                RunResult::Exited(0)
            }
            "fail" => RunResult::Exited(1),
            "vanish" => RunResult::Exited(0),
            "block" => {
                cancel.cancelled().await;
                RunResult::Cancelled
            }
            "block-once" if invocation == 0 => {
                cancel.cancelled().await;
                RunResult::Cancelled
            }
            "block-once" => {
                self.touch_all(cwd, &argv[1..]);
                RunResult::Exited(0)
            }
            "rendezvous" => {
                self.barrier.wait().await;
                self.touch_all(cwd, &argv[1..]);
                RunResult::Exited(0)
            }
            other => {
                eprintln!("FakeRunner: unknown command '{other}'");
                RunResult::SpawnFailed(std::io::ErrorKind::NotFound)
            }
        };

        self.emit(RunnerMsg::Finished(command));
        result
    }
}
