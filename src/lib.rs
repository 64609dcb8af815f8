// src/lib.rs

pub mod agenda;
pub mod cache;
pub mod clean;
pub mod cli;
pub mod depend;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod graph;
pub mod logging;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cache::StatStore;
use crate::cli::{CliArgs, Mode};
use crate::engine::{ExitOutcome, Reactor, ReactorEvent, ReactorOptions, ReactorPaths, ReactorSetup};
use crate::errors::{LoadError, Result};
use crate::exec::{ProcessRunner, WorkerPool};
use crate::fs::RealFileSystem;
use crate::watch::{FileWatch, NotifyWatch};

/// High-level entry point used by `main.rs`.
///
/// Wires together document loading, the stat store, the worker pool, the
/// optional file watcher, Ctrl-C handling, and the reactor; returns the
/// process exit code (0 success, 2 task failure).
pub async fn run(args: CliArgs) -> Result<u8> {
    if args.mode == Mode::Version {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(0);
    }

    let agenda_path = resolve_cwd(&args.agenda);
    let depend_path = resolve_cwd(&args.depend);
    let cache_path = resolve_cwd(&args.cache);
    let root = project_root(&agenda_path);

    if args.mode == Mode::Clean {
        // Clean tolerates a missing or broken agenda: there may be nothing
        // left to describe the outputs, but the cache can still be dropped.
        let agenda = if agenda_path.is_file() {
            match agenda::load_and_validate(&agenda_path) {
                Ok(agenda) => Some(agenda),
                Err(err) => {
                    warn!(error = %err, "agenda unreadable; cleaning the stat cache only");
                    None
                }
            }
        } else {
            None
        };
        clean::clean(agenda.as_ref(), &root, &cache_path, &RealFileSystem)?;
        return Ok(0);
    }

    if !agenda_path.is_file() {
        return Err(LoadError::Io {
            path: agenda_path,
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "agenda file not found"),
        }
        .into());
    }

    let agenda = agenda::load_and_validate(&agenda_path)?;

    let depend = depend::load(&depend_path)?;
    let store = StatStore::load(&cache_path);

    let online = args.mode == Mode::Online;
    let workers = args
        .workers
        .unwrap_or_else(|| num_cpus::get().saturating_sub(1))
        .max(1);

    let (events_tx, events_rx) = mpsc::channel::<ReactorEvent>(256);

    let fs = Arc::new(RealFileSystem);
    let pool = WorkerPool::spawn(workers, Arc::new(ProcessRunner), fs.clone(), events_tx.clone());

    let watch: Option<Box<dyn FileWatch>> = if online {
        Some(Box::new(NotifyWatch::spawn(events_tx.clone())?))
    } else {
        None
    };

    // Ctrl-C requests a graceful shutdown through the reactor.
    {
        let tx = events_tx.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                eprintln!("taskle: failed to listen for Ctrl-C: {err}");
                return;
            }
            let _ = tx.send(ReactorEvent::ShutdownRequested).await;
        });
    }

    info!(
        mode = ?args.mode,
        agenda = %agenda_path.display(),
        workers,
        "beginning evaluation"
    );

    let reactor = Reactor::new(ReactorSetup {
        agenda,
        depend,
        store,
        fs,
        pool,
        options: ReactorOptions { online },
        paths: ReactorPaths {
            agenda: agenda_path,
            depend: depend_path,
            cache: cache_path,
            root,
        },
        events_rx,
        watch,
    })?;

    let outcome = reactor.run().await?;
    info!("end of evaluation");

    Ok(match outcome {
        ExitOutcome::Success => 0,
        ExitOutcome::TaskFailure => 2,
    })
}

fn resolve_cwd(path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

/// Project root: the directory containing the agenda file. Relative paths in
/// the agenda and depend documents resolve against it, and task processes
/// run inside it.
fn project_root(agenda_path: &Path) -> PathBuf {
    let parent = match agenda_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    parent.canonicalize().unwrap_or(parent)
}
