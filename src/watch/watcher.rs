// src/watch/watcher.rs

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::ReactorEvent;
use crate::watch::{ChangeKind, FileWatch};

/// Production watcher backed by `notify`.
///
/// Watched files are tracked through their parent directories
/// (non-recursively), so a file that is deleted and recreated keeps
/// producing events. The reactor filters events down to the paths it
/// actually cares about.
pub struct NotifyWatch {
    watcher: RecommendedWatcher,
    watched_dirs: BTreeSet<PathBuf>,
}

impl std::fmt::Debug for NotifyWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyWatch")
            .field("watched_dirs", &self.watched_dirs)
            .finish()
    }
}

impl NotifyWatch {
    /// Create the watcher and the bridge task that forwards its events into
    /// the reactor channel. The watcher starts with an empty watch set;
    /// call [`FileWatch::rewatch`] to arm it.
    pub fn spawn(events_tx: mpsc::Sender<ReactorEvent>) -> Result<Self> {
        // notify delivers events on its own thread; hop into the async world
        // through an unbounded channel so the callback never blocks.
        let (bridge_tx, mut bridge_rx) = mpsc::unbounded_channel::<Event>();

        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = bridge_tx.send(event);
                }
                Err(err) => {
                    warn!(error = %err, "file watch error");
                }
            },
            Config::default(),
        )?;

        tokio::spawn(async move {
            while let Some(event) = bridge_rx.recv().await {
                let Some(kind) = change_kind(&event.kind) else {
                    continue;
                };
                for path in event.paths {
                    debug!(path = %path.display(), ?kind, "filesystem change observed");
                    if events_tx
                        .send(ReactorEvent::PathChanged { path, kind })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
        });

        Ok(Self {
            watcher,
            watched_dirs: BTreeSet::new(),
        })
    }
}

impl FileWatch for NotifyWatch {
    fn rewatch(&mut self, paths: &[PathBuf]) -> Result<()> {
        let dirs: BTreeSet<PathBuf> = paths.iter().map(|p| parent_dir(p)).collect();

        for removed in self.watched_dirs.difference(&dirs) {
            if let Err(err) = self.watcher.unwatch(removed) {
                debug!(dir = %removed.display(), error = %err, "failed to unwatch directory");
            }
        }
        for added in dirs.difference(&self.watched_dirs) {
            if let Err(err) = self.watcher.watch(added, RecursiveMode::NonRecursive) {
                // The directory may not exist yet; the next rewatch after a
                // graph rebuild will pick it up.
                warn!(dir = %added.display(), error = %err, "failed to watch directory");
            }
        }

        debug!(dirs = dirs.len(), "watch set updated");
        self.watched_dirs = dirs;
        Ok(())
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        _ => None,
    }
}
