// src/clean.rs

//! Clean mode: remove everything a previous evaluation generated.
//!
//! Declared outputs come from the agenda; directories that become empty
//! after their outputs are removed go too, as does the stat cache. Without
//! a readable agenda there is no trustworthy list of generated files (the
//! cache records input stats as well), so only the cache itself is removed.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::agenda::Agenda;
use crate::errors::Result;
use crate::fs::FileSystem;

pub fn clean(
    agenda: Option<&Agenda>,
    root: &Path,
    cache_path: &Path,
    fs: &dyn FileSystem,
) -> Result<()> {
    info!("cleaning generated files");

    if let Some(agenda) = agenda {
        remove_outputs(agenda, root, fs);
    } else {
        debug!("no agenda available; removing the stat cache only");
    }

    match fs.remove_file(cache_path) {
        Ok(()) => info!(path = %cache_path.display(), "removed stat cache"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            debug!(path = %cache_path.display(), error = %err, "could not remove stat cache");
        }
    }

    Ok(())
}

fn remove_outputs(agenda: &Agenda, root: &Path, fs: &dyn FileSystem) {
    let outputs: BTreeSet<PathBuf> = agenda
        .tasks
        .iter()
        .flat_map(|task| task.outputs.iter())
        .map(|path| resolve(root, path))
        .collect();

    for output in outputs.iter().rev() {
        match fs.remove_file(output) {
            Ok(()) => info!(path = %output.display(), "removed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                debug!(path = %output.display(), error = %err, "could not remove output");
            }
        }
    }

    // Prune directories that held only generated files, deepest first.
    let mut dirs: BTreeSet<PathBuf> = BTreeSet::new();
    for output in &outputs {
        let mut current = output.parent();
        while let Some(dir) = current {
            if dir == root || dir.as_os_str().is_empty() {
                break;
            }
            dirs.insert(dir.to_path_buf());
            current = dir.parent();
        }
    }
    for dir in dirs.iter().rev() {
        if fs.remove_empty_dir(dir).is_ok() {
            info!(path = %dir.display(), "removed empty directory");
        }
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
