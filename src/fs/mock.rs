// src/fs/mock.rs

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use crate::cache::FileStat;
use crate::fs::FileSystem;

/// In-memory filesystem for tests.
///
/// Files are just stat entries; `touch` bumps a monotonically increasing
/// clock so every write observably changes the file's stat.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    inner: Arc<Mutex<MockState>>,
    clock: Arc<AtomicI64>,
}

#[derive(Debug, Default)]
struct MockState {
    files: BTreeMap<PathBuf, FileStat>,
    dirs: BTreeSet<PathBuf>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the file, or bump its mtime if it already exists.
    pub fn touch(&self, path: impl Into<PathBuf>) {
        let mtime_ns = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        let path = path.into();
        let mut state = self.inner.lock().unwrap();
        let size = state.files.get(&path).map(|s| s.size).unwrap_or(0);
        state.files.insert(path, FileStat { mtime_ns, size });
    }

    /// Create the file with an explicit size, bumping its mtime.
    pub fn write_sized(&self, path: impl Into<PathBuf>, size: u64) {
        let mtime_ns = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.inner.lock().unwrap();
        state.files.insert(path.into(), FileStat { mtime_ns, size });
    }

    pub fn remove(&self, path: &Path) {
        let mut state = self.inner.lock().unwrap();
        state.files.remove(path);
    }

    pub fn file_count(&self) -> usize {
        self.inner.lock().unwrap().files.len()
    }
}

impl FileSystem for MockFileSystem {
    fn stat(&self, path: &Path) -> Option<FileStat> {
        self.inner.lock().unwrap().files.get(path).copied()
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.inner.lock().unwrap();
        state.files.contains_key(path) || state.dirs.contains(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.inner.lock().unwrap();
        let mut current = PathBuf::new();
        for part in path.components() {
            current.push(part);
            state.dirs.insert(current.clone());
        }
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut state = self.inner.lock().unwrap();
        if state.files.remove(path).is_none() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
        }
        Ok(())
    }

    fn remove_empty_dir(&self, path: &Path) -> io::Result<()> {
        let mut state = self.inner.lock().unwrap();
        if !state.dirs.contains(path) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such directory"));
        }
        let occupied = state
            .files
            .keys()
            .any(|p| p.parent() == Some(path))
            || state.dirs.iter().any(|d| d.parent() == Some(path));
        if occupied {
            return Err(io::Error::new(io::ErrorKind::Other, "directory not empty"));
        }
        state.dirs.remove(path);
        Ok(())
    }
}
