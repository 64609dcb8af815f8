// src/fs/mod.rs

use std::fmt::Debug;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::cache::FileStat;

pub mod mock;

pub use mock::MockFileSystem;

/// Abstract filesystem interface.
///
/// The evaluation core only ever needs to observe stats, prepare output
/// directories, and (in clean mode) remove what it generated. Keeping this
/// behind a trait lets tests run entirely in memory.
pub trait FileSystem: Send + Sync + Debug {
    /// Observed `(mtime_ns, size)` of a file, or `None` if it does not exist.
    fn stat(&self, path: &Path) -> Option<FileStat>;

    fn exists(&self, path: &Path) -> bool {
        self.stat(path).is_some()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Remove a directory; fails if it is not empty.
    fn remove_empty_dir(&self, path: &Path) -> io::Result<()>;
}

/// Implementation backed by `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn stat(&self, path: &Path) -> Option<FileStat> {
        let meta = std::fs::metadata(path).ok()?;
        if !meta.is_file() {
            return None;
        }
        let mtime_ns = match meta.modified().ok()?.duration_since(UNIX_EPOCH) {
            Ok(since) => since.as_nanos() as i64,
            Err(before) => -(before.duration().as_nanos() as i64),
        };
        Some(FileStat {
            mtime_ns,
            size: meta.len(),
        })
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn remove_empty_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir(path)
    }
}
