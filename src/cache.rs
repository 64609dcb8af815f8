// src/cache.rs

//! Persistent file stat store.
//!
//! The store maps file paths to the `(mtime_ns, size)` pair last observed for
//! them. It survives across invocations through a small binary cache file:
//!
//! - header: 4 magic bytes `"TKLC"`, little-endian `u16` version
//! - body: records of `{u16 path_len, path bytes, i64 mtime_ns, u64 size}`
//!
//! Writes go to a temporary file in the same directory which is then renamed
//! over the cache path, so readers never observe a half-written cache. A
//! missing, truncated or otherwise unreadable cache is not an error: the
//! store starts empty and every task is considered stale on the next run.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::errors::CacheError;

const MAGIC: [u8; 4] = *b"TKLC";
const VERSION: u16 = 1;

/// Last observed modification time and size of a file.
///
/// Staleness is detected by comparing stats for equality, never by ordering,
/// so clock regressions are caught like any other change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileStat {
    pub mtime_ns: i64,
    pub size: u64,
}

impl FileStat {
    /// Sentinel written over an entry when a watch event reports the file
    /// changed. No real file ever stats to this value, so the next analysis
    /// pass sees the entry as different from the live filesystem.
    pub const DIRTY: FileStat = FileStat {
        mtime_ns: i64::MIN,
        size: u64::MAX,
    };
}

/// In-memory stat store, keyed by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatStore {
    entries: BTreeMap<PathBuf, FileStat>,
}

impl StatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<FileStat> {
        self.entries.get(path).copied()
    }

    pub fn put(&mut self, path: impl Into<PathBuf>, stat: FileStat) {
        self.entries.insert(path.into(), stat);
    }

    pub fn forget(&mut self, path: &Path) {
        self.entries.remove(path);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, FileStat)> {
        self.entries.iter().map(|(p, s)| (p.as_path(), *s))
    }

    /// Serialize the store to its on-disk byte form.
    ///
    /// Entries are held in a `BTreeMap`, so the record order (and therefore
    /// the byte output) is deterministic for a given map.
    pub fn snapshot(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(6 + self.entries.len() * 32);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        for (path, stat) in &self.entries {
            let bytes = path.to_string_lossy();
            let bytes = bytes.as_bytes();
            let len = bytes.len().min(u16::MAX as usize) as u16;
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(&bytes[..len as usize]);
            out.extend_from_slice(&stat.mtime_ns.to_le_bytes());
            out.extend_from_slice(&stat.size.to_le_bytes());
        }
        out
    }

    /// Parse a byte buffer produced by [`StatStore::snapshot`].
    pub fn decode(data: &[u8]) -> Result<Self, CacheError> {
        let mut cursor = data;

        let magic = take(&mut cursor, 4)?;
        if magic != MAGIC {
            return Err(CacheError::BadMagic);
        }
        let version = read_u16(&mut cursor)?;
        if version != VERSION {
            return Err(CacheError::UnsupportedVersion(version));
        }

        let mut entries = BTreeMap::new();
        while !cursor.is_empty() {
            let len = read_u16(&mut cursor)? as usize;
            let path = take(&mut cursor, len)?;
            let path = PathBuf::from(String::from_utf8_lossy(path).into_owned());
            let mtime_ns = i64::from_le_bytes(read_8(&mut cursor)?);
            let size = u64::from_le_bytes(read_8(&mut cursor)?);
            entries.insert(path, FileStat { mtime_ns, size });
        }

        Ok(Self { entries })
    }

    /// Strict load from disk.
    pub fn try_load(path: &Path) -> Result<Self, CacheError> {
        let data = std::fs::read(path)?;
        Self::decode(&data)
    }

    /// Tolerant load: a missing or corrupt cache yields an empty store.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(store) => {
                debug!(path = %path.display(), entries = store.len(), "loaded stat cache");
                store
            }
            Err(CacheError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no stat cache yet; starting empty");
                Self::new()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "unreadable stat cache; starting empty"
                );
                Self::new()
            }
        }
    }

    /// Atomically write the store to `path` via a sibling temporary file.
    pub fn persist(&self, path: &Path) -> Result<(), CacheError> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&self.snapshot())?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| CacheError::Io(e.error))?;
        debug!(path = %path.display(), entries = self.len(), "persisted stat cache");
        Ok(())
    }
}

fn take<'a>(cursor: &mut &'a [u8], n: usize) -> Result<&'a [u8], CacheError> {
    if cursor.len() < n {
        return Err(CacheError::Truncated);
    }
    let (head, rest) = cursor.split_at(n);
    *cursor = rest;
    Ok(head)
}

fn read_u16(cursor: &mut &[u8]) -> Result<u16, CacheError> {
    let bytes = take(cursor, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_8(cursor: &mut &[u8]) -> Result<[u8; 8], CacheError> {
    let bytes = take(cursor, 8)?;
    let mut out = [0u8; 8];
    out.copy_from_slice(bytes);
    Ok(out)
}
