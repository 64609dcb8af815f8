// src/depend.rs

//! Depend document handling.
//!
//! The depend file is a YAML mapping from a file path to the file paths its
//! freshness depends on. It is optional; a missing file means no implicit
//! edges. Self-loops are rejected here; longer cycles are caught when the
//! graph is built.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::errors::LoadError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Depend {
    /// File to the files it directly depends on, deduplicated in first
    /// occurrence order.
    pub edges: BTreeMap<PathBuf, Vec<PathBuf>>,
}

/// Load the depend document; a missing file yields the empty document.
pub fn load(path: impl AsRef<Path>) -> Result<Depend, LoadError> {
    let path = path.as_ref();
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Depend::default());
        }
        Err(source) => {
            return Err(LoadError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    from_str_inner(&contents, path)
}

/// Parse a depend document from a string (used by tests).
pub fn load_from_str(contents: &str) -> Result<Depend, LoadError> {
    from_str_inner(contents, Path::new("<inline>"))
}

fn from_str_inner(contents: &str, origin: &Path) -> Result<Depend, LoadError> {
    // An empty document deserializes as `None`.
    let raw: Option<BTreeMap<String, Vec<String>>> =
        serde_yaml::from_str(contents).map_err(|source| LoadError::Yaml {
            path: origin.to_path_buf(),
            source,
        })?;

    let mut edges = BTreeMap::new();
    for (src, dsts) in raw.unwrap_or_default() {
        let src = PathBuf::from(src);
        let mut deps: Vec<PathBuf> = Vec::with_capacity(dsts.len());
        for dst in dsts {
            let dst = PathBuf::from(dst);
            if dst == src {
                return Err(LoadError::SelfLoop { path: src });
            }
            if !deps.contains(&dst) {
                deps.push(dst);
            }
        }
        edges.insert(src, deps);
    }

    Ok(Depend { edges })
}
