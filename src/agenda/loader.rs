// src/agenda/loader.rs

use std::path::Path;

use crate::agenda::model::{Agenda, RawAgenda};
use crate::agenda::validate::normalize;
use crate::errors::LoadError;

/// Read and deserialize an agenda document without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawAgenda, LoadError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&contents).map_err(|source| LoadError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

/// Deserialize an agenda document from a string (used by tests).
pub fn load_from_str(contents: &str) -> Result<RawAgenda, LoadError> {
    serde_yaml::from_str(contents).map_err(|source| LoadError::Yaml {
        path: "<inline>".into(),
        source,
    })
}

/// Recommended entry point: read, deserialize, and normalize.
///
/// Normalization expands every task's effective command, resolves its stage,
/// and checks the document-level invariants (known procedures, bound
/// parameters, unique outputs, non-empty commands).
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Agenda, LoadError> {
    let raw = load_from_path(&path)?;
    normalize(raw)
}
