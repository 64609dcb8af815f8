// src/errors.rs

//! Crate-wide error taxonomy.

use std::path::PathBuf;

use thiserror::Error;

/// A structural problem in the agenda or depend documents.
///
/// Loading is all-or-nothing: the first violation found is reported and the
/// previous graph (if any) stays in force.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("procedure '{proc}' has an empty command")]
    EmptyCommand { proc: String },

    #[error("task '{task}' references unknown procedure '{proc}'")]
    UnknownProc { task: String, proc: String },

    #[error("procedure '{proc}' requires parameter '${param}' which task '{task}' does not bind")]
    UnboundParam {
        task: String,
        proc: String,
        param: String,
    },

    #[error("task '{task}' binds argument '{param}' which procedure '{proc}' never uses")]
    UnusedArg {
        task: String,
        proc: String,
        param: String,
    },

    #[error("stage {stage} references unknown procedure '{proc}'")]
    UnknownStageProc { stage: usize, proc: String },

    #[error("procedure '{proc}' of task '{task}' is not admitted by any stage")]
    Unstaged { task: String, proc: String },

    #[error("multiple tasks produce output '{path}'")]
    DuplicateOutput { path: PathBuf },

    #[error("cycle in task graph involving task '{task}'")]
    TaskCycle { task: String },

    #[error("cycle in implicit file graph involving '{path}'")]
    FileCycle { path: PathBuf },

    #[error("file '{path}' lists itself as a dependency")]
    SelfLoop { path: PathBuf },

    #[error(
        "task '{producer}' (stage {producer_stage}) produces an input of \
         task '{consumer}' (stage {consumer_stage})"
    )]
    StageOrder {
        producer: String,
        consumer: String,
        producer_stage: usize,
        consumer_stage: usize,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Problems with the on-disk stat cache.
///
/// These are never fatal on load; the store starts empty instead.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache file has wrong magic bytes")]
    BadMagic,

    #[error("unsupported cache version {0}")]
    UnsupportedVersion(u16),

    #[error("cache file is truncated")]
    Truncated,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum TaskleError {
    #[error("invalid agenda or depend document: {0}")]
    Load(#[from] LoadError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TaskleError>;
