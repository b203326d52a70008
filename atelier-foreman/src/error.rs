//! Error types for atelier-foreman.

use std::path::PathBuf;

use thiserror::Error;

use atelier_core::KnowledgeBaseError;

/// Failures starting an execution. Failures *during* an execution are
/// reported through [`crate::executor::RunRecord::error`] instead.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("formula action has an empty exec list")]
    EmptyAction,
}

/// Error surface for the foreman loop and its runtime.
#[derive(Debug, Error)]
pub enum ForemanError {
    #[error("knowledge base error: {0}")]
    KnowledgeBase(#[from] KnowledgeBaseError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("foreman has not been registered; call register() first")]
    NotRegistered,

    #[error("{task} task join failure: {message}")]
    Join { task: &'static str, message: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ForemanError {
    ForemanError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn exec_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ExecutorError {
    ExecutorError::Io {
        path: path.into(),
        source,
    }
}
