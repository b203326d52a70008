//! Error types for atelier-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from knowledge base operations.
#[derive(Debug, Error)]
pub enum KnowledgeBaseError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse knowledge base document at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.atelier/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

/// Convenience constructor for [`KnowledgeBaseError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> KnowledgeBaseError {
    KnowledgeBaseError::Io {
        path: path.into(),
        source,
    }
}
