//! Indexer error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during indexing operations.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Root traversal failed
    #[error("Traversal error: {0}")]
    Walk(String),

    /// Parser produced no tree at all
    #[error("Unparseable file: {path}")]
    Unparseable { path: PathBuf },

    /// Parse exceeded its time budget
    #[error("Parse timed out: {path}")]
    ParseTimeout { path: PathBuf },

    /// File watcher error
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// Graph or fingerprint store error
    #[error("Store error: {0}")]
    Store(String),

    /// Run was cancelled, e.g. by a root change or shutdown
    #[error("Operation cancelled")]
    Cancelled,

    /// Path not found
    #[error("Path not found: {0}")]
    NotFound(PathBuf),
}

impl From<codeatlas_store::StoreError> for IndexerError {
    fn from(e: codeatlas_store::StoreError) -> Self {
        IndexerError::Store(e.to_string())
    }
}

impl IndexerError {
    /// Short stable tag used in warning events and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            IndexerError::Io(_) => "io",
            IndexerError::Walk(_) => "traversal",
            IndexerError::Unparseable { .. } => "unparseable",
            IndexerError::ParseTimeout { .. } => "parse_timeout",
            IndexerError::Watcher(_) => "watcher",
            IndexerError::Store(_) => "store",
            IndexerError::Cancelled => "cancelled",
            IndexerError::NotFound(_) => "not_found",
        }
    }
}
