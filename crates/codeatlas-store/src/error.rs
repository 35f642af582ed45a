//! Error types for the graph store.

use thiserror::Error;

/// Errors raised by the graph and fingerprint store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Constraint(e.to_string())
            }
            _ => StoreError::Transaction(e.to_string()),
        }
    }
}
