//! codeatlas-store: SQLite persistence for the code graph.
//!
//! Uses rusqlite with bundled SQLite, WAL mode, and an embedded schema.
//! One connection behind a mutex is the write-serialization point; every
//! per-file ingest runs as a single transaction against it.

use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;
use std::path::Path;

mod error;
mod fingerprint;
mod graph;
mod mapper;

pub use error::StoreError;
pub use fingerprint::{ChangeClass, Fingerprint};
pub use graph::{EdgeRecord, NodeRecord};
pub use mapper::map_extraction;

const SCHEMA: &str = include_str!("schema.sql");

/// SQLite-backed store holding the code graph and file fingerprints.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Get a lock on the underlying connection.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Connection(e.to_string()))?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        conn.pragma_update(None, "temp_store", "MEMORY")
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Connection(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}
