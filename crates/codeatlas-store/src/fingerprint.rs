//! Content fingerprint persistence and change classification.
//!
//! SHA-256 of the file bytes is the authoritative fingerprint; size and
//! mtime are only a pre-filter that lets callers skip re-hashing files
//! whose stat has not moved.

use crate::{Store, StoreError};
use rusqlite::{params, OptionalExtension};
use std::collections::HashSet;

/// How a file compares to the last indexed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeClass {
    Unchanged,
    Added,
    Modified,
}

/// One persisted fingerprint row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub path: String,
    pub hash: String,
    pub size: i64,
    pub mtime: i64,
    pub indexed_at: i64,
}

impl Store {
    /// Look up the stored fingerprint for a path.
    pub fn fingerprint(&self, path: &str) -> Result<Option<Fingerprint>, StoreError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT path, hash, size, mtime, indexed_at FROM fingerprints WHERE path = ?1",
                params![path],
                |row| {
                    Ok(Fingerprint {
                        path: row.get(0)?,
                        hash: row.get(1)?,
                        size: row.get(2)?,
                        mtime: row.get(3)?,
                        indexed_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Pre-filter: true when the stored size and mtime both match, meaning
    /// the caller may treat the file as unchanged without hashing it.
    pub fn matches_stat(&self, path: &str, size: i64, mtime: i64) -> Result<bool, StoreError> {
        Ok(self
            .fingerprint(path)?
            .map(|fp| fp.size == size && fp.mtime == mtime)
            .unwrap_or(false))
    }

    /// Classify a path against its freshly computed hash.
    pub fn classify(&self, path: &str, hash: &str) -> Result<ChangeClass, StoreError> {
        match self.fingerprint(path)? {
            None => Ok(ChangeClass::Added),
            Some(fp) if fp.hash == hash => Ok(ChangeClass::Unchanged),
            Some(_) => Ok(ChangeClass::Modified),
        }
    }

    /// Record a fingerprint after a successful ingest.
    pub fn commit_fingerprint(
        &self,
        path: &str,
        hash: &str,
        size: i64,
        mtime: i64,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO fingerprints (path, hash, size, mtime, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![path, hash, size, mtime, chrono::Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// Move a fingerprint row to a new path.
    pub fn rename_fingerprint(&self, old_path: &str, new_path: &str) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE OR REPLACE fingerprints SET path = ?2 WHERE path = ?1",
            params![old_path, new_path],
        )?;
        Ok(())
    }

    /// Forget a fingerprint, e.g. when its file is deleted.
    pub fn remove_fingerprint(&self, path: &str) -> Result<bool, StoreError> {
        let conn = self.conn();
        let rows = conn.execute("DELETE FROM fingerprints WHERE path = ?1", params![path])?;
        Ok(rows > 0)
    }

    /// All paths with a stored fingerprint.
    pub fn known_paths(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT path FROM fingerprints ORDER BY path")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<_, _>>().map_err(Into::into)
    }

    /// Full-scan reconciliation: previously known paths absent from the
    /// fresh traversal. These are the deletions the watcher missed.
    pub fn reconcile(&self, present: &HashSet<String>) -> Result<Vec<String>, StoreError> {
        Ok(self
            .known_paths()?
            .into_iter()
            .filter(|path| !present.contains(path))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_lifecycle() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.classify("a.ts", "h1").unwrap(), ChangeClass::Added);

        store.commit_fingerprint("a.ts", "h1", 10, 100).unwrap();
        assert_eq!(store.classify("a.ts", "h1").unwrap(), ChangeClass::Unchanged);
        assert_eq!(store.classify("a.ts", "h2").unwrap(), ChangeClass::Modified);
    }

    #[test]
    fn stat_prefilter() {
        let store = Store::open_in_memory().unwrap();
        store.commit_fingerprint("a.ts", "h1", 10, 100).unwrap();
        assert!(store.matches_stat("a.ts", 10, 100).unwrap());
        assert!(!store.matches_stat("a.ts", 10, 101).unwrap());
        assert!(!store.matches_stat("a.ts", 11, 100).unwrap());
        assert!(!store.matches_stat("b.ts", 10, 100).unwrap());
    }

    #[test]
    fn reconcile_reports_absent_paths() {
        let store = Store::open_in_memory().unwrap();
        store.commit_fingerprint("a.ts", "h1", 1, 1).unwrap();
        store.commit_fingerprint("b.ts", "h2", 1, 1).unwrap();

        let present: HashSet<String> = ["a.ts".to_string()].into_iter().collect();
        let deleted = store.reconcile(&present).unwrap();
        assert_eq!(deleted, vec!["b.ts".to_string()]);
    }

    #[test]
    fn remove_and_rename() {
        let store = Store::open_in_memory().unwrap();
        store.commit_fingerprint("a.ts", "h1", 1, 1).unwrap();
        store.rename_fingerprint("a.ts", "b.ts").unwrap();
        assert!(store.fingerprint("a.ts").unwrap().is_none());
        assert_eq!(store.fingerprint("b.ts").unwrap().unwrap().hash, "h1");
        assert!(store.remove_fingerprint("b.ts").unwrap());
        assert!(!store.remove_fingerprint("b.ts").unwrap());
    }
}
