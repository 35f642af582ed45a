//! The indexing pipeline: scan, classify, extract, ingest, watch.
//!
//! Parsing and hashing are CPU-bound and run on the blocking pool behind a
//! semaphore sized to the worker count. The store connection serializes
//! writes; a per-path lock map keeps a scan and the watcher from racing on
//! the same file. Changing the root bumps a run generation, cancelling
//! in-flight workers for the old root.

use crate::extractor::extract;
use crate::scanner::{relative_path, FileEntry, Language, Walker};
use crate::watcher::{ChangeBatcher, ChangeKind, FileChange, FileWatcher, WatchSignal, WatcherOptions};
use crate::IndexerError;
use codeatlas_core::{IndexEvent, RunSummary, SourceFile};
use codeatlas_store::{map_extraction, ChangeClass, Store, StoreError};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const INGEST_RETRIES: u32 = 3;
const INGEST_RETRY_BASE: Duration = Duration::from_millis(100);

/// Pipeline tuning knobs.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Per-file parse time budget.
    pub parse_timeout: Duration,
    /// Concurrent parse/hash workers.
    pub workers: usize,
    /// Watcher debounce window.
    pub debounce: Duration,
    /// The daemon's own data directory, excluded from traversal.
    pub data_dir: Option<PathBuf>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            parse_timeout: Duration::from_secs(5),
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            debounce: Duration::from_millis(300),
            data_dir: None,
        }
    }
}

/// Outcome of processing one file.
enum FileOutcome {
    Indexed { entities: usize },
    Unchanged,
    Skipped,
}

/// The indexing pipeline. Shared behind an `Arc`; every operation is safe
/// to call concurrently.
pub struct Pipeline {
    store: Arc<Store>,
    options: PipelineOptions,
    events: broadcast::Sender<IndexEvent>,
    semaphore: Arc<Semaphore>,
    /// In-flight lock per root-relative path.
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    root: Mutex<Option<PathBuf>>,
    /// Bumped on root change; workers holding a stale generation abort.
    generation: AtomicU64,
    watch_task: Mutex<Option<JoinHandle<()>>>,
}

impl Pipeline {
    pub fn new(store: Arc<Store>, options: PipelineOptions) -> Arc<Self> {
        let workers = options.workers.max(1);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            store,
            options,
            events,
            semaphore: Arc::new(Semaphore::new(workers)),
            locks: Mutex::new(HashMap::new()),
            root: Mutex::new(None),
            generation: AtomicU64::new(0),
            watch_task: Mutex::new(None),
        })
    }

    /// Subscribe to pipeline events.
    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.events.subscribe()
    }

    /// The currently selected root, if any.
    pub fn current_root(&self) -> Option<PathBuf> {
        self.root.lock().clone()
    }

    pub fn is_watching(&self) -> bool {
        self.watch_task.lock().is_some()
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    fn emit(&self, event: IndexEvent) {
        // No subscribers is fine; events are best-effort.
        let _ = self.events.send(event);
    }

    fn emit_progress(&self, message: impl Into<String>) {
        self.emit(IndexEvent::Progress {
            message: message.into(),
        });
    }

    fn emit_warning(&self, kind: &str, message: impl Into<String>) {
        self.emit(IndexEvent::Warning {
            kind: kind.to_string(),
            message: message.into(),
        });
    }

    /// Select a root, cancelling in-flight work for any previous root.
    fn select_root(&self, root: &Path) {
        let mut current = self.root.lock();
        if current.as_deref() != Some(root) {
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.locks.lock().clear();
            *current = Some(root.to_path_buf());
        }
    }

    /// Index a directory from scratch (fingerprints make it incremental).
    pub async fn index_directory(
        self: &Arc<Self>,
        root: &Path,
    ) -> Result<RunSummary, IndexerError> {
        let root = root
            .canonicalize()
            .map_err(|_| IndexerError::NotFound(root.to_path_buf()))?;
        self.select_root(&root);
        self.emit_progress(format!("Indexing {}", root.display()));

        match self.scan(&root).await {
            Ok(summary) => {
                self.emit(IndexEvent::Complete {
                    summary: summary.clone(),
                });
                Ok(summary)
            }
            Err(e) => {
                self.emit(IndexEvent::Fatal {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Incremental refresh of the current or given root.
    pub async fn refresh_directory(
        self: &Arc<Self>,
        root: &Path,
    ) -> Result<RunSummary, IndexerError> {
        self.index_directory(root).await
    }

    /// One full traversal: classify every candidate, ingest changes, and
    /// reconcile deletions against the fingerprint store.
    async fn scan(self: &Arc<Self>, root: &Path) -> Result<RunSummary, IndexerError> {
        let generation = self.generation.load(Ordering::SeqCst);
        let entries = self.walk_root(root).await?;

        let mut summary = RunSummary::default();
        let mut present = std::collections::HashSet::new();
        let mut set: JoinSet<Result<FileOutcome, IndexerError>> = JoinSet::new();

        for entry in entries {
            if Language::from_path(&entry.path).is_none() {
                continue;
            }
            present.insert(entry.rel_path.clone());
            let pipeline = Arc::clone(self);
            set.spawn(async move { pipeline.process_entry(entry, generation).await });
        }

        while let Some(joined) = set.join_next().await {
            let result = joined.map_err(|e| IndexerError::Walk(e.to_string()))?;
            match result {
                Ok(FileOutcome::Indexed { entities }) => {
                    summary.files_indexed += 1;
                    summary.entities += entities;
                }
                Ok(FileOutcome::Unchanged) => summary.files_unchanged += 1,
                Ok(FileOutcome::Skipped) => {}
                Err(IndexerError::Cancelled) => return Err(IndexerError::Cancelled),
                Err(e) => {
                    summary.files_failed += 1;
                    self.emit_warning(e.kind(), e.to_string());
                }
            }
        }

        // Previously known paths absent from this traversal are deletions.
        for path in self.store.reconcile(&present)? {
            let _lock = self.path_lock(&path);
            let guard = _lock.lock().await;
            self.store.remove_file(&path)?;
            self.store.remove_fingerprint(&path)?;
            drop(guard);
            summary.files_deleted += 1;
            self.emit_progress(format!("Removed {path}"));
        }

        info!(
            indexed = summary.files_indexed,
            unchanged = summary.files_unchanged,
            deleted = summary.files_deleted,
            failed = summary.files_failed,
            "scan finished"
        );
        Ok(summary)
    }

    async fn walk_root(&self, root: &Path) -> Result<Vec<FileEntry>, IndexerError> {
        let mut walker = Walker::new(root);
        if let Some(data_dir) = &self.options.data_dir {
            walker = walker.exclude_path(data_dir);
        }
        tokio::task::spawn_blocking(move || walker.walk())
            .await
            .map_err(|e| IndexerError::Walk(e.to_string()))?
    }

    fn path_lock(&self, rel_path: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(
            locks
                .entry(rel_path.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    fn check_generation(&self, generation: u64) -> Result<(), IndexerError> {
        if self.generation.load(Ordering::SeqCst) != generation {
            return Err(IndexerError::Cancelled);
        }
        Ok(())
    }

    /// Classify and, when changed, parse and ingest one file. The per-path
    /// lock is the serialization point between a scan and the watcher.
    async fn process_entry(
        self: Arc<Self>,
        entry: FileEntry,
        generation: u64,
    ) -> Result<FileOutcome, IndexerError> {
        let Some(lang) = Language::from_path(&entry.path) else {
            return Ok(FileOutcome::Skipped);
        };

        let lock = self.path_lock(&entry.rel_path);
        let _guard = lock.lock().await;
        self.check_generation(generation)?;

        // Stat pre-filter: untouched size+mtime skips re-hashing.
        if self.store.matches_stat(&entry.rel_path, entry.size as i64, entry.mtime)? {
            return Ok(FileOutcome::Unchanged);
        }

        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| IndexerError::Cancelled)?;

        let pipeline = Arc::clone(&self);
        let outcome = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            pipeline.parse_and_ingest(&entry, lang, generation)
        })
        .await
        .map_err(|e| IndexerError::Walk(e.to_string()))??;

        Ok(outcome)
    }

    /// Blocking half of file processing: read, hash, classify, extract,
    /// and commit the per-file transaction.
    fn parse_and_ingest(
        &self,
        entry: &FileEntry,
        lang: Language,
        generation: u64,
    ) -> Result<FileOutcome, IndexerError> {
        self.check_generation(generation)?;

        let bytes = std::fs::read(&entry.path)?;
        let hash = hex_digest(&bytes);

        if self.store.classify(&entry.rel_path, &hash)? == ChangeClass::Unchanged {
            // Refresh the stat pre-filter so the next scan skips hashing.
            self.store
                .commit_fingerprint(&entry.rel_path, &hash, entry.size as i64, entry.mtime)?;
            return Ok(FileOutcome::Unchanged);
        }

        let source = String::from_utf8_lossy(&bytes);
        let extraction = extract(&entry.rel_path, &source, lang, self.options.parse_timeout)?;
        let entity_count = extraction.entities.len();

        let file = SourceFile {
            path: entry.rel_path.clone(),
            language: lang.name().to_string(),
            fingerprint: hash.clone(),
            last_indexed_at: chrono::Utc::now().timestamp(),
        };
        let (nodes, edges) = map_extraction(&file, &extraction);

        self.check_generation(generation)?;
        self.ingest_with_retry(&entry.rel_path, &nodes, &edges)?;
        self.store
            .commit_fingerprint(&entry.rel_path, &hash, entry.size as i64, entry.mtime)?;

        self.emit_progress(format!(
            "Indexed {} ({} entities)",
            entry.rel_path, entity_count
        ));
        Ok(FileOutcome::Indexed {
            entities: entity_count,
        })
    }

    /// A failed transaction retries with backoff; it never aborts sibling
    /// files.
    fn ingest_with_retry(
        &self,
        rel_path: &str,
        nodes: &[codeatlas_store::NodeRecord],
        edges: &[codeatlas_store::EdgeRecord],
    ) -> Result<(), IndexerError> {
        let mut last: Option<StoreError> = None;
        for attempt in 0..INGEST_RETRIES {
            match self.store.replace_file(rel_path, nodes, edges) {
                Ok(_) => return Ok(()),
                Err(e) => {
                    warn!(path = rel_path, attempt, error = %e, "ingest failed, retrying");
                    std::thread::sleep(INGEST_RETRY_BASE * (attempt + 1));
                    last = Some(e);
                }
            }
        }
        Err(last
            .map(IndexerError::from)
            .unwrap_or(IndexerError::Cancelled))
    }

    // ── Watching ────────────────────────────────────────────────────────

    /// Start watching a root, feeding changes back through the pipeline.
    pub async fn start_watching(self: &Arc<Self>, root: &Path) -> Result<(), IndexerError> {
        let root = root
            .canonicalize()
            .map_err(|_| IndexerError::NotFound(root.to_path_buf()))?;
        self.stop_watching();
        self.select_root(&root);

        let mut watcher = FileWatcher::new(WatcherOptions {
            debounce: self.options.debounce,
            ..WatcherOptions::default()
        });
        watcher.watch(&root)?;

        let pipeline = Arc::clone(self);
        let handle = tokio::spawn(async move {
            pipeline.watch_loop(watcher, root).await;
        });
        *self.watch_task.lock() = Some(handle);
        Ok(())
    }

    /// Stop watching. Idempotent.
    pub fn stop_watching(&self) {
        if let Some(handle) = self.watch_task.lock().take() {
            handle.abort();
            info!("Stopped watching");
        }
    }

    async fn watch_loop(self: Arc<Self>, mut watcher: FileWatcher, root: PathBuf) {
        let mut batcher = ChangeBatcher::new();
        while let Some(signal) = watcher.next().await {
            let mut overflow = matches!(signal, WatchSignal::Overflow);
            if let WatchSignal::Change(change) = signal {
                batcher.add(change);
            }
            // Drain the backlog so a burst coalesces into one batch.
            while let Some(signal) = watcher.try_next() {
                match signal {
                    WatchSignal::Change(change) => batcher.add(change),
                    WatchSignal::Overflow => overflow = true,
                }
            }

            if overflow {
                self.emit_warning(
                    "watcher_overflow",
                    "Filesystem events were dropped; running a full rescan",
                );
                batcher.take();
                match self.scan(&root).await {
                    Ok(summary) => self.emit(IndexEvent::Complete { summary }),
                    Err(IndexerError::Cancelled) => return,
                    Err(e) => self.emit_warning(e.kind(), e.to_string()),
                }
                continue;
            }

            for change in batcher.take() {
                if let Err(IndexerError::Cancelled) = self.apply_change(&root, change).await {
                    return;
                }
            }
        }
    }

    /// Apply one debounced change. Deletes bypass the parser entirely.
    async fn apply_change(
        self: &Arc<Self>,
        root: &Path,
        change: FileChange,
    ) -> Result<(), IndexerError> {
        let generation = self.generation.load(Ordering::SeqCst);
        let Some(rel_path) = relative_path(root, &change.path) else {
            return Ok(());
        };

        match change.kind {
            ChangeKind::Deleted => {
                let lock = self.path_lock(&rel_path);
                let _guard = lock.lock().await;
                self.check_generation(generation)?;
                if self.store.remove_fingerprint(&rel_path)? {
                    self.store.remove_file(&rel_path)?;
                    self.emit_progress(format!("Removed {rel_path}"));
                }
            }
            ChangeKind::Renamed { to } => {
                let Some(new_rel) = relative_path(root, &to) else {
                    // Moved outside the root: treat as a delete.
                    let lock = self.path_lock(&rel_path);
                    let _guard = lock.lock().await;
                    self.check_generation(generation)?;
                    if self.store.remove_fingerprint(&rel_path)? {
                        self.store.remove_file(&rel_path)?;
                        self.emit_progress(format!("Removed {rel_path}"));
                    }
                    return Ok(());
                };
                let lock = self.path_lock(&rel_path);
                let _guard = lock.lock().await;
                self.check_generation(generation)?;
                match self.store.rename_file(&rel_path, &new_rel) {
                    Ok(()) => {
                        self.store.rename_fingerprint(&rel_path, &new_rel)?;
                        self.emit_progress(format!("Renamed {rel_path} -> {new_rel}"));
                    }
                    Err(StoreError::NotFound(_)) => {
                        // Unknown source path: index the destination fresh.
                        drop(_guard);
                        self.reindex_path(root, &to, generation).await?;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            ChangeKind::Created | ChangeKind::Modified => {
                self.reindex_path(root, &change.path, generation).await?;
            }
        }
        Ok(())
    }

    async fn reindex_path(
        self: &Arc<Self>,
        root: &Path,
        path: &Path,
        generation: u64,
    ) -> Result<(), IndexerError> {
        let Some(rel_path) = relative_path(root, path) else {
            return Ok(());
        };
        let metadata = match std::fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            // Gone or not a file by the time the event arrives.
            _ => return Ok(()),
        };
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let entry = FileEntry {
            path: path.to_path_buf(),
            rel_path,
            size: metadata.len(),
            mtime,
        };

        match Arc::clone(self).process_entry(entry, generation).await {
            Ok(_) => Ok(()),
            Err(IndexerError::Cancelled) => Err(IndexerError::Cancelled),
            Err(e) => {
                debug!(error = %e, "watch reindex failed");
                self.emit_warning(e.kind(), e.to_string());
                Ok(())
            }
        }
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_digest_is_stable() {
        assert_eq!(hex_digest(b"abc"), hex_digest(b"abc"));
        assert_ne!(hex_digest(b"abc"), hex_digest(b"abd"));
        assert_eq!(hex_digest(b"").len(), 64);
    }

    #[test]
    fn test_default_options() {
        let options = PipelineOptions::default();
        assert!(options.workers >= 1);
        assert_eq!(options.debounce, Duration::from_millis(300));
    }
}
