//! File system watcher for detecting changes.
//!
//! Uses FSEvents on macOS and inotify on Linux, debounced. The watcher
//! publishes into a bounded channel; the blocking send gives explicit
//! backpressure instead of unbounded callback fan-out. Watcher-side
//! errors surface as an Overflow signal so the consumer can fall back to
//! a full rescan.

use crate::IndexerError;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebouncedEvent, Debouncer, RecommendedCache};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// File change type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    /// File moved within the watched root; `to` is the new path.
    Renamed { to: PathBuf },
}

/// A file system change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Path to the changed file (the old path for renames)
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// What the watcher delivers to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchSignal {
    Change(FileChange),
    /// The OS dropped events; the graph may be stale until a full rescan.
    Overflow,
}

/// Options for the file watcher.
#[derive(Debug, Clone)]
pub struct WatcherOptions {
    pub debounce: Duration,
    /// Bound of the event channel.
    pub capacity: usize,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            capacity: 1024,
        }
    }
}

/// Debounced file system watcher feeding a bounded channel.
pub struct FileWatcher {
    options: WatcherOptions,
    tx: mpsc::Sender<WatchSignal>,
    rx: mpsc::Receiver<WatchSignal>,
    _debouncer: Option<Debouncer<RecommendedWatcher, RecommendedCache>>,
}

impl FileWatcher {
    pub fn new(options: WatcherOptions) -> Self {
        let (tx, rx) = mpsc::channel(options.capacity.max(1));
        Self {
            options,
            tx,
            rx,
            _debouncer: None,
        }
    }

    /// Start watching a directory recursively.
    pub fn watch(&mut self, path: &Path) -> Result<(), IndexerError> {
        let path = path
            .canonicalize()
            .map_err(|_| IndexerError::NotFound(path.to_path_buf()))?;

        let tx = self.tx.clone();
        let mut debouncer = new_debouncer(
            self.options.debounce,
            None,
            move |result: Result<Vec<DebouncedEvent>, Vec<notify::Error>>| match result {
                Ok(events) => {
                    for event in events {
                        for change in convert_event(&event.event) {
                            if tx.blocking_send(WatchSignal::Change(change)).is_err() {
                                return;
                            }
                        }
                    }
                }
                Err(errors) => {
                    for e in errors {
                        warn!(error = %e, "Watcher error, scheduling rescan");
                    }
                    let _ = tx.blocking_send(WatchSignal::Overflow);
                }
            },
        )
        .map_err(|e| IndexerError::Watcher(e.to_string()))?;

        debouncer
            .watch(&path, RecursiveMode::Recursive)
            .map_err(|e: notify::Error| IndexerError::Watcher(e.to_string()))?;

        info!(path = ?path, "Started watching");
        self._debouncer = Some(debouncer);
        Ok(())
    }

    /// Receive the next signal.
    pub async fn next(&mut self) -> Option<WatchSignal> {
        self.rx.recv().await
    }

    /// Try to receive a signal without blocking.
    pub fn try_next(&mut self) -> Option<WatchSignal> {
        self.rx.try_recv().ok()
    }
}

/// Convert a notify event into zero or more file changes.
fn convert_event(event: &Event) -> Vec<FileChange> {
    use notify::event::{ModifyKind, RenameMode};

    let Some(path) = event.paths.first().cloned() else {
        return Vec::new();
    };

    let changes = match &event.kind {
        EventKind::Create(_) => vec![FileChange {
            path,
            kind: ChangeKind::Created,
        }],
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            match event.paths.get(1).cloned() {
                Some(to) => vec![FileChange {
                    path,
                    kind: ChangeKind::Renamed { to },
                }],
                None => vec![FileChange {
                    path,
                    kind: ChangeKind::Modified,
                }],
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => vec![FileChange {
            path,
            kind: ChangeKind::Deleted,
        }],
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => vec![FileChange {
            path,
            kind: ChangeKind::Created,
        }],
        EventKind::Modify(_) => vec![FileChange {
            path,
            kind: ChangeKind::Modified,
        }],
        EventKind::Remove(_) => vec![FileChange {
            path,
            kind: ChangeKind::Deleted,
        }],
        EventKind::Any | EventKind::Access(_) | EventKind::Other => Vec::new(),
    };

    for change in &changes {
        debug!(path = ?change.path, kind = ?change.kind, "File change detected");
    }
    changes
}

/// Coalesces bursts of changes per path before dispatch.
pub struct ChangeBatcher {
    changes: Vec<FileChange>,
}

impl ChangeBatcher {
    pub fn new() -> Self {
        Self {
            changes: Vec::new(),
        }
    }

    /// Add a change, collapsing it into an existing pending change for the
    /// same path. Delete always wins over create/modify; otherwise the
    /// latest state wins.
    pub fn add(&mut self, change: FileChange) {
        if let Some(existing) = self.changes.iter_mut().find(|c| c.path == change.path) {
            if change.kind == ChangeKind::Deleted {
                existing.kind = ChangeKind::Deleted;
            } else if existing.kind != ChangeKind::Deleted {
                existing.kind = change.kind;
            }
        } else {
            self.changes.push(change);
        }
    }

    /// Take the pending batch in arrival order.
    pub fn take(&mut self) -> Vec<FileChange> {
        std::mem::take(&mut self.changes)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl Default for ChangeBatcher {
    fn default() -> Self {
        Self::new()
    }
}
