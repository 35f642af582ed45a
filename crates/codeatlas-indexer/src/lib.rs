//! Source ingestion for the code atlas.
//!
//! Walks a source tree, extracts entities and relationships per file with
//! tree-sitter, ingests them into the graph store, and keeps the graph
//! live by watching the filesystem for changes.

pub mod error;
pub mod extractor;
pub mod pipeline;
pub mod scanner;
pub mod watcher;

pub use error::IndexerError;
pub use extractor::extract;
pub use pipeline::{Pipeline, PipelineOptions};
pub use scanner::{relative_path, FileEntry, Language, Walker};
pub use watcher::{ChangeBatcher, ChangeKind, FileChange, FileWatcher, WatchSignal, WatcherOptions};
