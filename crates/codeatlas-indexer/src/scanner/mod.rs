//! Directory traversal and language dispatch.

pub mod language;
pub mod walker;

pub use language::Language;
pub use walker::{relative_path, FileEntry, Walker};
