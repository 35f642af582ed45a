//! File system walker with gitignore support.
//!
//! Applies path-based exclusion only; extension allow-listing happens
//! downstream in the language dispatcher.

use crate::IndexerError;
use ignore::{overrides::OverrideBuilder, WalkBuilder, WalkState};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tracing::warn;

/// Dependency and build output directories never worth indexing,
/// regardless of ignore files.
const BUILT_IN_EXCLUDES: &[&str] = &[
    "node_modules",
    "target",
    "dist",
    "build",
    "__pycache__",
    ".next",
    ".nuxt",
    ".idea",
    ".vscode",
];

/// A discovered file entry.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Absolute path to the file
    pub path: PathBuf,
    /// Path relative to the walked root, with `/` separators
    pub rel_path: String,
    /// File size in bytes
    pub size: u64,
    /// Last modified time (Unix timestamp)
    pub mtime: i64,
}

/// File system walker that respects .gitignore rules plus built-in excludes.
pub struct Walker {
    root: PathBuf,
    /// Extra absolute paths to exclude, e.g. the daemon's own data directory.
    excluded_paths: Vec<PathBuf>,
}

impl Walker {
    /// Create a new walker for the given root directory.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            excluded_paths: Vec::new(),
        }
    }

    /// Exclude an absolute path and everything under it.
    pub fn exclude_path(mut self, path: &Path) -> Self {
        self.excluded_paths.push(path.to_path_buf());
        self
    }

    /// Walk the directory tree and return all discovered files, sorted by
    /// relative path. Unreadable subtrees are skipped with a warning.
    pub fn walk(&self) -> Result<Vec<FileEntry>, IndexerError> {
        if !self.root.is_dir() {
            return Err(IndexerError::Walk(format!(
                "root is not a directory: {}",
                self.root.display()
            )));
        }

        let mut overrides = OverrideBuilder::new(&self.root);
        for dir in BUILT_IN_EXCLUDES {
            overrides
                .add(&format!("!**/{dir}/**"))
                .map_err(|e| IndexerError::Walk(e.to_string()))?;
            overrides
                .add(&format!("!**/{dir}"))
                .map_err(|e| IndexerError::Walk(e.to_string()))?;
        }
        let overrides = overrides
            .build()
            .map_err(|e| IndexerError::Walk(e.to_string()))?;

        let (tx, rx) = mpsc::channel();
        let excluded = self.excluded_paths.clone();

        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .ignore(true)
            .parents(true)
            .overrides(overrides)
            .filter_entry(move |entry| {
                !excluded.iter().any(|ex| entry.path().starts_with(ex))
            })
            .build_parallel();

        walker.run(|| {
            let tx = tx.clone();
            Box::new(move |result| {
                match result {
                    Ok(entry) => {
                        if entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                            match entry.metadata() {
                                Ok(metadata) => {
                                    let mtime = metadata
                                        .modified()
                                        .ok()
                                        .and_then(|t| {
                                            t.duration_since(std::time::UNIX_EPOCH).ok()
                                        })
                                        .map(|d| d.as_secs() as i64)
                                        .unwrap_or(0);
                                    let _ = tx.send((
                                        entry.path().to_path_buf(),
                                        metadata.len(),
                                        mtime,
                                    ));
                                }
                                Err(e) => {
                                    warn!(path = ?entry.path(), error = %e, "Skipping unreadable entry");
                                }
                            }
                        }
                    }
                    Err(e) => {
                        // Unreadable subtree: skip, never abort the scan.
                        warn!(error = %e, "Skipping unreadable subtree");
                    }
                }
                WalkState::Continue
            })
        });

        drop(tx);

        let mut entries = Vec::new();
        for (path, size, mtime) in rx {
            if let Some(rel_path) = relative_path(&self.root, &path) {
                entries.push(FileEntry {
                    path,
                    rel_path,
                    size,
                    mtime,
                });
            }
        }

        entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        Ok(entries)
    }
}

/// Root-relative path with forward slashes, or None if `path` escapes root.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut out = String::new();
    for component in rel.components() {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(component.as_os_str().to_str()?);
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    #[test]
    fn test_walker_empty_directory() {
        let temp_dir = tempdir().unwrap();
        let entries = Walker::new(temp_dir.path()).walk().unwrap();
        assert_eq!(entries.len(), 0);
    }

    #[test]
    fn test_walker_missing_root_is_an_error() {
        let temp_dir = tempdir().unwrap();
        let missing = temp_dir.path().join("nope");
        assert!(Walker::new(&missing).walk().is_err());
    }

    #[test]
    fn test_walker_relative_paths_are_sorted() {
        let temp_dir = tempdir().unwrap();
        fs::create_dir(temp_dir.path().join("sub")).unwrap();
        File::create(temp_dir.path().join("c.ts")).unwrap();
        File::create(temp_dir.path().join("a.ts")).unwrap();
        File::create(temp_dir.path().join("sub/b.ts")).unwrap();

        let entries = Walker::new(temp_dir.path()).walk().unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["a.ts", "c.ts", "sub/b.ts"]);
    }

    #[test]
    fn test_walker_respects_gitignore() {
        let temp_dir = tempdir().unwrap();
        fs::create_dir(temp_dir.path().join(".git")).unwrap();
        fs::write(temp_dir.path().join(".gitignore"), "generated/\n").unwrap();
        fs::create_dir(temp_dir.path().join("generated")).unwrap();
        File::create(temp_dir.path().join("generated/out.ts")).unwrap();
        File::create(temp_dir.path().join("kept.ts")).unwrap();

        let entries = Walker::new(temp_dir.path()).walk().unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.rel_path.as_str()).collect();
        assert!(paths.contains(&"kept.ts"));
        assert!(!paths.iter().any(|p| p.starts_with("generated/")));
    }

    #[test]
    fn test_walker_built_in_excludes() {
        let temp_dir = tempdir().unwrap();
        for dir in ["node_modules/pkg", "dist", "__pycache__"] {
            fs::create_dir_all(temp_dir.path().join(dir)).unwrap();
        }
        File::create(temp_dir.path().join("node_modules/pkg/index.js")).unwrap();
        File::create(temp_dir.path().join("dist/bundle.js")).unwrap();
        File::create(temp_dir.path().join("__pycache__/mod.pyc")).unwrap();
        File::create(temp_dir.path().join("app.ts")).unwrap();

        let entries = Walker::new(temp_dir.path()).walk().unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["app.ts"]);
    }

    #[test]
    fn test_walker_excluded_path() {
        let temp_dir = tempdir().unwrap();
        let data_dir = temp_dir.path().join(".atlas");
        fs::create_dir(&data_dir).unwrap();
        File::create(data_dir.join("atlas.db")).unwrap();
        File::create(temp_dir.path().join("app.ts")).unwrap();

        // .atlas is hidden anyway; test with a visible data dir too
        let visible = temp_dir.path().join("atlasdata");
        fs::create_dir(&visible).unwrap();
        File::create(visible.join("atlas.db")).unwrap();

        let entries = Walker::new(temp_dir.path())
            .exclude_path(&visible)
            .walk()
            .unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["app.ts"]);
    }

    #[test]
    fn test_walker_file_entry_has_metadata() {
        let temp_dir = tempdir().unwrap();
        let content = "export const x = 1;";
        fs::write(temp_dir.path().join("x.ts"), content).unwrap();

        let entries = Walker::new(temp_dir.path()).walk().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].size, content.len() as u64);
        assert!(entries[0].mtime > 0);
    }

    #[test]
    fn test_relative_path() {
        let root = Path::new("/tmp/project");
        assert_eq!(
            relative_path(root, Path::new("/tmp/project/src/a.ts")),
            Some("src/a.ts".to_string())
        );
        assert_eq!(relative_path(root, Path::new("/elsewhere/a.ts")), None);
        assert_eq!(relative_path(root, Path::new("/tmp/project")), None);
    }
}
