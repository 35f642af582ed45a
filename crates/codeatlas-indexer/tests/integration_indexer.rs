//! End-to-end pipeline tests over real temp directories.

use codeatlas_core::IndexEvent;
use codeatlas_indexer::{Pipeline, PipelineOptions};
use codeatlas_store::Store;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn pipeline() -> Arc<Pipeline> {
    let store = Arc::new(Store::open_in_memory().unwrap());
    Pipeline::new(store, PipelineOptions::default())
}

#[tokio::test]
async fn index_directory_builds_the_expected_graph() {
    let dir = tempdir().unwrap();
    write_file(
        dir.path(),
        "a.ts",
        "class Foo {\n  bar() {}\n}\nfunction baz() {}\n",
    );

    let pipeline = pipeline();
    let summary = pipeline.index_directory(dir.path()).await.unwrap();
    assert_eq!(summary.files_indexed, 1);
    assert_eq!(summary.files_unchanged, 0);
    assert_eq!(summary.files_failed, 0);

    let projection = pipeline.store().projection().unwrap();
    let labels: Vec<(&str, &str)> = projection
        .nodes
        .iter()
        .map(|n| (n.label.as_str(), n.name.as_str()))
        .collect();
    assert!(labels.contains(&("File", "a.ts")));
    assert!(labels.contains(&("Class", "Foo")));
    assert!(labels.contains(&("Method", "bar")));
    assert!(labels.contains(&("Function", "baz")));

    let foo_id = "a.ts#Class:Foo@1";
    let bar_id = "a.ts#Method:bar@2";
    assert!(projection
        .edges
        .iter()
        .any(|e| e.source == foo_id && e.target == bar_id && e.kind == "DECLARES"));
    assert!(projection
        .edges
        .iter()
        .any(|e| e.source == "a.ts" && e.target == foo_id && e.kind == "DECLARES"));
}

#[tokio::test]
async fn rescan_of_unchanged_tree_is_a_noop() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a.ts", "function baz() {}\n");

    let pipeline = pipeline();
    pipeline.index_directory(dir.path()).await.unwrap();
    let before = pipeline.store().projection().unwrap();

    let summary = pipeline.refresh_directory(dir.path()).await.unwrap();
    assert_eq!(summary.files_indexed, 0);
    assert_eq!(summary.files_unchanged, 1);
    assert_eq!(pipeline.store().projection().unwrap(), before);
}

#[tokio::test]
async fn modified_file_is_reindexed() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a.ts", "function old_name() {}\n");

    let pipeline = pipeline();
    pipeline.index_directory(dir.path()).await.unwrap();

    write_file(dir.path(), "a.ts", "function brand_new_name() {}\n");
    let summary = pipeline.refresh_directory(dir.path()).await.unwrap();
    assert_eq!(summary.files_indexed, 1);

    let hits = pipeline
        .store()
        .search("brand_new_name", None, 10)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(pipeline.store().search("old_name", None, 10).unwrap().is_empty());
}

#[tokio::test]
async fn deleted_file_is_reconciled_out() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "keep.ts", "function keep() {}\n");
    write_file(dir.path(), "gone.ts", "function gone() {}\n");

    let pipeline = pipeline();
    let summary = pipeline.index_directory(dir.path()).await.unwrap();
    assert_eq!(summary.files_indexed, 2);

    std::fs::remove_file(dir.path().join("gone.ts")).unwrap();
    let summary = pipeline.refresh_directory(dir.path()).await.unwrap();
    assert_eq!(summary.files_deleted, 1);
    assert!(pipeline.store().search("gone", None, 10).unwrap().is_empty());
    assert_eq!(pipeline.store().search("keep", None, 10).unwrap().len(), 1);
}

#[tokio::test]
async fn built_in_excludes_and_unsupported_files_are_skipped() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "src/main.rs", "fn main() {}\n");
    write_file(dir.path(), "node_modules/dep/index.ts", "function hidden() {}\n");
    write_file(dir.path(), "README.md", "# readme\n");

    let pipeline = pipeline();
    let summary = pipeline.index_directory(dir.path()).await.unwrap();
    assert_eq!(summary.files_indexed, 1);
    assert!(pipeline.store().search("hidden", None, 10).unwrap().is_empty());
    assert_eq!(pipeline.store().search("main", None, 10).unwrap().len(), 1);
}

#[tokio::test]
async fn index_run_emits_progress_and_complete_events() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a.py", "def alpha():\n    pass\n");

    let pipeline = pipeline();
    let mut events = pipeline.subscribe();
    let summary = pipeline.index_directory(dir.path()).await.unwrap();

    let mut saw_progress = false;
    let mut complete = None;
    while let Ok(event) = events.try_recv() {
        match event {
            IndexEvent::Progress { .. } => saw_progress = true,
            IndexEvent::Complete { summary } => complete = Some(summary),
            _ => {}
        }
    }
    assert!(saw_progress);
    assert_eq!(complete, Some(summary));
}

#[tokio::test]
async fn indexing_a_missing_root_fails() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope");
    let pipeline = pipeline();
    assert!(pipeline.index_directory(&missing).await.is_err());
}

#[tokio::test]
async fn multiple_languages_index_in_one_run() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "lib.rs", "pub fn ferric() {}\n");
    write_file(dir.path(), "app.py", "def serpentine():\n    pass\n");
    write_file(dir.path(), "main.go", "package main\n\nfunc gopherish() {}\n");
    write_file(dir.path(), "web.ts", "function scripty() {}\n");

    let pipeline = pipeline();
    let summary = pipeline.index_directory(dir.path()).await.unwrap();
    assert_eq!(summary.files_indexed, 4);
    for name in ["ferric", "serpentine", "gopherish", "scripty"] {
        assert_eq!(
            pipeline.store().search(name, None, 10).unwrap().len(),
            1,
            "missing {name}"
        );
    }
}

#[tokio::test]
async fn watcher_picks_up_created_and_deleted_files() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a.ts", "function first() {}\n");

    let pipeline = pipeline();
    pipeline.index_directory(dir.path()).await.unwrap();
    pipeline
        .start_watching(dir.path())
        .await
        .unwrap();
    assert!(pipeline.is_watching());

    write_file(dir.path(), "b.ts", "function second() {}\n");
    wait_for(&pipeline, |p| {
        !p.store().search("second", None, 10).unwrap().is_empty()
    })
    .await;

    std::fs::remove_file(dir.path().join("b.ts")).unwrap();
    wait_for(&pipeline, |p| {
        p.store().search("second", None, 10).unwrap().is_empty()
    })
    .await;

    pipeline.stop_watching();
    assert!(!pipeline.is_watching());
}

#[tokio::test]
async fn watcher_move_out_of_root_drops_the_file() {
    let dir = tempdir().unwrap();
    let elsewhere = tempdir().unwrap();
    write_file(dir.path(), "a.ts", "function roaming() {}\n");

    let pipeline = pipeline();
    pipeline.index_directory(dir.path()).await.unwrap();
    assert_eq!(pipeline.store().search("roaming", None, 10).unwrap().len(), 1);

    pipeline.start_watching(dir.path()).await.unwrap();
    std::fs::rename(dir.path().join("a.ts"), elsewhere.path().join("a.ts")).unwrap();

    wait_for(&pipeline, |p| {
        p.store().search("roaming", None, 10).unwrap().is_empty()
    })
    .await;
}

async fn wait_for(pipeline: &Arc<Pipeline>, check: impl Fn(&Arc<Pipeline>) -> bool) {
    for _ in 0..100 {
        if check(pipeline) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("condition not reached within 10s");
}
