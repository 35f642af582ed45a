//! Integration tests for graph ingest semantics.

use codeatlas_core::{Entity, EntityKind, Extraction, Relationship, RelationshipKind, SourceFile};
use codeatlas_store::{map_extraction, Store};

fn source_file(path: &str) -> SourceFile {
    SourceFile {
        path: path.to_string(),
        language: "typescript".to_string(),
        fingerprint: format!("fp-{path}"),
        last_indexed_at: 1_700_000_000,
    }
}

/// Extraction mirroring a file with one class holding two methods and one
/// top-level function.
fn class_with_methods(path: &str) -> Extraction {
    let class = Entity::new(EntityKind::Class, "Widget", path, 1, 10);
    let m1 = Entity::new(EntityKind::Method, "render", path, 2, 4);
    let m2 = Entity::new(EntityKind::Method, "update", path, 5, 9);
    let func = Entity::new(EntityKind::Function, "helper", path, 12, 14);
    let relationships = vec![
        Relationship::new(path, class.identity(), RelationshipKind::Declares),
        Relationship::new(class.identity(), m1.identity(), RelationshipKind::Declares),
        Relationship::new(class.identity(), m2.identity(), RelationshipKind::Declares),
        Relationship::new(path, func.identity(), RelationshipKind::Declares),
    ];
    Extraction {
        entities: vec![class, m1, m2, func],
        relationships,
    }
}

fn ingest(store: &Store, path: &str, extraction: &Extraction) -> codeatlas_core::IngestSummary {
    let file = source_file(path);
    let (nodes, edges) = map_extraction(&file, extraction);
    store.replace_file(path, &nodes, &edges).unwrap()
}

#[test]
fn first_ingest_creates_everything() {
    let store = Store::open_in_memory().unwrap();
    let summary = ingest(&store, "src/widget.ts", &class_with_methods("src/widget.ts"));
    // 1 file + 4 entities + 1 directory
    assert_eq!(summary.nodes_created, 6);
    assert!(summary.edges_created >= 5);
    assert_eq!(summary.nodes_deleted, 0);
}

#[test]
fn reingest_of_identical_content_is_noop() {
    let store = Store::open_in_memory().unwrap();
    let extraction = class_with_methods("src/widget.ts");
    ingest(&store, "src/widget.ts", &extraction);
    let second = ingest(&store, "src/widget.ts", &extraction);
    assert!(second.is_noop(), "second ingest wrote: {second:?}");
}

#[test]
fn ingest_converges_after_modification() {
    let store = Store::open_in_memory().unwrap();
    let path = "src/widget.ts";
    ingest(&store, path, &class_with_methods(path));

    // Drop one method, shift the function.
    let class = Entity::new(EntityKind::Class, "Widget", path, 1, 8);
    let m1 = Entity::new(EntityKind::Method, "render", path, 2, 4);
    let func = Entity::new(EntityKind::Function, "helper", path, 10, 12);
    let modified = Extraction {
        relationships: vec![
            Relationship::new(path, class.identity(), RelationshipKind::Declares),
            Relationship::new(class.identity(), m1.identity(), RelationshipKind::Declares),
            Relationship::new(path, func.identity(), RelationshipKind::Declares),
        ],
        entities: vec![class, m1, func],
    };
    let summary = ingest(&store, path, &modified);
    assert!(summary.nodes_deleted > 0);

    // End state equals a fresh ingest of the same content.
    let fresh = Store::open_in_memory().unwrap();
    ingest(&fresh, path, &modified);
    let a = store.projection().unwrap();
    let b = fresh.projection().unwrap();
    assert_eq!(a.nodes, b.nodes);
    assert_eq!(a.edges, b.edges);
}

#[test]
fn nesting_edges_are_exact() {
    let store = Store::open_in_memory().unwrap();
    let path = "src/widget.ts";
    ingest(&store, path, &class_with_methods(path));
    let projection = store.projection().unwrap();

    let class_id = format!("{path}#Class:Widget@1");
    let class_to_method: Vec<_> = projection
        .edges
        .iter()
        .filter(|e| e.kind == "DECLARES" && e.source == class_id)
        .collect();
    assert_eq!(class_to_method.len(), 2);

    let file_declares: Vec<_> = projection
        .edges
        .iter()
        .filter(|e| e.kind == "DECLARES" && e.source == path)
        .collect();
    assert_eq!(file_declares.len(), 2); // the class and the function
}

#[test]
fn deleting_one_file_leaves_siblings_intact() {
    let store = Store::open_in_memory().unwrap();
    ingest(&store, "src/a.ts", &class_with_methods("src/a.ts"));
    ingest(&store, "src/b.ts", &class_with_methods("src/b.ts"));

    store.remove_file("src/a.ts").unwrap();
    let projection = store.projection().unwrap();

    assert!(projection.nodes.iter().all(|n| n.id != "src/a.ts"));
    assert!(projection
        .nodes
        .iter()
        .all(|n| !n.id.starts_with("src/a.ts#")));
    assert!(projection
        .edges
        .iter()
        .all(|e| !e.source.starts_with("src/a.ts") && !e.target.starts_with("src/a.ts")));

    // b.ts and the shared directory survive.
    assert!(projection.nodes.iter().any(|n| n.id == "src/b.ts"));
    assert!(projection
        .nodes
        .iter()
        .any(|n| n.id == "src" && n.label == "Directory"));
}

#[test]
fn childless_directories_are_pruned() {
    let store = Store::open_in_memory().unwrap();
    ingest(
        &store,
        "src/deep/nested/a.ts",
        &class_with_methods("src/deep/nested/a.ts"),
    );
    store.remove_file("src/deep/nested/a.ts").unwrap();

    let projection = store.projection().unwrap();
    assert!(
        projection
            .nodes
            .iter()
            .all(|n| n.label != "Directory"),
        "expected no directories, got: {:?}",
        projection.nodes
    );
    assert!(projection.edges.is_empty());
}

#[test]
fn rename_rewrites_identities_in_place() {
    let store = Store::open_in_memory().unwrap();
    ingest(&store, "src/a.ts", &class_with_methods("src/a.ts"));

    store.rename_file("src/a.ts", "lib/a.ts").unwrap();
    let projection = store.projection().unwrap();

    assert!(projection.nodes.iter().any(|n| n.id == "lib/a.ts"));
    assert!(projection
        .nodes
        .iter()
        .any(|n| n.id == "lib/a.ts#Class:Widget@1"));
    assert!(projection.nodes.iter().all(|n| !n.id.contains("src/a.ts")));

    // Containment points at the new parent, old chain is pruned.
    assert!(projection
        .edges
        .iter()
        .any(|e| e.kind == "CONTAINS" && e.source == "lib" && e.target == "lib/a.ts"));
    assert!(projection.nodes.iter().all(|n| n.id != "src"));
}

#[test]
fn search_ranks_exact_above_prefix_above_substring() {
    let store = Store::open_in_memory().unwrap();
    let path = "src/a.ts";
    let exact = Entity::new(EntityKind::Function, "render", path, 1, 2);
    let prefix = Entity::new(EntityKind::Function, "renderAll", path, 3, 4);
    let substring = Entity::new(EntityKind::Function, "preRender", path, 5, 6);
    let extraction = Extraction {
        relationships: vec![],
        entities: vec![exact, prefix, substring],
    };
    ingest(&store, path, &extraction);

    let hits = store.search("render", None, 10).unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].name, "render");
    assert_eq!(hits[1].name, "renderAll");
    assert_eq!(hits[2].name, "preRender");

    let only_classes = store
        .search("render", Some(&["Class".to_string()]), 10)
        .unwrap();
    assert!(only_classes.is_empty());
}

#[test]
fn rename_with_like_metacharacters_leaves_siblings_alone() {
    let store = Store::open_in_memory().unwrap();
    ingest(&store, "src/a_b.ts", &class_with_methods("src/a_b.ts"));
    ingest(&store, "src/axb.ts", &class_with_methods("src/axb.ts"));

    store.rename_file("src/a_b.ts", "src/c.ts").unwrap();
    let projection = store.projection().unwrap();

    assert!(projection
        .nodes
        .iter()
        .any(|n| n.id == "src/c.ts#Class:Widget@1"));
    // The `_` in the old path must not glob the sibling's edges.
    assert!(projection
        .edges
        .iter()
        .any(|e| e.source == "src/axb.ts#Class:Widget@1"));
    assert!(projection.edges.iter().any(|e| e.source == "src/axb.ts"));
    assert!(projection
        .edges
        .iter()
        .all(|e| !e.source.starts_with("src/a_b.ts") && !e.target.starts_with("src/a_b.ts")));
}

#[test]
fn default_search_skips_file_and_directory_nodes() {
    let store = Store::open_in_memory().unwrap();
    let path = "render/render.ts";
    let func = Entity::new(EntityKind::Function, "render", path, 1, 2);
    let extraction = Extraction {
        relationships: vec![Relationship::new(
            path,
            func.identity(),
            RelationshipKind::Declares,
        )],
        entities: vec![func],
    };
    ingest(&store, path, &extraction);

    // The file and directory names both contain the term; only the
    // function comes back without an explicit label filter.
    let hits = store.search("render", None, 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].kind, "Function");

    let files = store
        .search("render", Some(&["File".to_string()]), 10)
        .unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].kind, "File");
}

#[test]
fn duplicate_file_paths_merge() {
    let store = Store::open_in_memory().unwrap();
    let extraction = class_with_methods("src/a.ts");
    ingest(&store, "src/a.ts", &extraction);
    ingest(&store, "src/a.ts", &extraction);

    let projection = store.projection().unwrap();
    let files: Vec<_> = projection
        .nodes
        .iter()
        .filter(|n| n.label == "File")
        .collect();
    assert_eq!(files.len(), 1);
}

#[test]
fn persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("atlas.db");
    {
        let store = Store::open(&db).unwrap();
        ingest(&store, "src/a.ts", &class_with_methods("src/a.ts"));
        store.commit_fingerprint("src/a.ts", "h1", 10, 100).unwrap();
    }
    let store = Store::open(&db).unwrap();
    assert_eq!(store.file_count().unwrap(), 1);
    assert_eq!(store.fingerprint("src/a.ts").unwrap().unwrap().hash, "h1");
}
