//! Maps one file's extraction output to node and edge records.
//!
//! Records are keyed by stable identity so the ingestor can diff them
//! against the rows currently in the database.

use crate::graph::{EdgeRecord, NodeRecord};
use codeatlas_core::{Entity, SourceFile};
use std::collections::HashMap;

/// Convert a file and its extraction into graph records.
///
/// The file itself becomes a `File` node whose id is its root-relative
/// path. Entities become nodes keyed by their derived identity; duplicate
/// identities collapse into one record. Every record carries the owning
/// file path so ingest and deletion stay scoped to one file.
pub fn map_extraction(
    file: &SourceFile,
    extraction: &codeatlas_core::Extraction,
) -> (Vec<NodeRecord>, Vec<EdgeRecord>) {
    let mut nodes: Vec<NodeRecord> = Vec::with_capacity(extraction.entities.len() + 1);
    let mut seen: HashMap<String, usize> = HashMap::new();

    nodes.push(file_node(file));
    seen.insert(file.path.clone(), 0);

    for entity in &extraction.entities {
        let id = entity.identity();
        if seen.contains_key(&id) {
            continue;
        }
        seen.insert(id.clone(), nodes.len());
        nodes.push(entity_node(id, entity, &file.path));
    }

    let mut edges: Vec<EdgeRecord> = Vec::with_capacity(extraction.relationships.len());
    let mut edge_seen = std::collections::HashSet::new();
    for rel in &extraction.relationships {
        let record = EdgeRecord {
            source: rel.from.clone(),
            target: rel.to.clone(),
            rel: rel.kind.as_str().to_string(),
            file_path: Some(file.path.clone()),
        };
        if edge_seen.insert((record.source.clone(), record.rel.clone(), record.target.clone())) {
            edges.push(record);
        }
    }

    (nodes, edges)
}

fn file_node(file: &SourceFile) -> NodeRecord {
    let name = file
        .path
        .rsplit('/')
        .next()
        .unwrap_or(file.path.as_str())
        .to_string();
    let mut props = serde_json::Map::new();
    props.insert(
        "fingerprint".into(),
        serde_json::Value::String(file.fingerprint.clone()),
    );
    props.insert("last_indexed_at".into(), file.last_indexed_at.into());
    NodeRecord {
        id: file.path.clone(),
        label: "File".to_string(),
        name,
        path: Some(file.path.clone()),
        file_path: None,
        start_line: None,
        end_line: None,
        language: Some(file.language.clone()),
        properties: serde_json::Value::Object(props).to_string(),
    }
}

fn entity_node(id: String, entity: &Entity, file_path: &str) -> NodeRecord {
    // Fixed insertion order keeps the serialized JSON deterministic, so
    // identical extractions diff as identical rows.
    let mut props = serde_json::Map::new();
    if let Some(sig) = &entity.signature {
        props.insert("signature".into(), serde_json::Value::String(sig.clone()));
    }
    if entity.is_async {
        props.insert("is_async".into(), serde_json::Value::Bool(true));
    }
    if let Some(t) = &entity.type_name {
        props.insert("type".into(), serde_json::Value::String(t.clone()));
    }
    if let Some(i) = entity.index {
        props.insert("index".into(), (i as u64).into());
    }
    if let Some(c) = &entity.called_name {
        props.insert("called_name".into(), serde_json::Value::String(c.clone()));
    }
    NodeRecord {
        id,
        label: entity.kind.label().to_string(),
        name: entity.name.clone(),
        path: None,
        file_path: Some(file_path.to_string()),
        start_line: Some(entity.start_line as i64),
        end_line: Some(entity.end_line as i64),
        language: None,
        properties: serde_json::Value::Object(props).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeatlas_core::{EntityKind, Extraction, Relationship, RelationshipKind};

    fn sample_file() -> SourceFile {
        SourceFile {
            path: "src/a.ts".to_string(),
            language: "typescript".to_string(),
            fingerprint: "abc123".to_string(),
            last_indexed_at: 1_700_000_000,
        }
    }

    #[test]
    fn file_node_comes_first() {
        let (nodes, _) = map_extraction(&sample_file(), &Extraction::default());
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].label, "File");
        assert_eq!(nodes[0].id, "src/a.ts");
        assert_eq!(nodes[0].name, "a.ts");
        assert_eq!(nodes[0].language.as_deref(), Some("typescript"));
    }

    #[test]
    fn duplicate_identities_collapse() {
        let entity = Entity::new(EntityKind::Function, "foo", "src/a.ts", 1, 3);
        let extraction = Extraction {
            entities: vec![entity.clone(), entity],
            relationships: vec![],
        };
        let (nodes, _) = map_extraction(&sample_file(), &extraction);
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn duplicate_edges_collapse() {
        let rel = Relationship::new("src/a.ts", "x", RelationshipKind::Declares);
        let extraction = Extraction {
            entities: vec![],
            relationships: vec![rel.clone(), rel],
        };
        let (_, edges) = map_extraction(&sample_file(), &extraction);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].rel, "DECLARES");
        assert_eq!(edges[0].file_path.as_deref(), Some("src/a.ts"));
    }

    #[test]
    fn identical_extractions_map_identically() {
        let mut entity = Entity::new(EntityKind::Method, "run", "src/a.ts", 2, 9);
        entity.is_async = true;
        entity.signature = Some("run(x: number)".to_string());
        let extraction = Extraction {
            entities: vec![entity],
            relationships: vec![],
        };
        let (a, _) = map_extraction(&sample_file(), &extraction);
        let (b, _) = map_extraction(&sample_file(), &extraction);
        assert_eq!(a, b);
    }
}
