//! Graph ingest, deletion, rename, search, and projection on Store.
//!
//! Every mutation runs as one SQLite transaction per file. Ingest diffs the
//! incoming records against the current rows so re-ingesting unchanged
//! content performs zero effective writes.

use crate::{Store, StoreError};
use codeatlas_core::{GraphEdge, GraphNode, GraphProjection, IngestSummary, SearchHit};
use rusqlite::{params, OptionalExtension, Transaction};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Row-shaped graph node, keyed by stable identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: String,
    pub label: String,
    pub name: String,
    pub path: Option<String>,
    pub file_path: Option<String>,
    pub start_line: Option<i64>,
    pub end_line: Option<i64>,
    pub language: Option<String>,
    /// Canonical JSON of the remaining properties.
    pub properties: String,
}

/// Row-shaped graph edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeRecord {
    pub source: String,
    pub target: String,
    pub rel: String,
    /// Owning file for per-file diffing; directory edges carry none.
    pub file_path: Option<String>,
}

impl EdgeRecord {
    fn key(&self) -> (String, String, String) {
        (self.source.clone(), self.rel.clone(), self.target.clone())
    }
}

impl Store {
    /// Replace one file's subgraph with the given records, atomically.
    ///
    /// Diffs against current rows: stale nodes go away with every edge
    /// touching them, changed rows are updated, identical rows are left
    /// alone. Directory ancestors and their CONTAINS chain are upserted in
    /// the same transaction.
    pub fn replace_file(
        &self,
        file_path: &str,
        nodes: &[NodeRecord],
        edges: &[EdgeRecord],
    ) -> Result<IngestSummary, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut summary = IngestSummary::default();

        summary.merge(&ensure_directories(&tx, file_path)?);

        let current = current_nodes(&tx, file_path)?;
        let incoming: HashMap<&str, &NodeRecord> =
            nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        for id in current.keys() {
            if !incoming.contains_key(id.as_str()) {
                delete_node(&tx, id, &mut summary)?;
            }
        }

        for record in nodes {
            match current.get(&record.id) {
                Some(old) if old == record => {}
                Some(_) => {
                    tx.execute(
                        "UPDATE nodes SET label = ?2, name = ?3, path = ?4, file_path = ?5,
                                start_line = ?6, end_line = ?7, language = ?8, properties = ?9
                         WHERE id = ?1",
                        params![
                            record.id,
                            record.label,
                            record.name,
                            record.path,
                            record.file_path,
                            record.start_line,
                            record.end_line,
                            record.language,
                            record.properties,
                        ],
                    )?;
                    summary.nodes_updated += 1;
                }
                None => {
                    tx.execute(
                        "INSERT INTO nodes (id, label, name, path, file_path, start_line, end_line, language, properties)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        params![
                            record.id,
                            record.label,
                            record.name,
                            record.path,
                            record.file_path,
                            record.start_line,
                            record.end_line,
                            record.language,
                            record.properties,
                        ],
                    )?;
                    summary.nodes_created += 1;
                }
            }
        }

        let current_edges = current_edges(&tx, file_path)?;
        let incoming_edges: HashSet<(String, String, String)> =
            edges.iter().map(EdgeRecord::key).collect();

        for key in &current_edges {
            if !incoming_edges.contains(key) {
                tx.execute(
                    "DELETE FROM edges WHERE source = ?1 AND rel = ?2 AND target = ?3",
                    params![key.0, key.1, key.2],
                )?;
                summary.edges_deleted += 1;
            }
        }
        for record in edges {
            if !current_edges.contains(&record.key()) {
                let inserted = tx.execute(
                    "INSERT OR IGNORE INTO edges (source, target, rel, file_path) VALUES (?1, ?2, ?3, ?4)",
                    params![record.source, record.target, record.rel, record.file_path],
                )?;
                summary.edges_created += inserted;
            }
        }

        prune_empty_directories(&tx)?;
        tx.commit()?;

        debug!(
            file = file_path,
            created = summary.nodes_created,
            updated = summary.nodes_updated,
            deleted = summary.nodes_deleted,
            "file subgraph replaced"
        );
        Ok(summary)
    }

    /// Remove a file node, every entity it owns, and all edges touching
    /// them. Ancestor directories are pruned only when left childless.
    pub fn remove_file(&self, file_path: &str) -> Result<IngestSummary, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut summary = IngestSummary::default();

        let ids: Vec<String> = {
            let mut stmt =
                tx.prepare("SELECT id FROM nodes WHERE file_path = ?1 OR id = ?1")?;
            let rows = stmt.query_map(params![file_path], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };
        for id in &ids {
            delete_node(&tx, id, &mut summary)?;
        }
        summary.edges_deleted += tx.execute(
            "DELETE FROM edges WHERE file_path = ?1",
            params![file_path],
        )?;

        prune_empty_directories(&tx)?;
        tx.commit()?;
        Ok(summary)
    }

    /// Move a file to a new path in place.
    ///
    /// The file node keeps its row; entity identities and edge endpoints are
    /// rewritten to embed the new path, and the containment edge is
    /// retargeted to the new parent directory.
    pub fn rename_file(&self, old_path: &str, new_path: &str) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let exists: Option<String> = tx
            .query_row(
                "SELECT id FROM nodes WHERE id = ?1 AND label = 'File'",
                params![old_path],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::NotFound(format!("file node: {old_path}")));
        }

        let new_name = new_path.rsplit('/').next().unwrap_or(new_path);
        // `%`/`_` in the old path must not glob other files' identities.
        let id_prefix = format!("{}#%", escape_like(old_path));

        // Entity identities embed the owning path as a prefix.
        tx.execute(
            "UPDATE nodes SET id = ?2 || substr(id, length(?1) + 1), file_path = ?2
             WHERE file_path = ?1",
            params![old_path, new_path],
        )?;
        tx.execute(
            "UPDATE nodes SET id = ?2, path = ?2, name = ?3 WHERE id = ?1 AND label = 'File'",
            params![old_path, new_path, new_name],
        )?;
        tx.execute(
            "UPDATE edges SET source = ?2 || substr(source, length(?1) + 1)
             WHERE source = ?1 OR source LIKE ?3 ESCAPE '\\'",
            params![old_path, new_path, id_prefix],
        )?;
        tx.execute(
            "UPDATE edges SET target = ?2 || substr(target, length(?1) + 1)
             WHERE target = ?1 OR target LIKE ?3 ESCAPE '\\'",
            params![old_path, new_path, id_prefix],
        )?;
        tx.execute(
            "UPDATE edges SET file_path = ?2 WHERE file_path = ?1",
            params![old_path, new_path],
        )?;

        // Retarget containment to the new parent chain.
        tx.execute(
            "DELETE FROM edges WHERE rel = 'CONTAINS' AND target = ?1",
            params![new_path],
        )?;
        ensure_directories(&tx, new_path)?;
        prune_empty_directories(&tx)?;
        tx.commit()?;
        Ok(())
    }

    /// Search nodes by name, optionally restricted to a set of labels.
    ///
    /// Without an explicit label filter the search covers entities only;
    /// File and Directory nodes are skipped so a filename substring does
    /// not shadow same-named code. Exact matches rank above prefix
    /// matches, which rank above substring matches.
    pub fn search(
        &self,
        term: &str,
        labels: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let conn = self.conn();
        let mut sql = String::from(
            "SELECT name, label, path, file_path, start_line, end_line FROM nodes
             WHERE name LIKE '%' || ?1 || '%' ESCAPE '\\'",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(escape_like(term))];
        match labels {
            Some(labels) if !labels.is_empty() => {
                let placeholders: Vec<String> = (0..labels.len())
                    .map(|i| format!("?{}", i + 2))
                    .collect();
                sql.push_str(&format!(" AND label IN ({})", placeholders.join(", ")));
                for label in labels {
                    params_vec.push(Box::new(label.clone()));
                }
            }
            _ => sql.push_str(" AND label NOT IN ('File', 'Directory')"),
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(params_vec.iter().map(|p| p.as_ref())),
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                ))
            },
        )?;

        let needle = term.to_lowercase();
        let mut hits: Vec<SearchHit> = Vec::new();
        for row in rows {
            let (name, label, path, file_path, start_line, end_line) = row?;
            let lower = name.to_lowercase();
            let score = if lower == needle {
                1.0
            } else if lower.starts_with(&needle) {
                0.75
            } else {
                0.5
            };
            hits.push(SearchHit {
                name,
                path: path.or(file_path).unwrap_or_default(),
                kind: label,
                start_line: start_line.map(|v| v as usize),
                end_line: end_line.map(|v| v as usize),
                score,
            });
        }
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    /// Read-only projection of the whole graph for visualization.
    pub fn projection(&self) -> Result<GraphProjection, StoreError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, label, name, path, file_path, start_line, end_line FROM nodes ORDER BY id")?;
        let nodes = stmt
            .query_map([], |row| {
                Ok(GraphNode {
                    id: row.get(0)?,
                    label: row.get(1)?,
                    name: row.get(2)?,
                    path: row
                        .get::<_, Option<String>>(3)?
                        .or(row.get::<_, Option<String>>(4)?),
                    start_line: row.get::<_, Option<i64>>(5)?.map(|v| v as usize),
                    end_line: row.get::<_, Option<i64>>(6)?.map(|v| v as usize),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt =
            conn.prepare("SELECT source, target, rel FROM edges ORDER BY source, rel, target")?;
        let edges = stmt
            .query_map([], |row| {
                Ok(GraphEdge {
                    source: row.get(0)?,
                    target: row.get(1)?,
                    kind: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(GraphProjection { nodes, edges })
    }

    /// Count of indexed file nodes.
    pub fn file_count(&self) -> Result<usize, StoreError> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE label = 'File'",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Total node and edge counts.
    pub fn graph_counts(&self) -> Result<(usize, usize), StoreError> {
        let conn = self.conn();
        let nodes: i64 = conn.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        let edges: i64 = conn.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
        Ok((nodes as usize, edges as usize))
    }
}

fn current_nodes(
    tx: &Transaction<'_>,
    file_path: &str,
) -> Result<HashMap<String, NodeRecord>, StoreError> {
    let mut stmt = tx.prepare(
        "SELECT id, label, name, path, file_path, start_line, end_line, language, properties
         FROM nodes WHERE file_path = ?1 OR id = ?1",
    )?;
    let rows = stmt.query_map(params![file_path], |row| {
        Ok(NodeRecord {
            id: row.get(0)?,
            label: row.get(1)?,
            name: row.get(2)?,
            path: row.get(3)?,
            file_path: row.get(4)?,
            start_line: row.get(5)?,
            end_line: row.get(6)?,
            language: row.get(7)?,
            properties: row.get(8)?,
        })
    })?;
    let mut map = HashMap::new();
    for row in rows {
        let record = row?;
        map.insert(record.id.clone(), record);
    }
    Ok(map)
}

fn current_edges(
    tx: &Transaction<'_>,
    file_path: &str,
) -> Result<HashSet<(String, String, String)>, StoreError> {
    let mut stmt =
        tx.prepare("SELECT source, rel, target FROM edges WHERE file_path = ?1")?;
    let rows = stmt.query_map(params![file_path], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    })?;
    let mut set = HashSet::new();
    for row in rows {
        set.insert(row?);
    }
    Ok(set)
}

fn delete_node(
    tx: &Transaction<'_>,
    id: &str,
    summary: &mut IngestSummary,
) -> Result<(), StoreError> {
    summary.edges_deleted += tx.execute(
        "DELETE FROM edges WHERE source = ?1 OR target = ?1",
        params![id],
    )?;
    summary.nodes_deleted += tx.execute("DELETE FROM nodes WHERE id = ?1", params![id])?;
    Ok(())
}

/// Upsert the directory chain above a file and its CONTAINS edges,
/// reporting the effective writes. Inserts are OR IGNORE, so an
/// already-present chain writes nothing.
fn ensure_directories(
    tx: &Transaction<'_>,
    file_path: &str,
) -> Result<IngestSummary, StoreError> {
    let mut summary = IngestSummary::default();
    let components: Vec<&str> = file_path.split('/').collect();
    let mut parent: Option<String> = None;
    for i in 0..components.len().saturating_sub(1) {
        let dir = components[..=i].join("/");
        let created = tx.execute(
            "INSERT OR IGNORE INTO nodes (id, label, name, path, properties)
             VALUES (?1, 'Directory', ?2, ?1, '{}')",
            params![dir, components[i]],
        )?;
        summary.nodes_created += created;
        if let Some(parent) = &parent {
            summary.edges_created += tx.execute(
                "INSERT OR IGNORE INTO edges (source, target, rel) VALUES (?1, ?2, 'CONTAINS')",
                params![parent, dir],
            )?;
        }
        parent = Some(dir);
    }
    if let Some(parent) = &parent {
        summary.edges_created += tx.execute(
            "INSERT OR IGNORE INTO edges (source, target, rel) VALUES (?1, ?2, 'CONTAINS')",
            params![parent, file_path],
        )?;
    }
    Ok(summary)
}

/// Delete directory nodes left without any contained child, bottom-up.
fn prune_empty_directories(tx: &Transaction<'_>) -> Result<(), StoreError> {
    loop {
        // Drop containment edges whose target is gone, then childless dirs.
        tx.execute(
            "DELETE FROM edges WHERE rel = 'CONTAINS'
             AND target NOT IN (SELECT id FROM nodes)",
            [],
        )?;
        let removed = tx.execute(
            "DELETE FROM nodes WHERE label = 'Directory'
             AND id NOT IN (SELECT source FROM edges WHERE rel = 'CONTAINS')",
            [],
        )?;
        if removed == 0 {
            return Ok(());
        }
    }
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
