//! Core components shared across the CodeAtlas workspace.
//!
//! Holds the graph data model (entities, relationships, stable identities)
//! and the daemon configuration. Everything here is plain data; behavior
//! lives in the store and indexer crates.

mod config;
mod model;

pub use config::DaemonConfig;
pub use model::{
    Entity, EntityKind, Extraction, GraphEdge, GraphNode, GraphProjection, IndexEvent,
    IngestSummary, Relationship, RelationshipKind, RunSummary, SearchHit, SourceFile,
};
