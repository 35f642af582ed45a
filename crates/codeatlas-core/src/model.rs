//! Graph data model: entities, relationships, and stable identities.
//!
//! An entity's identity is derived from its content position
//! (`file_path + kind + name + start_line`), so re-parsing byte-identical
//! source always reproduces the same identity. This is what makes graph
//! ingestion idempotent.

use serde::{Deserialize, Serialize};

/// Kind of a declared code construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Class,
    Struct,
    Enum,
    Interface,
    Trait,
    Function,
    Method,
    Variable,
    Parameter,
    CallSite,
    Import,
}

impl EntityKind {
    /// Graph node label for this kind. These strings are part of the
    /// persisted schema and must not change.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Class => "Class",
            EntityKind::Struct => "Struct",
            EntityKind::Enum => "Enum",
            EntityKind::Interface => "Interface",
            EntityKind::Trait => "Trait",
            EntityKind::Function => "Function",
            EntityKind::Method => "Method",
            EntityKind::Variable => "Variable",
            EntityKind::Parameter => "Parameter",
            EntityKind::CallSite => "CallSite",
            EntityKind::Import => "Import",
        }
    }

    /// Parse a node label back into a kind.
    pub fn from_label(label: &str) -> Option<Self> {
        Some(match label {
            "Class" => EntityKind::Class,
            "Struct" => EntityKind::Struct,
            "Enum" => EntityKind::Enum,
            "Interface" => EntityKind::Interface,
            "Trait" => EntityKind::Trait,
            "Function" => EntityKind::Function,
            "Method" => EntityKind::Method,
            "Variable" => EntityKind::Variable,
            "Parameter" => EntityKind::Parameter,
            "CallSite" => EntityKind::CallSite,
            "Import" => EntityKind::Import,
            _ => return None,
        })
    }

    /// Class-like kinds can contain methods and nested types.
    pub fn is_class_like(&self) -> bool {
        matches!(
            self,
            EntityKind::Class | EntityKind::Struct | EntityKind::Enum
                | EntityKind::Interface
                | EntityKind::Trait
        )
    }

    /// Function-like kinds can enclose call sites and nested functions.
    pub fn is_function_like(&self) -> bool {
        matches!(self, EntityKind::Function | EntityKind::Method)
    }

    /// Whether this kind can act as the nesting parent of `child`.
    pub fn can_contain(&self, child: EntityKind) -> bool {
        match self {
            k if k.is_class_like() => matches!(
                child,
                EntityKind::Function
                    | EntityKind::Method
                    | EntityKind::Class
                    | EntityKind::Struct
                    | EntityKind::Enum
                    | EntityKind::Variable
            ),
            k if k.is_function_like() => matches!(
                child,
                EntityKind::Function | EntityKind::Variable | EntityKind::Class
            ),
            _ => false,
        }
    }
}

/// Typed relationship between two graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipKind {
    Contains,
    Declares,
    HasParameter,
    Calls,
    HasCallSite,
    References,
    Imports,
    Extends,
    Implements,
    HasType,
}

impl RelationshipKind {
    /// Persisted relationship type string.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Contains => "CONTAINS",
            RelationshipKind::Declares => "DECLARES",
            RelationshipKind::HasParameter => "HAS_PARAMETER",
            RelationshipKind::Calls => "CALLS",
            RelationshipKind::HasCallSite => "HAS_CALL_SITE",
            RelationshipKind::References => "REFERENCES",
            RelationshipKind::Imports => "IMPORTS",
            RelationshipKind::Extends => "EXTENDS",
            RelationshipKind::Implements => "IMPLEMENTS",
            RelationshipKind::HasType => "HAS_TYPE",
        }
    }
}

/// A declared code construct extracted from one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub name: String,
    /// Root-relative path of the owning file.
    pub file_path: String,
    /// 1-indexed, inclusive.
    pub start_line: usize,
    pub end_line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default)]
    pub is_async: bool,
    /// Declared type, for variables and parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Positional index, for parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    /// Callee name, for call sites.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub called_name: Option<String>,
}

impl Entity {
    pub fn new(
        kind: EntityKind,
        name: impl Into<String>,
        file_path: impl Into<String>,
        start_line: usize,
        end_line: usize,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            file_path: file_path.into(),
            start_line,
            end_line,
            signature: None,
            is_async: false,
            type_name: None,
            index: None,
            called_name: None,
        }
    }

    /// Stable identity, reproducible across re-parses of identical content.
    ///
    /// Parameters additionally carry their position so same-named parameters
    /// of a one-line signature stay distinct.
    pub fn identity(&self) -> String {
        match self.index {
            Some(i) => format!(
                "{}#{}:{}@{}:{}",
                self.file_path,
                self.kind.label(),
                self.name,
                self.start_line,
                i
            ),
            None => format!(
                "{}#{}:{}@{}",
                self.file_path,
                self.kind.label(),
                self.name,
                self.start_line
            ),
        }
    }
}

/// Typed edge between two stable identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub from: String,
    pub to: String,
    pub kind: RelationshipKind,
}

impl Relationship {
    pub fn new(from: impl Into<String>, to: impl Into<String>, kind: RelationshipKind) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind,
        }
    }
}

/// Everything extracted from one file in a single parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

/// Durable metadata for an indexed source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Root-relative path; unique key of the file node.
    pub path: String,
    pub language: String,
    /// SHA-256 of the file bytes.
    pub fingerprint: String,
    /// Unix timestamp of the last successful ingest.
    pub last_indexed_at: i64,
}

/// Effective write counts for one per-file transaction.
///
/// Re-ingesting unchanged content must produce an all-zero summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub nodes_created: usize,
    pub nodes_updated: usize,
    pub nodes_deleted: usize,
    pub edges_created: usize,
    pub edges_deleted: usize,
}

impl IngestSummary {
    /// True when the transaction touched nothing.
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }

    pub fn merge(&mut self, other: &IngestSummary) {
        self.nodes_created += other.nodes_created;
        self.nodes_updated += other.nodes_updated;
        self.nodes_deleted += other.nodes_deleted;
        self.edges_created += other.edges_created;
        self.edges_deleted += other.edges_deleted;
    }
}

/// Outcome of a whole indexing run, reported in the completion event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub files_indexed: usize,
    pub files_unchanged: usize,
    pub files_deleted: usize,
    pub files_failed: usize,
    pub entities: usize,
}

/// A node in the read-only graph projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
}

/// An edge in the read-only graph projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub kind: String,
}

/// Read-only projection of the graph for visualization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphProjection {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Notification emitted by the indexing pipeline, streamed to subscribers.
///
/// Each occurrence is emitted at most once; consumers treat the stream as
/// an append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IndexEvent {
    Progress { message: String },
    Warning { kind: String, message: String },
    Fatal { kind: String, message: String },
    Complete { summary: RunSummary },
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub name: String,
    pub path: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
    pub score: f64,
}
