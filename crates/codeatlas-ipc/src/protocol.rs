//! IPC protocol definitions for CodeAtlas daemon communication.
//!
//! Uses MessagePack for efficient serialization over Unix sockets, with
//! JSON accepted on the wire as a debugging fallback.

use codeatlas_core::{GraphProjection, IndexEvent, RunSummary, SearchHit};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Request from client (CLI/editor integration) to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    /// Index a directory from scratch
    IndexDirectory { path: PathBuf },

    /// Incrementally re-index; defaults to the current root
    RefreshDirectory {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
    },

    /// Start watching; defaults to the current root
    StartWatching {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
    },

    /// Stop watching
    StopWatching,

    /// Read a file's content relative to the current root
    ReadFileContent { path: String },

    /// Full graph projection for visualization; an explicit path must
    /// name the indexed root
    GetGraph {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
    },

    /// Search entities by name
    Search {
        term: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        labels: Option<Vec<String>>,
        #[serde(default = "default_search_limit")]
        limit: usize,
    },

    /// Stream indexing events until the connection closes
    Subscribe,

    /// Get daemon status
    Status,

    /// Ping for health check
    Ping,

    /// Graceful shutdown
    Shutdown,
}

/// Response from daemon to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    /// Success with optional data
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<ResponseData>,
    },

    /// Acknowledgment for fire-and-forget requests
    Ack,

    /// Error response
    Error { code: ErrorCode, message: String },
}

impl Response {
    /// Create a success response with no data
    pub fn ok() -> Self {
        Response::Ok { data: None }
    }

    /// Create a success response with data
    pub fn ok_with(data: ResponseData) -> Self {
        Response::Ok { data: Some(data) }
    }

    /// Create an acknowledgment response
    pub fn ack() -> Self {
        Response::Ack
    }

    /// Create an error response
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Response::Error {
            code,
            message: message.into(),
        }
    }
}

/// Response data variants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseData {
    /// Outcome of an indexing run
    Summary { summary: RunSummary },

    /// File content result
    FileContent { path: String, content: String },

    /// Full graph projection
    Graph { graph: GraphProjection },

    /// Ranked search results
    SearchResults { hits: Vec<SearchHit> },

    /// Daemon status
    Status {
        version: String,
        uptime_secs: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        root: Option<PathBuf>,
        watching: bool,
        files: usize,
        nodes: usize,
        edges: usize,
    },

    /// Pong response
    Pong { timestamp: i64 },
}

/// A frame pushed to a subscribed client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: IndexEvent,
}

/// Error codes for error responses
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// No directory has been indexed yet
    NoRoot,
    /// Requested path does not exist or is outside the root
    NotFound,
    /// Request format is invalid
    InvalidRequest,
    /// Internal daemon error
    InternalError,
    /// Operation timed out
    Timeout,
    /// Daemon is shutting down
    ShuttingDown,
}

fn default_search_limit() -> usize {
    25
}
