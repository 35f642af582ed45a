//! Request handler for daemon IPC.

use async_trait::async_trait;
use codeatlas_core::IndexEvent;
use codeatlas_indexer::{IndexerError, Pipeline};
use codeatlas_ipc::{ErrorCode, Request, RequestHandler, Response, ResponseData};
use codeatlas_store::Store;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

/// Handles incoming IPC requests
pub struct DaemonHandler {
    pipeline: Arc<Pipeline>,
    store: Arc<Store>,
    shutdown_tx: broadcast::Sender<()>,
    start_time: Instant,
}

impl DaemonHandler {
    /// Create a new handler
    pub fn new(
        pipeline: Arc<Pipeline>,
        store: Arc<Store>,
        shutdown_tx: broadcast::Sender<()>,
        start_time: Instant,
    ) -> Self {
        Self {
            pipeline,
            store,
            shutdown_tx,
            start_time,
        }
    }

    /// Get uptime in seconds
    fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// The root a request applies to: explicit path, else the current one.
    fn resolve_root(&self, path: Option<PathBuf>) -> Result<PathBuf, Response> {
        path.or_else(|| self.pipeline.current_root()).ok_or_else(|| {
            Response::error(ErrorCode::NoRoot, "No directory has been indexed yet")
        })
    }

    async fn read_file_content(&self, rel_path: &str) -> Response {
        let Some(root) = self.pipeline.current_root() else {
            return Response::error(ErrorCode::NoRoot, "No directory has been indexed yet");
        };

        let full = root.join(rel_path);
        // Reject traversal outside the indexed root.
        let resolved = match full.canonicalize() {
            Ok(p) if p.starts_with(&root) => p,
            _ => {
                return Response::error(
                    ErrorCode::NotFound,
                    format!("File not found: {rel_path}"),
                )
            }
        };

        match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => Response::ok_with(ResponseData::FileContent {
                path: rel_path.to_string(),
                content,
            }),
            Err(e) => {
                tracing::warn!(path = rel_path, error = %e, "Failed to read file");
                Response::error(ErrorCode::NotFound, format!("File not found: {rel_path}"))
            }
        }
    }
}

fn indexer_error_response(e: IndexerError) -> Response {
    let code = match &e {
        IndexerError::NotFound(_) => ErrorCode::NotFound,
        IndexerError::Cancelled => ErrorCode::ShuttingDown,
        _ => ErrorCode::InternalError,
    };
    Response::error(code, e.to_string())
}

#[async_trait]
impl RequestHandler for DaemonHandler {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::ok_with(ResponseData::Pong {
                timestamp: chrono::Utc::now().timestamp(),
            }),

            Request::Status => {
                let files = self.store.file_count().unwrap_or(0);
                let (nodes, edges) = self.store.graph_counts().unwrap_or((0, 0));

                Response::ok_with(ResponseData::Status {
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    uptime_secs: self.uptime_secs(),
                    root: self.pipeline.current_root(),
                    watching: self.pipeline.is_watching(),
                    files,
                    nodes,
                    edges,
                })
            }

            Request::IndexDirectory { path } => {
                match self.pipeline.index_directory(&path).await {
                    Ok(summary) => Response::ok_with(ResponseData::Summary { summary }),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Index failed");
                        indexer_error_response(e)
                    }
                }
            }

            Request::RefreshDirectory { path } => {
                let root = match self.resolve_root(path) {
                    Ok(root) => root,
                    Err(response) => return response,
                };
                match self.pipeline.refresh_directory(&root).await {
                    Ok(summary) => Response::ok_with(ResponseData::Summary { summary }),
                    Err(e) => {
                        tracing::warn!(path = %root.display(), error = %e, "Refresh failed");
                        indexer_error_response(e)
                    }
                }
            }

            Request::StartWatching { path } => {
                let root = match self.resolve_root(path) {
                    Ok(root) => root,
                    Err(response) => return response,
                };
                match self.pipeline.start_watching(&root).await {
                    Ok(()) => Response::ack(),
                    Err(e) => {
                        tracing::warn!(path = %root.display(), error = %e, "Watch failed");
                        indexer_error_response(e)
                    }
                }
            }

            Request::StopWatching => {
                self.pipeline.stop_watching();
                Response::ack()
            }

            Request::ReadFileContent { path } => self.read_file_content(&path).await,

            Request::GetGraph { path } => {
                // The daemon serves one root; an explicit path must name it.
                if let Some(path) = path {
                    if path.canonicalize().ok() != self.pipeline.current_root() {
                        return Response::error(
                            ErrorCode::NotFound,
                            format!("Not the indexed root: {}", path.display()),
                        );
                    }
                }
                match self.store.projection() {
                    Ok(graph) => Response::ok_with(ResponseData::Graph { graph }),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to load graph projection");
                        Response::error(ErrorCode::InternalError, e.to_string())
                    }
                }
            }

            Request::Search { term, labels, limit } => {
                match self.store.search(&term, labels.as_deref(), limit) {
                    Ok(hits) => Response::ok_with(ResponseData::SearchResults { hits }),
                    Err(e) => {
                        tracing::warn!(term, error = %e, "Search failed");
                        Response::error(ErrorCode::InternalError, e.to_string())
                    }
                }
            }

            // Intercepted by the server; reaching here means the transport
            // does not support streaming.
            Request::Subscribe => Response::ack(),

            Request::Shutdown => {
                tracing::info!("Shutdown requested");
                let _ = self.shutdown_tx.send(());
                Response::ack()
            }
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<IndexEvent>> {
        Some(self.pipeline.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeatlas_indexer::PipelineOptions;
    use tempfile::tempdir;

    fn test_handler() -> DaemonHandler {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let pipeline = Pipeline::new(store.clone(), PipelineOptions::default());
        let (shutdown_tx, _) = broadcast::channel(1);
        DaemonHandler::new(pipeline, store, shutdown_tx, Instant::now())
    }

    fn extract_summary(response: Response) -> codeatlas_core::RunSummary {
        if let Response::Ok {
            data: Some(ResponseData::Summary { summary }),
        } = response
        {
            summary
        } else {
            panic!("Expected Summary response, got {:?}", response);
        }
    }

    #[tokio::test]
    async fn test_ping() {
        let handler = test_handler();
        let response = handler.handle(Request::Ping).await;

        assert!(matches!(
            response,
            Response::Ok {
                data: Some(ResponseData::Pong { .. })
            }
        ));
    }

    #[tokio::test]
    async fn test_status_before_indexing() {
        let handler = test_handler();
        let response = handler.handle(Request::Status).await;

        if let Response::Ok {
            data:
                Some(ResponseData::Status {
                    version,
                    root,
                    watching,
                    files,
                    ..
                }),
        } = response
        {
            assert_eq!(version, env!("CARGO_PKG_VERSION"));
            assert!(root.is_none());
            assert!(!watching);
            assert_eq!(files, 0);
        } else {
            panic!("Expected Status response");
        }
    }

    #[tokio::test]
    async fn test_refresh_without_root() {
        let handler = test_handler();
        let response = handler.handle(Request::RefreshDirectory { path: None }).await;

        assert!(matches!(
            response,
            Response::Error {
                code: ErrorCode::NoRoot,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_index_search_and_read_roundtrip() {
        let handler = test_handler();
        let project = tempdir().unwrap();
        std::fs::write(
            project.path().join("a.ts"),
            "class Foo {\n  bar() {}\n}\nfunction baz() {}\n",
        )
        .unwrap();

        let summary = extract_summary(
            handler
                .handle(Request::IndexDirectory {
                    path: project.path().to_path_buf(),
                })
                .await,
        );
        assert_eq!(summary.files_indexed, 1);

        let response = handler
            .handle(Request::Search {
                term: "baz".to_string(),
                labels: None,
                limit: 10,
            })
            .await;
        if let Response::Ok {
            data: Some(ResponseData::SearchResults { hits }),
        } = response
        {
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].name, "baz");
        } else {
            panic!("Expected SearchResults response");
        }

        let response = handler
            .handle(Request::ReadFileContent {
                path: "a.ts".to_string(),
            })
            .await;
        if let Response::Ok {
            data: Some(ResponseData::FileContent { content, .. }),
        } = response
        {
            assert!(content.contains("class Foo"));
        } else {
            panic!("Expected FileContent response");
        }
    }

    #[tokio::test]
    async fn test_read_file_rejects_escape() {
        let handler = test_handler();
        let project = tempdir().unwrap();
        std::fs::write(project.path().join("a.ts"), "function a() {}\n").unwrap();
        handler
            .handle(Request::IndexDirectory {
                path: project.path().to_path_buf(),
            })
            .await;

        let response = handler
            .handle(Request::ReadFileContent {
                path: "../../../etc/hostname".to_string(),
            })
            .await;
        assert!(matches!(
            response,
            Response::Error {
                code: ErrorCode::NotFound,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_get_graph() {
        let handler = test_handler();
        let project = tempdir().unwrap();
        std::fs::write(project.path().join("a.py"), "def alpha():\n    pass\n").unwrap();
        handler
            .handle(Request::IndexDirectory {
                path: project.path().to_path_buf(),
            })
            .await;

        let response = handler.handle(Request::GetGraph { path: None }).await;
        if let Response::Ok {
            data: Some(ResponseData::Graph { graph }),
        } = response
        {
            assert!(graph.nodes.iter().any(|n| n.name == "alpha"));
        } else {
            panic!("Expected Graph response");
        }

        // An explicit path works when it names the indexed root.
        let response = handler
            .handle(Request::GetGraph {
                path: Some(project.path().to_path_buf()),
            })
            .await;
        assert!(matches!(
            response,
            Response::Ok {
                data: Some(ResponseData::Graph { .. })
            }
        ));
    }

    #[tokio::test]
    async fn test_get_graph_rejects_foreign_root() {
        let handler = test_handler();
        let project = tempdir().unwrap();
        std::fs::write(project.path().join("a.py"), "def alpha():\n    pass\n").unwrap();
        handler
            .handle(Request::IndexDirectory {
                path: project.path().to_path_buf(),
            })
            .await;

        let other = tempdir().unwrap();
        let response = handler
            .handle(Request::GetGraph {
                path: Some(other.path().to_path_buf()),
            })
            .await;
        assert!(matches!(
            response,
            Response::Error {
                code: ErrorCode::NotFound,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_shutdown_signals() {
        let handler = test_handler();
        let mut rx = handler.shutdown_tx.subscribe();

        let response = handler.handle(Request::Shutdown).await;
        assert!(matches!(response, Response::Ack));
        assert!(rx.try_recv().is_ok());
    }
}
