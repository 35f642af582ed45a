//! Unix socket IPC server for the CodeAtlas daemon.
//!
//! Handles incoming connections and dispatches requests to handlers.
//! Subscribe connections stay open and receive a stream of event frames.

use crate::{EventFrame, IpcError, Request, Response};
use async_trait::async_trait;
use codeatlas_core::IndexEvent;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

/// Maximum request size (1MB)
const MAX_REQUEST_SIZE: usize = 1024 * 1024;

/// Request timeout for reading from socket
const REQUEST_TIMEOUT: Duration = Duration::from_millis(100);

/// Unix socket IPC server
pub struct IpcServer {
    listener: UnixListener,
    handler: Arc<dyn RequestHandler>,
}

impl IpcServer {
    /// Create a new IPC server bound to the given socket path
    pub async fn new<P: AsRef<Path>>(
        socket_path: P,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<Self, IpcError> {
        let socket_path = socket_path.as_ref();

        // Remove stale socket file if it exists
        if socket_path.exists() {
            let _ = std::fs::remove_file(socket_path);
        }

        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(socket_path)?;

        // Set socket permissions (user only - 0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::info!("IPC server listening on {}", socket_path.display());

        Ok(Self { listener, handler })
    }

    /// Run the server, accepting connections until shutdown
    pub async fn run(&self) -> Result<(), IpcError> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    let handler = self.handler.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, handler).await {
                            tracing::debug!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                }
            }
        }
    }

    /// Handle a single connection
    async fn handle_connection(
        mut stream: UnixStream,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), IpcError> {
        // Read request with timeout to avoid blocking
        let request = tokio::time::timeout(REQUEST_TIMEOUT, Self::read_request(&mut stream))
            .await
            .map_err(IpcError::Timeout)?;

        let request = match request {
            Ok(req) => req,
            Err(e) => {
                // Send error response
                let response = Response::error(
                    crate::ErrorCode::InvalidRequest,
                    format!("Failed to parse request: {}", e),
                );
                Self::write_frame(&mut stream, &response).await?;
                return Err(e);
            }
        };

        tracing::debug!("Received request: {:?}", request);

        if matches!(request, Request::Subscribe) {
            return Self::stream_events(stream, handler).await;
        }

        let response = handler.handle(request).await;
        Self::write_frame(&mut stream, &response).await?;

        Ok(())
    }

    /// Push event frames to a subscribed client until it disconnects.
    async fn stream_events(
        mut stream: UnixStream,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), IpcError> {
        let Some(mut events) = handler.subscribe() else {
            let response = Response::error(
                crate::ErrorCode::InvalidRequest,
                "Subscriptions are not supported",
            );
            return Self::write_frame(&mut stream, &response).await;
        };

        Self::write_frame(&mut stream, &Response::ack()).await?;

        loop {
            match events.recv().await {
                Ok(event) => {
                    if Self::write_frame(&mut stream, &EventFrame { event })
                        .await
                        .is_err()
                    {
                        // Client went away.
                        return Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    let event = IndexEvent::Warning {
                        kind: "event_stream_lagged".to_string(),
                        message: format!("Dropped {missed} events"),
                    };
                    if Self::write_frame(&mut stream, &EventFrame { event })
                        .await
                        .is_err()
                    {
                        return Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            }
        }
    }

    /// Read a request from the stream
    async fn read_request(stream: &mut UnixStream) -> Result<Request, IpcError> {
        // Read length prefix (4 bytes, little-endian)
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await?;
        let len = u32::from_le_bytes(len_buf) as usize;

        if len > MAX_REQUEST_SIZE {
            return Err(IpcError::RequestTooLarge { size: len });
        }

        // Read request body
        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await?;

        // Try MessagePack first, fall back to JSON for easier debugging
        if let Ok(request) = rmp_serde::from_slice(&buf) {
            return Ok(request);
        }

        // Try JSON as fallback (useful for testing with nc/socat)
        if let Ok(request) = serde_json::from_slice(&buf) {
            return Ok(request);
        }

        Err(IpcError::Deserialize(
            rmp_serde::from_slice::<Request>(&buf).unwrap_err(),
        ))
    }

    /// Write a length-prefixed MessagePack frame to the stream
    async fn write_frame<T: Serialize>(
        stream: &mut UnixStream,
        frame: &T,
    ) -> Result<(), IpcError> {
        let bytes = rmp_serde::to_vec(frame)?;
        let len_bytes = (bytes.len() as u32).to_le_bytes();

        stream.write_all(&len_bytes).await?;
        stream.write_all(&bytes).await?;
        stream.flush().await?;

        Ok(())
    }
}

/// Trait for handling incoming requests
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handle a request and return a response
    async fn handle(&self, request: Request) -> Response;

    /// Event stream handed to Subscribe connections. `None` rejects
    /// subscriptions.
    fn subscribe(&self) -> Option<broadcast::Receiver<IndexEvent>> {
        None
    }
}
