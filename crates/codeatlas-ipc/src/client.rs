//! IPC client for communicating with the CodeAtlas daemon.

use crate::{EventFrame, IpcError, Request, Response};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// Default socket path
const DEFAULT_SOCKET_PATH: &str = "/tmp/codeatlas.sock";

/// Connection timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Request/response timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// IPC client for communicating with the daemon
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    /// Create a client with default socket path
    pub fn new() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }

    /// Create a client with custom socket path
    pub fn with_socket_path<P: AsRef<Path>>(socket_path: P) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    async fn do_connect(&self) -> Result<UnixStream, IpcError> {
        if !self.socket_path.exists() {
            return Err(IpcError::DaemonNotRunning);
        }

        let stream = tokio::time::timeout(CONNECT_TIMEOUT, UnixStream::connect(&self.socket_path))
            .await
            .map_err(|_| IpcError::ConnectionFailed("Connection timed out".to_string()))??;

        Ok(stream)
    }

    /// Send a request and wait for its response (opens a new connection)
    pub async fn request(&self, request: Request) -> Result<Response, IpcError> {
        let mut stream = self.do_connect().await?;
        tokio::time::timeout(REQUEST_TIMEOUT, async {
            write_frame(&mut stream, &request).await?;
            let body = read_body(&mut stream).await?;
            Ok(rmp_serde::from_slice(&body)?)
        })
        .await
        .map_err(|_| IpcError::ConnectionFailed("Request timed out".to_string()))?
    }

    /// Open a long-lived event subscription
    pub async fn subscribe(&self) -> Result<Subscription, IpcError> {
        let mut stream = self.do_connect().await?;
        write_frame(&mut stream, &Request::Subscribe).await?;

        let body = read_body(&mut stream).await?;
        let response: Response = rmp_serde::from_slice(&body)?;
        match response {
            Response::Ack => Ok(Subscription { stream }),
            Response::Error { message, .. } => Err(IpcError::ConnectionFailed(message)),
            _ => Err(IpcError::ConnectionFailed(
                "Unexpected subscribe response".to_string(),
            )),
        }
    }

    /// Check if daemon is running
    pub fn is_daemon_running(&self) -> bool {
        self.socket_path.exists()
    }
}

impl Default for IpcClient {
    fn default() -> Self {
        Self::new()
    }
}

/// A long-lived connection receiving indexing event frames.
pub struct Subscription {
    stream: UnixStream,
}

impl Subscription {
    /// Receive the next event frame. `None` when the daemon closes the
    /// stream.
    pub async fn next_event(&mut self) -> Result<Option<EventFrame>, IpcError> {
        let mut len_buf = [0u8; 4];
        match self.stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes(len_buf) as usize;

        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf).await?;
        Ok(Some(rmp_serde::from_slice(&buf)?))
    }
}

async fn write_frame(stream: &mut UnixStream, request: &Request) -> Result<(), IpcError> {
    let bytes = rmp_serde::to_vec(request)?;
    let len_bytes = (bytes.len() as u32).to_le_bytes();

    stream.write_all(&len_bytes).await?;
    stream.write_all(&bytes).await?;
    stream.flush().await?;
    Ok(())
}

async fn read_body(stream: &mut UnixStream) -> Result<Vec<u8>, IpcError> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}
