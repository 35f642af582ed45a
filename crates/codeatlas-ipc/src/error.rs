//! IPC error types

use thiserror::Error;

/// Errors that can occur during IPC operations
#[derive(Debug, Error)]
pub enum IpcError {
    /// Daemon not running
    #[error("Daemon not running (socket not found)")]
    DaemonNotRunning,

    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// IO error during socket operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request size exceeded the frame limit
    #[error("Request too large: {size} bytes (max 1MB)")]
    RequestTooLarge { size: usize },

    /// Failed to serialize a frame
    #[error("Serialization failed: {0}")]
    Serialize(#[from] rmp_serde::encode::Error),

    /// Failed to deserialize a frame
    #[error("Deserialization failed: {0}")]
    Deserialize(#[from] rmp_serde::decode::Error),

    /// Reading the request timed out
    #[error("Request timed out")]
    Timeout(#[from] tokio::time::error::Elapsed),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: IpcError = io_err.into();
        let msg = format!("{}", err);
        assert!(msg.contains("IO error"));
        assert!(msg.contains("file not found"));
    }

    #[test]
    fn test_error_display_request_too_large() {
        let err = IpcError::RequestTooLarge { size: 2 * 1024 * 1024 };
        let msg = format!("{}", err);
        assert!(msg.contains("too large"));
        assert!(msg.contains("2097152"));
    }

    #[test]
    fn test_error_display_daemon_not_running() {
        let err = IpcError::DaemonNotRunning;
        let msg = format!("{}", err);
        assert!(msg.contains("Daemon not running"));
        assert!(msg.contains("socket"));
    }
}
