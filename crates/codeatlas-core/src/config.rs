//! Configuration for the CodeAtlas daemon.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Unix socket path for IPC
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Data directory for the graph database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// PID file path
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    /// Watcher debounce window in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Worker pool size; 0 means one per available core
    #[serde(default)]
    pub worker_threads: usize,

    /// Per-file parse time budget in milliseconds
    #[serde(default = "default_parse_timeout_ms")]
    pub parse_timeout_ms: u64,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/codeatlas.sock")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".codeatlas")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("/tmp/codeatlas.pid")
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_parse_timeout_ms() -> u64 {
    5_000
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            pid_file: default_pid_file(),
            debounce_ms: default_debounce_ms(),
            worker_threads: 0,
            parse_timeout_ms: default_parse_timeout_ms(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from file, falling back to defaults
    pub fn load() -> Self {
        let config_path = default_data_dir().join("config.yaml");

        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_yaml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config file: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config file: {}", e);
                }
            }
        }

        Self::default()
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Path of the SQLite database holding the graph and fingerprints
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("atlas.db")
    }

    /// Effective worker pool size
    pub fn effective_workers(&self) -> usize {
        if self.worker_threads > 0 {
            self.worker_threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    /// Ensure data directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/codeatlas.sock"));
        assert_eq!(config.debounce_ms, 300);
        assert_eq!(config.parse_timeout_ms, 5_000);
        assert!(config.effective_workers() >= 1);
    }

    #[test]
    fn test_config_serialization() {
        let config = DaemonConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: DaemonConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.socket_path, parsed.socket_path);
    }

    #[test]
    fn test_load_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "log_level: debug\ndebounce_ms: 50\n").unwrap();
        let config = DaemonConfig::load_from(&path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.debounce_ms, 50);
        // unspecified fields come from serde defaults
        assert_eq!(config.pid_file, PathBuf::from("/tmp/codeatlas.pid"));
    }
}
