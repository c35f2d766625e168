//! Server configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Postgres connection string for the metadata store
    pub database_url: String,
    /// Directory holding opaque ciphertext blob files
    pub blob_dir: PathBuf,
    /// Path the server's RSA-2048 identity keypair is persisted to
    pub identity_key_path: PathBuf,
    /// Idle session lifetime before the sweep evicts it
    pub session_timeout_secs: u64,
    /// Maximum number of concurrently active sessions before LRU eviction
    pub max_sessions: usize,
    /// Interval between idle-session sweeps
    pub session_sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7070,
            database_url: "postgres://localhost/sdis".to_string(),
            blob_dir: PathBuf::from("./data/blobs"),
            identity_key_path: PathBuf::from("./data/identity.pem"),
            session_timeout_secs: 3600,
            max_sessions: 10_000,
            session_sweep_interval_secs: 60,
        }
    }
}

impl ServerConfig {
    /// Get the bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
