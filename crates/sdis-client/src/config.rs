//! Client configuration

use std::path::PathBuf;
use std::time::Duration;

/// Client configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// `host:port` of the server
    pub server_addr: String,
    /// Connect/handshake timeout
    pub timeout: Duration,
    /// Where the TOFU trust pin for `server_addr` is persisted
    pub trust_store_path: PathBuf,
    /// Chunk size used for both upload `DATA` frames and download
    /// `chunk_size` requests
    pub chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:7070".to_string(),
            timeout: Duration::from_secs(30),
            trust_store_path: PathBuf::from("./sdis_trust.json"),
            chunk_size: 64 * 1024,
        }
    }
}

impl Config {
    /// Create a new config with the given server address
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            ..Default::default()
        }
    }

    /// Set the trust store path
    pub fn with_trust_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.trust_store_path = path.into();
        self
    }

    /// Set the connect/handshake timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
