//! Trust-on-first-use pin store for server identity keys (spec §4.3).
//!
//! The handshake itself only checks a presented key against a pin the
//! caller supplies; this module is where that pin is persisted across
//! connections, keyed by `server_addr`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Where trust pins come from and go to. A file-backed implementation is
/// provided; callers embedding this SDK in a GUI shell with its own
/// keystore can implement this instead.
pub trait TrustStore: Send + Sync {
    fn get(&self, server_addr: &str) -> Option<String>;
    fn pin(&mut self, server_addr: &str, public_key_pem: &str) -> Result<()>;
}

/// A `TrustStore` backed by a single JSON file mapping `server_addr ->
/// public_key_pem`.
pub struct FileTrustStore {
    path: PathBuf,
    pins: HashMap<String, String>,
}

impl FileTrustStore {
    /// Load pins from `path`, treating a missing file as "no pins yet"
    /// rather than an error (first run on a fresh machine).
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let pins = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self { path, pins })
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.pins)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl TrustStore for FileTrustStore {
    fn get(&self, server_addr: &str) -> Option<String> {
        self.pins.get(server_addr).cloned()
    }

    fn pin(&mut self, server_addr: &str, public_key_pem: &str) -> Result<()> {
        self.pins.insert(server_addr.to_string(), public_key_pem.to_string());
        self.persist()
    }
}

/// An in-memory store for tests and short-lived processes that don't
/// want pins to outlive the process.
#[derive(Default)]
pub struct MemoryTrustStore {
    pins: HashMap<String, String>,
}

impl TrustStore for MemoryTrustStore {
    fn get(&self, server_addr: &str) -> Option<String> {
        self.pins.get(server_addr).cloned()
    }

    fn pin(&mut self, server_addr: &str, public_key_pem: &str) -> Result<()> {
        self.pins.insert(server_addr.to_string(), public_key_pem.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_roundtrips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path: &Path = dir.path();
        let file = path.join("trust.json");

        {
            let mut store = FileTrustStore::open(&file).unwrap();
            assert!(store.get("127.0.0.1:7070").is_none());
            store.pin("127.0.0.1:7070", "PEM-DATA").unwrap();
        }

        let store = FileTrustStore::open(&file).unwrap();
        assert_eq!(store.get("127.0.0.1:7070").as_deref(), Some("PEM-DATA"));
    }

    #[test]
    fn memory_store_does_not_touch_disk() {
        let mut store = MemoryTrustStore::default();
        store.pin("host:1", "KEY").unwrap();
        assert_eq!(store.get("host:1").as_deref(), Some("KEY"));
    }
}
