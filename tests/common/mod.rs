//! Shared harness for the end-to-end scenarios in spec §8: boots a real
//! `sdis-server` against a Postgres database on a loopback port, then
//! connects one or more `sdis-client`s to it.
//!
//! These tests need a reachable `DATABASE_URL`; call [`db_available`]
//! at the top of every test that uses [`spawn_server`] and return early
//! (via `#[ignore]`-style skip, not a panic) when it isn't set, since a
//! sandboxed CI run may not have Postgres.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use sdis_client::{Config as ClientConfig, MemoryTrustStore, SdisClient};
use sdis_crypto::rsa::RsaKeyPair;
use sdis_server::{AppState, ServerConfig};

static NEXT_PORT: AtomicU16 = AtomicU16::new(19_000);

pub fn db_available() -> bool {
    std::env::var("DATABASE_URL").is_ok()
}

/// Boot a server with its own blob directory and identity keypair on an
/// address nothing else in this test binary is using, and return that
/// address once the listener should be up.
pub async fn spawn_server() -> String {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for this test");
    let port = NEXT_PORT.fetch_add(1, Ordering::Relaxed);

    let blob_dir = std::env::temp_dir().join(format!("sdis-test-blobs-{port}"));
    let identity_key_path = std::env::temp_dir().join(format!("sdis-test-identity-{port}.pem"));

    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port,
        database_url,
        blob_dir,
        identity_key_path,
        session_timeout_secs: 3600,
        max_sessions: 100,
        session_sweep_interval_secs: 3600,
    };

    let identity = RsaKeyPair::generate().expect("generate test server identity");
    let state = Arc::new(AppState::new(config, identity).await.expect("build server state"));
    let addr = state.config.bind_addr();

    tokio::spawn(async move {
        let _ = sdis_server::run_server(state).await;
    });

    // Give the accept loop a moment to bind before the first client dials.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    addr
}

/// Connect a fresh client to `addr` with an in-memory trust store, so
/// repeated test runs never accumulate TOFU pins on disk.
pub async fn connect_client(addr: &str) -> SdisClient {
    let config = ClientConfig::new(addr);
    SdisClient::connect_with_trust_store(config, Box::new(MemoryTrustStore::default()))
        .await
        .expect("client connect and handshake")
}
