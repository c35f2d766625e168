//! Application state shared across every connection handler.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sdis_crypto::rsa::RsaKeyPair;
use sdis_store::MetadataStore;

use crate::config::ServerConfig;
use crate::download::DownloadEngine;
use crate::email::EmailService;
use crate::session::SessionManager;
use crate::upload::UploadEngine;

pub struct AppState {
    pub config: ServerConfig,
    pub store: MetadataStore,
    pub identity: RsaKeyPair,
    pub identity_fingerprint: String,
    pub sessions: Arc<SessionManager>,
    pub uploads: UploadEngine,
    pub downloads: DownloadEngine,
    pub email: EmailService,
}

impl AppState {
    pub async fn new(config: ServerConfig, identity: RsaKeyPair) -> anyhow::Result<Self> {
        let store = MetadataStore::connect(&config.database_url).await?;
        store.run_migrations().await?;

        tokio::fs::create_dir_all(&config.blob_dir).await?;

        let identity_fingerprint = fingerprint(&identity)?;
        let sessions = Arc::new(SessionManager::new(
            config.max_sessions,
            Duration::from_secs(config.session_timeout_secs),
        ));

        Ok(Self {
            uploads: UploadEngine::new(config.blob_dir.clone()),
            downloads: DownloadEngine::new(),
            email: EmailService::default(),
            sessions,
            identity,
            identity_fingerprint,
            store,
            config,
        })
    }

    pub fn blob_dir(&self) -> &PathBuf {
        &self.config.blob_dir
    }
}

/// First 16 uppercase hex characters of the SHA-256 of the identity's
/// public key PEM (spec §6 "Server identity"): the out-of-band
/// verification anchor an operator reads aloud to clients doing TOFU.
fn fingerprint(identity: &RsaKeyPair) -> anyhow::Result<String> {
    use sha2::{Digest, Sha256};
    let pem = identity.public_key_pem()?;
    let digest = Sha256::digest(pem.as_bytes());
    Ok(hex::encode_upper(&digest[..8]))
}
