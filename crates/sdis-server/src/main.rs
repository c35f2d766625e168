//! sdis-server - SecureNetDisk metadata and transport server

use clap::Parser;
use sdis_crypto::rsa::RsaKeyPair;
use sdis_server::{run_server, AppState, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "sdis-server")]
#[command(about = "SecureNetDisk server: STP transport + metadata store")]
#[command(version)]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0", env = "SDIS_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "7070", env = "SDIS_PORT")]
    port: u16,

    /// Postgres connection string for the metadata store
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Directory holding opaque ciphertext blob files
    #[arg(long, default_value = "./data/blobs", env = "SDIS_BLOB_DIR")]
    blob_dir: std::path::PathBuf,

    /// Path the server's RSA-2048 identity keypair is persisted to
    #[arg(long, default_value = "./data/identity.pem", env = "SDIS_IDENTITY_KEY_PATH")]
    identity_key_path: std::path::PathBuf,

    /// Idle session lifetime, in seconds, before the sweep evicts it
    #[arg(long, default_value = "3600", env = "SDIS_SESSION_TIMEOUT_SECS")]
    session_timeout_secs: u64,

    /// Maximum number of concurrently active sessions
    #[arg(long, default_value = "10000", env = "SDIS_MAX_SESSIONS")]
    max_sessions: usize,

    /// Interval, in seconds, between idle-session sweeps
    #[arg(long, default_value = "60", env = "SDIS_SESSION_SWEEP_INTERVAL_SECS")]
    session_sweep_interval_secs: u64,

    /// Enable debug logging
    #[arg(short, long, env = "SDIS_DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("sdis_server={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let identity = load_or_generate_identity(&args.identity_key_path).await?;

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        database_url: args.database_url,
        blob_dir: args.blob_dir,
        identity_key_path: args.identity_key_path,
        session_timeout_secs: args.session_timeout_secs,
        max_sessions: args.max_sessions,
        session_sweep_interval_secs: args.session_sweep_interval_secs,
    };

    let state = AppState::new(config, identity).await?;
    run_server(std::sync::Arc::new(state)).await
}

/// Load the server's RSA-2048 identity keypair from disk, generating and
/// persisting a fresh one on first start (spec §6 "Server identity": a
/// single RSA-2048 keypair persisted to disk on first start).
async fn load_or_generate_identity(path: &std::path::Path) -> anyhow::Result<RsaKeyPair> {
    if tokio::fs::try_exists(path).await? {
        let pem = tokio::fs::read_to_string(path).await?;
        let identity = RsaKeyPair::from_private_pem(&pem)?;
        tracing::info!(path = %path.display(), "loaded existing server identity keypair");
        return Ok(identity);
    }

    tracing::warn!(path = %path.display(), "no server identity keypair found, generating a new one");
    let identity = RsaKeyPair::generate()?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, identity.private_key_pem()?).await?;
    Ok(identity)
}
