//! TCP accept loop and the per-connection handshake→route loop (spec
//! §5): one lightweight task per connection, cooperative scheduling
//! rather than per-connection OS threads.

use std::sync::Arc;

use sdis_proto::{handshake, FrameType, Opcode, SecureChannel};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::router::{self, RequestEnvelope};
use crate::session::spawn_sweep_task;
use crate::state::AppState;

pub async fn run_server(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = state.config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;

    info!(
        addr = %addr,
        fingerprint = %state.identity_fingerprint,
        "sdis-server listening; server identity fingerprint for TOFU pinning"
    );

    let sweep_interval = std::time::Duration::from_secs(state.config.session_sweep_interval_secs);
    spawn_sweep_task(state.sessions.clone(), sweep_interval);

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(state, stream).await {
                warn!(%peer_addr, error = %err, "connection closed with error");
            }
        });
    }
}

async fn handle_connection(state: Arc<AppState>, mut stream: TcpStream) -> anyhow::Result<()> {
    let session_keys = match handshake::run_server_handshake(&mut stream, &state.identity).await {
        Ok(keys) => keys,
        Err(err) => {
            warn!(error = %err, "handshake failed");
            return Ok(());
        }
    };

    let connection_id = state.sessions.create();
    let channel = SecureChannel::new(stream, session_keys, false);

    loop {
        let (frame_type, plaintext) = match channel.recv().await {
            Ok(frame) => frame,
            Err(err) => {
                info!(error = %err, %connection_id, "connection receive loop ending");
                break;
            }
        };

        if frame_type != FrameType::Request {
            continue;
        }

        state.sessions.touch(connection_id);
        let response = match serde_json::from_slice::<RequestEnvelope>(&plaintext) {
            Ok(request) => router::dispatch(&state, connection_id, request).await,
            Err(_) => serde_json::json!({ "opcode": Opcode::Error, "success": false, "error": "malformed request" }),
        };

        let bytes = serde_json::to_vec(&response)?;
        if channel.send(FrameType::Response, &bytes).await.is_err() {
            break;
        }
    }

    cleanup_connection(&state, connection_id).await;
    Ok(())
}

/// Release every resource a connection owned: its session slot, and any
/// uploads/downloads still in flight (spec §5 "a closed connection with
/// an open download releases the file descriptor").
async fn cleanup_connection(state: &Arc<AppState>, connection_id: uuid::Uuid) {
    let (upload_ids, download_ids) = state.sessions.remove(connection_id);
    state.uploads.discard_all(&upload_ids).await;
    state.downloads.close_all(&download_ids).await;
}
