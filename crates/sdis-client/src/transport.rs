//! Connects to the server, runs the client side of the handshake, and
//! exposes a request/response call atop the resulting `SecureChannel`
//! (spec §4.3, §4.7).

use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::TcpStream;

use sdis_proto::{handshake, FrameType, Opcode, SecureChannel};

use crate::error::{ClientError, Result};
use crate::trust::TrustStore;

/// One established, handshaken connection to the server.
pub struct Transport {
    channel: SecureChannel<TcpStream>,
}

impl Transport {
    /// Connect to `server_addr`, run the handshake, and verify the
    /// server's presented key against `trust` (pinning it on first
    /// contact). `timeout` bounds the TCP connect plus handshake
    /// together, not any individual request afterwards.
    pub async fn connect(server_addr: &str, trust: &mut dyn TrustStore, timeout: Duration) -> Result<Self> {
        tokio::time::timeout(timeout, Self::connect_inner(server_addr, trust))
            .await
            .map_err(|_| ClientError::Invalid(format!("connecting to {server_addr} timed out")))?
    }

    async fn connect_inner(server_addr: &str, trust: &mut dyn TrustStore) -> Result<Self> {
        let mut stream = TcpStream::connect(server_addr).await?;
        let pinned = trust.get(server_addr);

        let (keys, server_pub_pem) = handshake::run_client_handshake(&mut stream, pinned.as_deref())
            .await
            .map_err(|err| match err {
                sdis_proto::ProtoError::TrustPinMismatch => ClientError::TrustPinMismatch,
                other => other.into(),
            })?;

        if pinned.is_none() {
            trust.pin(server_addr, &server_pub_pem)?;
            tracing::info!(%server_addr, "pinned server identity on first contact");
        }

        let channel = SecureChannel::new(stream, keys, true);
        Ok(Self { channel })
    }

    /// Send one opcode request with a JSON body, and wait for the
    /// matching response. Returns the response's fields (minus `opcode`/
    /// `success`) on success, or `ClientError::Server` with the server's
    /// message on failure.
    pub async fn call(&self, opcode: Opcode, mut body: Value) -> Result<Value> {
        if let Value::Object(map) = &mut body {
            map.insert("opcode".to_string(), json!(opcode));
        } else {
            body = json!({ "opcode": opcode });
        }

        let request_bytes = serde_json::to_vec(&body)?;
        self.channel.send(FrameType::Request, &request_bytes).await?;

        let (frame_type, plaintext) = self.channel.recv().await?;
        if frame_type != FrameType::Response {
            return Err(ClientError::Invalid(format!("expected a response frame, got {frame_type:?}")));
        }

        let response: Value = serde_json::from_slice(&plaintext)?;
        let success = response.get("success").and_then(Value::as_bool).unwrap_or(false);
        if !success {
            let message = response.get("error").and_then(Value::as_str).unwrap_or("unknown error").to_string();
            return Err(ClientError::Server(message));
        }
        Ok(response)
    }

    /// Send a heartbeat frame to keep an idle session alive past the
    /// server's idle-session sweep (spec §4.4/§5).
    pub async fn heartbeat(&self) -> Result<()> {
        self.call(Opcode::Heartbeat, json!({})).await?;
        Ok(())
    }
}
