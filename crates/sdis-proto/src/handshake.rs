//! The four-message Diffie-Hellman handshake (spec §4.3).
//!
//! Handshake frames travel in cleartext — the MAC field is zero until
//! `K_mac` exists — except `ClientFinished`/`ServerFinished`, which carry
//! a real MAC under the freshly derived key. Either side's state machine
//! is `Initial -> HelloSent -> KeyExchanged -> Finished`; any unexpected
//! message or verification failure moves to `Failed` and the caller must
//! close the socket.

use rand::RngCore;
use sdis_crypto::dh::DhKeyPair;
use sdis_crypto::rsa::{self, RsaKeyPair};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{ProtoError, Result};
use crate::frame::{Flags, Frame, FrameType};
use crate::session::SessionKeys;

/// `ClientHello` payload: `client_random(32) ‖ dh_pub_c(256)`.
struct ClientHello {
    client_random: [u8; 32],
    dh_pub_c: [u8; 256],
}

impl ClientHello {
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(288);
        out.extend_from_slice(&self.client_random);
        out.extend_from_slice(&self.dh_pub_c);
        out
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() != 288 {
            return Err(handshake_failed("Initial", "CLIENT_HELLO has wrong length"));
        }
        let mut client_random = [0u8; 32];
        client_random.copy_from_slice(&buf[..32]);
        let mut dh_pub_c = [0u8; 256];
        dh_pub_c.copy_from_slice(&buf[32..288]);
        Ok(Self { client_random, dh_pub_c })
    }
}

/// `ServerHello` payload: `server_random(32) ‖ dh_pub_s(256) ‖
/// server_pub_rsa_len(2, BE) ‖ server_pub_rsa(PEM) ‖ sig_len(2, BE) ‖ sig`.
struct ServerHello {
    server_random: [u8; 32],
    dh_pub_s: [u8; 256],
    server_pub_rsa_pem: String,
    signature: Vec<u8>,
}

impl ServerHello {
    fn to_bytes(&self) -> Vec<u8> {
        let pem_bytes = self.server_pub_rsa_pem.as_bytes();
        let mut out = Vec::with_capacity(288 + 2 + pem_bytes.len() + 2 + self.signature.len());
        out.extend_from_slice(&self.server_random);
        out.extend_from_slice(&self.dh_pub_s);
        out.extend_from_slice(&(pem_bytes.len() as u16).to_be_bytes());
        out.extend_from_slice(pem_bytes);
        out.extend_from_slice(&(self.signature.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.signature);
        out
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < 288 + 2 {
            return Err(handshake_failed("HelloSent", "SERVER_HELLO too short"));
        }
        let mut server_random = [0u8; 32];
        server_random.copy_from_slice(&buf[..32]);
        let mut dh_pub_s = [0u8; 256];
        dh_pub_s.copy_from_slice(&buf[32..288]);

        let pem_len = u16::from_be_bytes(buf[288..290].try_into().unwrap()) as usize;
        let pem_start = 290;
        let pem_end = pem_start + pem_len;
        if buf.len() < pem_end + 2 {
            return Err(handshake_failed("HelloSent", "SERVER_HELLO truncated public key"));
        }
        let server_pub_rsa_pem = String::from_utf8(buf[pem_start..pem_end].to_vec())
            .map_err(|_| handshake_failed("HelloSent", "SERVER_HELLO public key is not valid UTF-8"))?;

        let sig_len = u16::from_be_bytes(buf[pem_end..pem_end + 2].try_into().unwrap()) as usize;
        let sig_start = pem_end + 2;
        if buf.len() < sig_start + sig_len {
            return Err(handshake_failed("HelloSent", "SERVER_HELLO truncated signature"));
        }
        let signature = buf[sig_start..sig_start + sig_len].to_vec();

        Ok(Self {
            server_random,
            dh_pub_s,
            server_pub_rsa_pem,
            signature,
        })
    }

    fn transcript(client_random: &[u8; 32], server_random: &[u8; 32], dh_pub_s: &[u8; 256]) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + 32 + 256);
        out.extend_from_slice(client_random);
        out.extend_from_slice(server_random);
        out.extend_from_slice(dh_pub_s);
        out
    }
}

fn handshake_failed(state: &'static str, reason: &str) -> ProtoError {
    ProtoError::HandshakeFailed { state, reason: reason.to_string() }
}

/// Decides whether a server's RSA public key is trusted: on first
/// contact (`None`) it is accepted and should be pinned by the caller;
/// on subsequent contact it must match byte-for-byte (spec §4.3 TOFU).
pub fn verify_pin(pinned: Option<&str>, presented: &str) -> Result<()> {
    match pinned {
        None => Ok(()),
        Some(pinned) if pinned == presented => Ok(()),
        Some(_) => Err(ProtoError::TrustPinMismatch),
    }
}

/// Drives the client side of the handshake to completion, returning the
/// derived session keys and the server's presented public key PEM (for
/// the caller to check against its pin store and persist on first use).
pub async fn run_client_handshake<S>(
    stream: &mut S,
    pinned_server_key: Option<&str>,
) -> Result<(SessionKeys, String)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut client_random = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut client_random);
    let dh_pair = DhKeyPair::generate();
    let hello = ClientHello { client_random, dh_pub_c: dh_pair.public_bytes() };

    let frame = Frame::new(FrameType::ClientHello, Flags::default(), 0, now_ms(), hello.to_bytes());
    stream.write_all(&frame.to_bytes()).await?;
    stream.flush().await?;

    let server_hello_frame = read_handshake_frame(stream, FrameType::ServerHello, "HelloSent").await?;
    let server_hello = ServerHello::from_bytes(&server_hello_frame.payload)?;

    verify_pin(pinned_server_key, &server_hello.server_pub_rsa_pem)?;

    let server_public = rsa::public_key_from_pem(&server_hello.server_pub_rsa_pem)?;
    let transcript = ServerHello::transcript(&client_random, &server_hello.server_random, &server_hello.dh_pub_s);
    rsa::verify_pkcs1v15_sha256(&server_public, &transcript, &server_hello.signature)
        .map_err(|_| handshake_failed("KeyExchanged", "server hello signature invalid"))?;

    let shared = dh_pair.shared_secret(&server_hello.dh_pub_s)?;
    let keys = SessionKeys::derive(&shared, &client_random, &server_hello.server_random);

    let client_mac = keys.client_finished_mac(&client_random, &server_hello.server_random);
    let finished = Frame::new(FrameType::ClientFinished, Flags::default(), 0, now_ms(), Vec::new()).with_mac(client_mac);
    stream.write_all(&finished.to_bytes()).await?;
    stream.flush().await?;

    let server_finished_frame = read_handshake_frame(stream, FrameType::ServerFinished, "Finished").await?;
    let expected = keys.server_finished_mac(&client_random, &server_hello.server_random);
    if server_finished_frame.mac != expected {
        return Err(handshake_failed("Finished", "server finished MAC invalid"));
    }

    Ok((keys, server_hello.server_pub_rsa_pem))
}

/// Handshake deadline (spec §5): a connection that hasn't finished the
/// handshake within this window is closed.
pub const HANDSHAKE_DEADLINE: std::time::Duration = std::time::Duration::from_secs(30);

/// Drives the server side of the handshake to completion within
/// [`HANDSHAKE_DEADLINE`].
pub async fn run_server_handshake<S>(stream: &mut S, identity: &RsaKeyPair) -> Result<SessionKeys>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match tokio::time::timeout(HANDSHAKE_DEADLINE, run_server_handshake_inner(stream, identity)).await {
        Ok(result) => result,
        Err(_) => Err(ProtoError::HandshakeTimeout),
    }
}

async fn run_server_handshake_inner<S>(stream: &mut S, identity: &RsaKeyPair) -> Result<SessionKeys>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let client_hello_frame = read_handshake_frame(stream, FrameType::ClientHello, "Initial").await?;
    let client_hello = ClientHello::from_bytes(&client_hello_frame.payload)?;

    let mut server_random = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut server_random);
    let dh_pair = DhKeyPair::generate();
    let dh_pub_s = dh_pair.public_bytes();

    let transcript = ServerHello::transcript(&client_hello.client_random, &server_random, &dh_pub_s);
    let signature = rsa::sign_pkcs1v15_sha256(&identity.private, &transcript)?;
    let server_hello = ServerHello {
        server_random,
        dh_pub_s,
        server_pub_rsa_pem: identity.public_key_pem()?,
        signature,
    };

    let frame = Frame::new(FrameType::ServerHello, Flags::default(), 0, now_ms(), server_hello.to_bytes());
    stream.write_all(&frame.to_bytes()).await?;
    stream.flush().await?;

    let shared = dh_pair.shared_secret(&client_hello.dh_pub_c)?;
    let keys = SessionKeys::derive(&shared, &client_hello.client_random, &server_random);

    let client_finished_frame = read_handshake_frame(stream, FrameType::ClientFinished, "KeyExchanged").await?;
    let expected_client_mac = keys.client_finished_mac(&client_hello.client_random, &server_random);
    if client_finished_frame.mac != expected_client_mac {
        return Err(handshake_failed("KeyExchanged", "client finished MAC invalid"));
    }

    let server_mac = keys.server_finished_mac(&client_hello.client_random, &server_random);
    let finished = Frame::new(FrameType::ServerFinished, Flags::default(), 0, now_ms(), Vec::new()).with_mac(server_mac);
    stream.write_all(&finished.to_bytes()).await?;
    stream.flush().await?;

    Ok(keys)
}

async fn read_handshake_frame<S>(stream: &mut S, expected: FrameType, state: &'static str) -> Result<Frame>
where
    S: AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;

    let mut header = vec![0u8; crate::frame::HEADER_LEN];
    stream.read_exact(&mut header).await?;
    let payload_len = Frame::peek_payload_len(&header)? as usize;
    let mut payload = vec![0u8; payload_len];
    if payload_len > 0 {
        stream.read_exact(&mut payload).await?;
    }
    header.extend_from_slice(&payload);
    let frame = Frame::from_bytes(&header)?;
    if frame.frame_type != expected {
        return Err(handshake_failed(state, "unexpected frame type"));
    }
    Ok(frame)
}

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_handshake_agrees_on_keys() {
        let identity = RsaKeyPair::generate().unwrap();
        let (client_io, mut server_io) = tokio::io::duplex(8192);
        let mut client_io = client_io;

        let server_task = tokio::spawn(async move { run_server_handshake(&mut server_io, &identity).await });

        let (client_keys, server_pub_pem) = run_client_handshake(&mut client_io, None).await.unwrap();
        let server_keys = server_task.await.unwrap().unwrap();

        assert_eq!(client_keys.k_c2s, server_keys.k_c2s);
        assert_eq!(client_keys.k_s2c, server_keys.k_s2c);
        assert_eq!(client_keys.k_mac, server_keys.k_mac);
        assert!(!server_pub_pem.is_empty());
    }

    #[test]
    fn pin_mismatch_is_rejected() {
        assert!(verify_pin(Some("pinned"), "different").is_err());
        assert!(verify_pin(Some("same"), "same").is_ok());
        assert!(verify_pin(None, "first contact").is_ok());
    }
}
