//! Error types for the sdis-proto crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtoError>;

#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort { expected: usize, actual: usize },

    #[error("invalid magic bytes")]
    InvalidMagic,

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("payload too large: {size} bytes exceeds maximum {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("unknown frame type: {0}")]
    UnknownFrameType(u8),

    #[error("mac verification failed")]
    MacMismatch,

    #[error("replayed or out-of-window sequence number {sequence} (max seen {max_seen})")]
    ReplayedSequence { sequence: u32, max_seen: u32 },

    #[error("frame timestamp {frame_ts} drifted too far from now {now}")]
    TimestampDrift { frame_ts: i64, now: i64 },

    #[error("handshake failed in state {state}: {reason}")]
    HandshakeFailed { state: &'static str, reason: String },

    #[error("server public key does not match the pinned key (possible impersonation)")]
    TrustPinMismatch,

    #[error("handshake deadline exceeded")]
    HandshakeTimeout,

    #[error("crypto error: {0}")]
    Crypto(#[from] sdis_crypto::CryptoError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection closed")]
    ConnectionClosed,
}
