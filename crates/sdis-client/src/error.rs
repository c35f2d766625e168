//! Client error types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// Protocol-level failure: framing, handshake, replay, MAC.
    #[error("transport error: {0}")]
    Transport(#[from] sdis_proto::ProtoError),

    /// Cryptographic failure: bad key, OAEP payload too large, etc.
    #[error("crypto error: {0}")]
    Crypto(#[from] sdis_crypto::CryptoError),

    /// Underlying socket or filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A response frame's JSON payload didn't parse.
    #[error("malformed response: {0}")]
    MalformedResponse(#[from] serde_json::Error),

    /// The server answered with `"success": false`.
    #[error("server rejected request: {0}")]
    Server(String),

    /// The server's presented public key didn't match the pinned copy.
    #[error("server identity does not match the pinned key, possible man-in-the-middle")]
    TrustPinMismatch,

    /// A locally observed invariant failed: a missing field the caller
    /// expected, a wrong response shape, and similar client-side bugs
    /// that are never the server's fault.
    #[error("client error: {0}")]
    Invalid(String),
}
