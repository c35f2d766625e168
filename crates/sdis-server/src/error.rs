//! Error kinds the router and handlers surface (spec §7: each kind maps
//! to a distinct response shape, never leaking which check failed for
//! protocol-level errors).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Error, Debug)]
pub enum ServerError {
    /// Unknown user, wrong password, invalid/expired code, invalid recovery key.
    #[error("authentication failed")]
    Authentication,

    /// Operation not permitted for this session.
    #[error("not authorized")]
    Authorization,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unknown upload session: {0}")]
    UnknownUpload(uuid::Uuid),

    #[error("unknown download session: {0}")]
    UnknownDownload(uuid::Uuid),

    #[error("store error: {0}")]
    Store(#[from] sdis_store::StoreError),

    #[error("crypto error: {0}")]
    Crypto(#[from] sdis_crypto::CryptoError),

    #[error("protocol error: {0}")]
    Proto(#[from] sdis_proto::ProtoError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed request payload: {0}")]
    BadPayload(#[from] serde_json::Error),
}

impl ServerError {
    /// The message placed in a JSON `error` field. Protocol errors never
    /// reach this path — those close the connection outright.
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::Authentication => "invalid credentials",
            Self::Authorization => "not authorized",
            Self::NotFound(_) => "not found",
            Self::Conflict(_) => "already exists",
            Self::UnknownUpload(_) => "unknown upload session",
            Self::UnknownDownload(_) => "unknown download session",
            Self::Store(sdis_store::StoreError::UserNotFound(_)) => "not found",
            Self::Store(sdis_store::StoreError::UsernameTaken(_)) => "username already taken",
            Self::Store(sdis_store::StoreError::EmailTaken(_)) => "email already registered",
            Self::Store(sdis_store::StoreError::GroupNotFound(_)) => "not found",
            Self::Store(sdis_store::StoreError::FileNodeNotFound(_)) => "not found",
            Self::Store(sdis_store::StoreError::InvitationNotPending(_)) => "invitation already resolved",
            Self::Store(sdis_store::StoreError::AlreadyMember { .. }) => "already a member",
            Self::Store(_) => "internal error",
            Self::Crypto(_) => "internal error",
            Self::Proto(_) => "protocol error",
            Self::Io(_) => "internal error",
            Self::BadPayload(_) => "malformed request",
        }
    }
}
