//! Error types for the sdis-store crate

use thiserror::Error;

/// Result type alias using `StoreError`
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in metadata store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("username already taken: {0}")]
    UsernameTaken(String),

    #[error("email already registered: {0}")]
    EmailTaken(String),

    #[error("group not found: {0}")]
    GroupNotFound(uuid::Uuid),

    #[error("file node not found: {0}")]
    FileNodeNotFound(uuid::Uuid),

    #[error("invitation not found or not pending: {0}")]
    InvitationNotPending(uuid::Uuid),

    #[error("user {user} is already a member of group {group}")]
    AlreadyMember { user: uuid::Uuid, group: uuid::Uuid },

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
