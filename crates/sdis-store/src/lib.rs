//! # sdis-store
//!
//! Transactional metadata store for SecureNetDisk: users, groups,
//! memberships, invitations, the file tree, and notifications, backed
//! by Postgres through `sqlx`.

pub mod error;
pub mod models;
pub mod store;

pub use error::{Result, StoreError};
pub use store::MetadataStore;
