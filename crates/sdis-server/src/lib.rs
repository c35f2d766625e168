//! # sdis-server
//!
//! The SecureNetDisk server: a Postgres-backed metadata store, an
//! opaque-blob file store on local disk, and a custom TLS-like Secure
//! Transport Protocol (STP) request router exposed over raw TCP.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    STP clients                       │
//! │         (sdis-client, or any STP speaker)            │
//! └─────────────────────────┬───────────────────────────┘
//!                           │ TCP + handshake + AES-GCM frames
//! ┌─────────────────────────▼───────────────────────────┐
//! │                    sdis-server                       │
//! ├─────────────────────────────────────────────────────┤
//! │   Session manager │ Upload/download engines │ Email  │
//! ├─────────────────────────────────────────────────────┤
//! │                   request router                      │
//! │  (auth, files, groups, notifications handlers)        │
//! ├─────────────────────────────────────────────────────┤
//! │                    sdis-store                        │
//! │            (users, groups, file tree, Postgres)       │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod download;
pub mod email;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod session;
pub mod state;
pub mod upload;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use server::run_server;
pub use state::AppState;
