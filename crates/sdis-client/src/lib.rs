//! # sdis-client
//!
//! Client SDK for SecureNetDisk: the password/recovery-key hierarchy
//! that keeps every secret client-side, a TOFU-pinned handshake over
//! the wire protocol in `sdis-proto`, and streaming upload/download.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sdis_client::{Config, SdisClient, UploadTarget};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut client = SdisClient::connect(Config::new("127.0.0.1:7070")).await?;
//!     let recovery_key = client.register("alice", "alice@example.com", "correct horse battery staple").await?;
//!     println!("save this recovery key somewhere safe: {recovery_key}");
//!
//!     client
//!         .upload_file(
//!             "./photo.jpg".as_ref(),
//!             UploadTarget { filename: "photo.jpg".into(), parent_id: None, group_id: None },
//!         )
//!         .await?;
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod download;
mod error;
mod group;
mod key_hierarchy;
mod transport;
mod trust;
mod upload;

pub use client::SdisClient;
pub use config::Config;
pub use error::{ClientError, Result};
pub use key_hierarchy::{PasswordRotation, RegistrationBundle, UnlockedKeys};
pub use transport::Transport;
pub use trust::{FileTrustStore, MemoryTrustStore, TrustStore};
pub use upload::{UploadTarget, UploadedFile};
