//! # sdis-proto
//!
//! The Secure Transport Protocol: wire framing, the four-message DH
//! handshake, per-session replay protection, the encrypted channel built
//! on top of it, and the shared on-disk/in-flight blob format used by
//! both `sdis-server` and `sdis-client`.
//!
//! This crate owns everything below the request/response layer; opcode
//! payloads are plain JSON carried inside a [`frame::Frame`]'s payload
//! once the channel is established.

pub mod blob;
pub mod channel;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod opcode;
pub mod session;

pub use channel::SecureChannel;
pub use error::{ProtoError, Result};
pub use frame::{Flags, Frame, FrameType};
pub use opcode::Opcode;
pub use session::SessionKeys;
