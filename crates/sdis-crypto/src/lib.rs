//! # sdis-crypto
//!
//! Cryptographic building blocks for SecureNetDisk's end-to-end key
//! hierarchy and secure transport: AES-256 (CBC/CTR/GCM), RSA-2048
//! (OAEP + PKCS#1v1.5 signatures), Diffie-Hellman over RFC 3526 Group 14,
//! PBKDF2-HMAC-SHA256, HMAC-SHA256 frame authentication, bcrypt password
//! storage, and Base32 recovery keys.
//!
//! Nothing in this crate talks to the network or a database; it only
//! turns key material and bytes into other key material and bytes. The
//! "Trust-No-One" boundary this crate exists to uphold: the server never
//! sees a plaintext file key, group key, or private key, only wrapped
//! forms it is unable to open.

pub mod aes;
pub mod dh;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod mac;
pub mod password;
pub mod recovery;
pub mod rsa;

pub use error::{CryptoError, Result};
pub use keys::{unwrap_symmetric_key, wrap_symmetric_key, SymmetricKey, WrappedKey};
pub use recovery::RecoveryKey;

/// Length in bytes of every symmetric key in the hierarchy: master key,
/// file key, group key (spec §3).
pub const SYMMETRIC_KEY_LEN: usize = aes::KEY_LEN;
