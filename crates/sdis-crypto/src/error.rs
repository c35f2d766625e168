//! Error types for the sdis-crypto crate

use thiserror::Error;

/// Result type alias using `CryptoError`
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Encryption failed
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Invalid key format or length
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Invalid ciphertext format
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    /// Signature generation or verification failed
    #[error("signature error: {0}")]
    Signature(String),

    /// DH peer public value failed the `1 < y < p-1` range check
    #[error("invalid diffie-hellman public value")]
    InvalidDhPublicValue,

    /// Invalid nonce
    #[error("invalid nonce: {0}")]
    InvalidNonce(String),

    /// Data too large for operation
    #[error("data too large: {size} bytes exceeds maximum {max} bytes")]
    DataTooLarge { size: u64, max: u64 },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Base64 decode error
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// Hex decode error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    /// Recovery key normalization/parsing error
    #[error("invalid recovery key: {0}")]
    InvalidRecoveryKey(String),

    /// bcrypt error
    #[error("bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    /// RSA error
    #[error("rsa error: {0}")]
    Rsa(String),
}
