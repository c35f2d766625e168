//! Key material wrapper types: fixed-size symmetric keys that zeroize on
//! drop, and wrapped-key envelopes exchanged between client and server
//! (spec §3, §4.6). The server only ever holds the wrapped forms.

use crate::aes::KEY_LEN;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A bare 32-byte symmetric key (master key, file key, or group key).
/// Zeroized on drop; never `Debug`/`Display` to avoid accidental logging.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    /// Generate a fresh random key (new master key, file key, group key).
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// A key (file key, group key, or the user's RSA private key) wrapped
/// under another symmetric key, exactly as it travels on the wire and
/// sits in storage: `wrap = AES-256-CBC(wrap_key, key_plaintext)`.
///
/// The server stores and forwards these opaquely; it never holds the
/// `wrap_key` needed to open one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WrappedKey {
    /// Base64 `IV || ciphertext`, as produced by [`crate::aes::cbc_encrypt`].
    pub ciphertext: String,
}

impl WrappedKey {
    pub fn new(raw_cbc_output: &[u8]) -> Self {
        Self {
            ciphertext: base64::engine::general_purpose::STANDARD.encode(raw_cbc_output),
        }
    }

    pub fn decode(&self) -> crate::error::Result<Vec<u8>> {
        Ok(base64::engine::general_purpose::STANDARD.decode(&self.ciphertext)?)
    }
}

/// Wrap a symmetric key under another symmetric key (spec §3: file keys
/// wrapped by the master key, group keys wrapped per-member).
pub fn wrap_symmetric_key(
    wrap_key: &SymmetricKey,
    plaintext_key: &SymmetricKey,
) -> crate::error::Result<WrappedKey> {
    let wrapped = crate::aes::cbc_encrypt(wrap_key.as_bytes(), plaintext_key.as_bytes())?;
    Ok(WrappedKey::new(&wrapped))
}

/// Unwrap a symmetric key previously wrapped with [`wrap_symmetric_key`].
pub fn unwrap_symmetric_key(
    wrap_key: &SymmetricKey,
    wrapped: &WrappedKey,
) -> crate::error::Result<SymmetricKey> {
    let raw = wrapped.decode()?;
    let plaintext = crate::aes::cbc_decrypt(wrap_key.as_bytes(), &raw)?;
    let bytes: [u8; KEY_LEN] = plaintext
        .try_into()
        .map_err(|_| crate::error::CryptoError::InvalidKey("unwrapped key has wrong length".into()))?;
    Ok(SymmetricKey::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_unwrap_roundtrip() {
        let wrap_key = SymmetricKey::generate();
        let file_key = SymmetricKey::generate();
        let wrapped = wrap_symmetric_key(&wrap_key, &file_key).unwrap();
        let unwrapped = unwrap_symmetric_key(&wrap_key, &wrapped).unwrap();
        assert_eq!(unwrapped.as_bytes(), file_key.as_bytes());
    }

    #[test]
    fn unwrap_with_wrong_key_fails_or_diverges() {
        let wrap_key = SymmetricKey::generate();
        let other_key = SymmetricKey::generate();
        let file_key = SymmetricKey::generate();
        let wrapped = wrap_symmetric_key(&wrap_key, &file_key).unwrap();
        match unwrap_symmetric_key(&other_key, &wrapped) {
            Ok(recovered) => assert_ne!(recovered.as_bytes(), file_key.as_bytes()),
            Err(_) => {}
        }
    }
}
