//! AES-256 in CBC, CTR and GCM modes.
//!
//! CBC is used for at-rest wrapping of fixed-size keys and small payloads
//! (PKCS#7 padded). CTR is used for streaming file bodies: a single
//! [`CtrCursor`] must span every chunk of one blob so the keystream never
//! repeats within a file. GCM is wired up but not reached by any opcode
//! today (spec: "reserved").

use crate::error::{CryptoError, Result};
use aes::Aes256;
use aes_gcm::{aead::Aead as GcmAead, Aes256Gcm, KeyInit as GcmKeyInit, Nonce as GcmNonce};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use ctr::cipher::{KeyIvInit as CtrKeyIvInit, StreamCipher};
use rand::RngCore;

pub const KEY_LEN: usize = 32;
pub const CBC_IV_LEN: usize = 16;
pub const CTR_NONCE_LEN: usize = 8;
pub const GCM_NONCE_LEN: usize = 12;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Encrypt `plaintext` under CBC/PKCS7 with a freshly generated IV.
///
/// Returns `IV(16) ‖ ciphertext`, matching the `IV‖AES-CBC(key, data)`
/// convention used throughout the key hierarchy (spec §3, §4.6).
pub fn cbc_encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut iv = [0u8; CBC_IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);
    let ciphertext = Aes256CbcEnc::new(key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    let mut out = Vec::with_capacity(CBC_IV_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt an `IV ‖ ciphertext` blob produced by [`cbc_encrypt`].
pub fn cbc_decrypt(key: &[u8; KEY_LEN], iv_and_ciphertext: &[u8]) -> Result<Vec<u8>> {
    if iv_and_ciphertext.len() < CBC_IV_LEN {
        return Err(CryptoError::InvalidCiphertext("ciphertext shorter than IV".into()));
    }
    let (iv, ciphertext) = iv_and_ciphertext.split_at(CBC_IV_LEN);
    Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|e| CryptoError::Decryption(e.to_string()))
}

/// A resumable AES-256-CTR keystream, used so one counter can be driven
/// across an arbitrary sequence of chunk boundaries (spec §4.1, §4.8).
///
/// The 16-byte IV fed to the block cipher is `nonce(8) ‖ counter(8)`; the
/// counter advances by one 16-byte block per call to [`Self::apply`].
pub struct CtrCursor {
    cipher: Aes256Ctr,
}

impl CtrCursor {
    /// Start a fresh keystream at block 0 for the given nonce.
    pub fn new(key: &[u8; KEY_LEN], nonce: &[u8; CTR_NONCE_LEN]) -> Self {
        let mut iv = [0u8; 16];
        iv[..CTR_NONCE_LEN].copy_from_slice(nonce);
        Self { cipher: Aes256Ctr::new(key.into(), &iv.into()) }
    }

    /// XOR `data` in place with the next portion of the keystream.
    /// Calling this repeatedly across chunks is equivalent to calling it
    /// once on the concatenation, which is the invariant the streaming
    /// download/upload paths depend on.
    pub fn apply(&mut self, data: &mut [u8]) {
        self.cipher.apply_keystream(data);
    }

    /// Generate a fresh random nonce for a new blob.
    pub fn random_nonce() -> [u8; CTR_NONCE_LEN] {
        let mut nonce = [0u8; CTR_NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        nonce
    }
}

/// One-shot CTR encrypt/decrypt helper for callers that hold the whole
/// buffer in memory (CTR is its own inverse).
pub fn ctr_apply(key: &[u8; KEY_LEN], nonce: &[u8; CTR_NONCE_LEN], data: &mut [u8]) {
    CtrCursor::new(key, nonce).apply(data);
}

/// AES-256-GCM encrypt. Reserved for future use; not exercised by any
/// opcode in the current wire protocol.
pub fn gcm_encrypt(key: &[u8; KEY_LEN], nonce: &[u8; GCM_NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.into());
    cipher
        .encrypt(GcmNonce::from_slice(nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))
}

/// AES-256-GCM decrypt, inverse of [`gcm_encrypt`].
pub fn gcm_decrypt(key: &[u8; KEY_LEN], nonce: &[u8; GCM_NONCE_LEN], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.into());
    cipher
        .decrypt(GcmNonce::from_slice(nonce), ciphertext)
        .map_err(|e| CryptoError::Decryption(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cbc_roundtrip() {
        let key = [7u8; KEY_LEN];
        let plaintext = b"a small secret key material";
        let ct = cbc_encrypt(&key, plaintext).unwrap();
        let pt = cbc_decrypt(&key, &ct).unwrap();
        assert_eq!(pt, plaintext);
    }

    #[test]
    fn cbc_wrong_key_fails() {
        let key = [7u8; KEY_LEN];
        let other = [9u8; KEY_LEN];
        let ct = cbc_encrypt(&key, b"0123456789abcdef").unwrap();
        assert!(cbc_decrypt(&other, &ct).is_err());
    }

    #[test]
    fn ctr_roundtrip_single_shot() {
        let key = [3u8; KEY_LEN];
        let nonce = [1u8; CTR_NONCE_LEN];
        let mut data = b"the quick brown fox jumps".to_vec();
        let original = data.clone();
        ctr_apply(&key, &nonce, &mut data);
        assert_ne!(data, original);
        ctr_apply(&key, &nonce, &mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn ctr_cursor_continuity_across_chunks() {
        let key = [5u8; KEY_LEN];
        let nonce = [2u8; CTR_NONCE_LEN];
        let plaintext: Vec<u8> = (0u8..=255).cycle().take(5000).collect();

        // Encrypt as one shot.
        let mut whole = plaintext.clone();
        CtrCursor::new(&key, &nonce).apply(&mut whole);

        // Encrypt split across arbitrary, unevenly sized chunks.
        let mut chunked = plaintext.clone();
        let mut cursor = CtrCursor::new(&key, &nonce);
        for chunk in chunked.chunks_mut(37) {
            cursor.apply(chunk);
        }

        assert_eq!(whole, chunked);
    }

    #[test]
    fn gcm_roundtrip() {
        let key = [11u8; KEY_LEN];
        let nonce = [0u8; GCM_NONCE_LEN];
        let ct = gcm_encrypt(&key, &nonce, b"reserved path").unwrap();
        let pt = gcm_decrypt(&key, &nonce, &ct).unwrap();
        assert_eq!(pt, b"reserved path");
    }
}
