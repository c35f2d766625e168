//! On-disk/in-memory blob format shared by server spooling and client
//! local encryption (spec §6 "Blob on-disk format"): a version byte,
//! then either `IV(16) ‖ CBC-ciphertext` (version 0) or `nonce(8) ‖
//! CTR-ciphertext` (version 1).

use sdis_crypto::aes::{self, CtrCursor, CTR_NONCE_LEN, KEY_LEN};
use sdis_crypto::error::{CryptoError, Result};

/// Below this size, the client buffers the whole blob and uses CBC
/// (version 0); at or above it, CTR streaming is used (version 1), so
/// both encryption and decryption can stream (spec §3 Blob, §4.8).
pub const STREAMING_THRESHOLD_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlobVersion {
    Cbc = 0,
    Ctr = 1,
}

impl BlobVersion {
    pub fn for_size(size: u64) -> Self {
        if size >= STREAMING_THRESHOLD_BYTES {
            Self::Ctr
        } else {
            Self::Cbc
        }
    }

    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Self::Cbc),
            1 => Ok(Self::Ctr),
            other => Err(CryptoError::InvalidCiphertext(format!("unknown blob version byte {other}"))),
        }
    }
}

/// Encrypts a whole in-memory blob under CBC and prefixes the version
/// byte (§4.8 "below the streaming threshold use CBC ... hold the whole
/// blob in memory").
pub fn encrypt_whole_cbc(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut out = vec![BlobVersion::Cbc as u8];
    out.extend_from_slice(&aes::cbc_encrypt(key, plaintext)?);
    Ok(out)
}

/// Decrypts a blob produced by [`encrypt_whole_cbc`].
pub fn decrypt_whole_cbc(key: &[u8; KEY_LEN], blob: &[u8]) -> Result<Vec<u8>> {
    if blob.is_empty() || BlobVersion::from_byte(blob[0])? != BlobVersion::Cbc {
        return Err(CryptoError::InvalidCiphertext("not a CBC blob".into()));
    }
    aes::cbc_decrypt(key, &blob[1..])
}

/// A streaming CTR writer: writes the version byte and nonce once, then
/// encrypts chunks in place and returns them for the caller to append to
/// the temp file, reusing one [`CtrCursor`] across the whole blob (spec
/// §4.8 "CTR state must be created once and reused across all chunks").
pub struct StreamingEncryptor {
    cursor: CtrCursor,
    header_written: bool,
    nonce: [u8; CTR_NONCE_LEN],
}

impl StreamingEncryptor {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        let nonce = CtrCursor::random_nonce();
        Self {
            cursor: CtrCursor::new(key, &nonce),
            header_written: false,
            nonce,
        }
    }

    /// Encrypt one chunk in place, prefixing `version ‖ nonce` on the
    /// first call only.
    pub fn encrypt_chunk(&mut self, chunk: &mut [u8]) -> Vec<u8> {
        self.cursor.apply(chunk);
        if self.header_written {
            return chunk.to_vec();
        }
        self.header_written = true;
        let mut out = Vec::with_capacity(1 + CTR_NONCE_LEN + chunk.len());
        out.push(BlobVersion::Ctr as u8);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(chunk);
        out
    }
}

/// The matching streaming decryptor: reads the version byte and nonce
/// once from the front of the stream, then decrypts chunks in place.
pub struct StreamingDecryptor {
    key: [u8; KEY_LEN],
    cursor: Option<CtrCursor>,
    header_buf: Vec<u8>,
}

const HEADER_LEN: usize = 1 + CTR_NONCE_LEN;

impl StreamingDecryptor {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self {
            key,
            cursor: None,
            header_buf: Vec::with_capacity(HEADER_LEN),
        }
    }

    /// Feed the next chunk of raw blob bytes (possibly containing the
    /// leading header on the first call), returning decrypted plaintext
    /// once the header has been consumed.
    pub fn decrypt_chunk(&mut self, mut chunk: Vec<u8>) -> Result<Vec<u8>> {
        if self.cursor.is_none() {
            self.header_buf.extend_from_slice(&chunk);
            if self.header_buf.len() < HEADER_LEN {
                return Ok(Vec::new());
            }
            let version = BlobVersion::from_byte(self.header_buf[0])?;
            if version != BlobVersion::Ctr {
                return Err(CryptoError::InvalidCiphertext("not a CTR blob".into()));
            }
            let mut nonce = [0u8; CTR_NONCE_LEN];
            nonce.copy_from_slice(&self.header_buf[1..HEADER_LEN]);
            self.cursor = Some(CtrCursor::new(&self.key, &nonce));
            chunk = self.header_buf.split_off(HEADER_LEN);
            self.header_buf.clear();
        }
        let cursor = self.cursor.as_mut().expect("set above");
        cursor.apply(&mut chunk);
        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cbc_whole_blob_roundtrip() {
        let key = [1u8; KEY_LEN];
        let blob = encrypt_whole_cbc(&key, b"small file contents").unwrap();
        assert_eq!(blob[0], BlobVersion::Cbc as u8);
        let plaintext = decrypt_whole_cbc(&key, &blob).unwrap();
        assert_eq!(plaintext, b"small file contents");
    }

    #[test]
    fn streaming_roundtrip_across_uneven_chunks() {
        let key = [2u8; KEY_LEN];
        let plaintext: Vec<u8> = (0u8..=255).cycle().take(10_000).collect();

        let mut encryptor = StreamingEncryptor::new(&key);
        let mut wire = Vec::new();
        for chunk in plaintext.chunks(777) {
            let mut chunk = chunk.to_vec();
            wire.extend(encryptor.encrypt_chunk(&mut chunk));
        }

        let mut decryptor = StreamingDecryptor::new(key);
        let mut recovered = Vec::new();
        for chunk in wire.chunks(131) {
            recovered.extend(decryptor.decrypt_chunk(chunk.to_vec()).unwrap());
        }

        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn blob_version_threshold() {
        assert_eq!(BlobVersion::for_size(0), BlobVersion::Cbc);
        assert_eq!(BlobVersion::for_size(STREAMING_THRESHOLD_BYTES), BlobVersion::Ctr);
    }
}
