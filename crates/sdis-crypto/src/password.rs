//! Password prehashing and at-rest bcrypt storage (spec §4.1, §4.6).
//!
//! The server never sees a raw password: the client always sends
//! `SHA256(password_utf8)` hex-encoded, and the server wraps that prehash
//! in bcrypt (cost 12) before storing it.

use crate::error::Result;
use sha2::{Digest, Sha256};

pub const BCRYPT_COST: u32 = 12;

/// Client-side: `password_prehash = SHA256(password_utf8)`, returned as
/// lowercase hex (this is the `password` field AUTH sends on the wire).
pub fn prehash(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Server-side: bcrypt the client's prehash for storage.
pub fn bcrypt_hash(prehash_hex: &str) -> Result<String> {
    Ok(bcrypt::hash(prehash_hex, BCRYPT_COST)?)
}

/// Server-side: verify a prehash against a stored bcrypt hash.
pub fn bcrypt_verify(prehash_hex: &str, stored_hash: &str) -> Result<bool> {
    Ok(bcrypt::verify(prehash_hex, stored_hash)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prehash_is_deterministic_and_hex() {
        let a = prehash("Passw0rd!");
        let b = prehash("Passw0rd!");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn bcrypt_roundtrip() {
        let hashed = prehash("Passw0rd!");
        let stored = bcrypt_hash(&hashed).unwrap();
        assert!(bcrypt_verify(&hashed, &stored).unwrap());
        assert!(!bcrypt_verify(&prehash("WrongPass1!"), &stored).unwrap());
    }
}
