//! Diffie-Hellman key agreement over RFC 3526 Group 14 (2048-bit MODP).
//!
//! Used only for the ephemeral handshake key exchange (spec §4.1, §4.3).
//! There is no forward secrecy beyond a single handshake (spec §1
//! non-goals) — a fresh key pair is generated per connection and never
//! persisted.

use crate::error::{CryptoError, Result};
use num_bigint::BigUint;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// RFC 3526 Group 14 prime, 2048 bits.
const GROUP14_PRIME_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E0",
    "88A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A43",
    "1B302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C4",
    "2E9A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B",
    "1FE649286651ECE45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8FD2",
    "4CF5F83655D23DCA3AD961C62F356208552BB9ED529077096966D670C354E4A",
    "BC9804F1746C08CA18217C32905E462E36CE3BE39E772C180E86039B2783A2E",
    "C07A28FB5C55DF06F4C52C9DE2BCBF6955817183995497CEA956AE515D22618",
    "98FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF",
);

const GENERATOR: u64 = 2;

fn prime() -> BigUint {
    BigUint::parse_bytes(GROUP14_PRIME_HEX.as_bytes(), 16).expect("static prime parses")
}

fn generator() -> BigUint {
    BigUint::from(GENERATOR)
}

/// One side's ephemeral DH state: a 256-bit private exponent and the
/// corresponding public value, both sized to the 2048-bit modulus on
/// the wire (public value zero-padded to 256 bytes).
pub struct DhKeyPair {
    private: BigUint,
    public: BigUint,
}

impl DhKeyPair {
    /// Generate a fresh key pair with a 256-bit private exponent.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let private = BigUint::from_bytes_be(&bytes);
        let public = generator().modpow(&private, &prime());
        Self { private, public }
    }

    /// Public value, encoded as a fixed 256-byte big-endian integer
    /// matching the `dh_pub_c`/`dh_pub_s` wire fields (spec §4.3).
    pub fn public_bytes(&self) -> [u8; 256] {
        let mut out = [0u8; 256];
        let raw = self.public.to_bytes_be();
        out[256 - raw.len()..].copy_from_slice(&raw);
        out
    }

    /// Compute `SHA256(g^(ab) mod p)`, the handshake shared secret
    /// (spec §4.3), after validating the peer's public value.
    pub fn shared_secret(&self, peer_public: &[u8]) -> Result<[u8; 32]> {
        let peer = validate_peer_public(peer_public)?;
        let shared = peer.modpow(&self.private, &prime());
        let mut hasher = Sha256::new();
        hasher.update(shared.to_bytes_be());
        Ok(hasher.finalize().into())
    }
}

/// Validate `1 < y < p-1` (spec §4.1) and parse a peer's public value.
fn validate_peer_public(bytes: &[u8]) -> Result<BigUint> {
    let y = BigUint::from_bytes_be(bytes);
    let p = prime();
    let one = BigUint::from(1u8);
    if y <= one || y >= (&p - &one) {
        return Err(CryptoError::InvalidDhPublicValue);
    }
    Ok(y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_secret_agrees() {
        let alice = DhKeyPair::generate();
        let bob = DhKeyPair::generate();
        let s1 = alice.shared_secret(&bob.public_bytes()).unwrap();
        let s2 = bob.shared_secret(&alice.public_bytes()).unwrap();
        assert_eq!(s1, s2);
    }

    #[test]
    fn rejects_degenerate_public_value() {
        let alice = DhKeyPair::generate();
        assert!(alice.shared_secret(&[1u8]).is_err());
        assert!(alice.shared_secret(&prime().to_bytes_be()).is_err());
    }

    #[test]
    fn public_bytes_are_fixed_width() {
        let kp = DhKeyPair::generate();
        assert_eq!(kp.public_bytes().len(), 256);
    }
}
