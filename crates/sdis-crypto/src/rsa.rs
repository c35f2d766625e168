//! RSA-2048 key wrapping and transcript signing (spec §4.1).
//!
//! OAEP-SHA1 wraps short payloads (group keys, master keys, file keys)
//! under a peer's public key; PKCS1v15-SHA256 signs the handshake
//! transcript under the server's long-lived identity key.

use crate::error::{CryptoError, Result};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::Sha256;

/// Modulus size used throughout the system.
pub const KEY_BITS: usize = 2048;
/// Maximum OAEP-SHA1 plaintext size for a 2048-bit key (spec §4.1: ≤190 bytes).
pub const OAEP_MAX_PLAINTEXT: usize = 190;

/// An RSA-2048 key pair, PEM-serializable for storage and wire transfer.
pub struct RsaKeyPair {
    pub private: RsaPrivateKey,
    pub public: RsaPublicKey,
}

impl RsaKeyPair {
    /// Generate a fresh 2048-bit key pair.
    pub fn generate() -> Result<Self> {
        let mut rng = rand::rngs::OsRng;
        let private = RsaPrivateKey::new(&mut rng, KEY_BITS).map_err(|e| CryptoError::Rsa(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Reconstruct a keypair from a persisted private key PEM, deriving
    /// the public half rather than requiring it be stored separately
    /// (spec §6 "a single RSA-2048 keypair persisted to disk").
    pub fn from_private_pem(pem: &str) -> Result<Self> {
        let private = private_key_from_pem(pem)?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// PEM-encode the public key (stored in `User.public_key`, spec §3).
    pub fn public_key_pem(&self) -> Result<String> {
        self.public
            .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
            .map_err(|e| CryptoError::Rsa(e.to_string()))
    }

    /// PEM-encode the private key (wrapped by the master key before storage).
    pub fn private_key_pem(&self) -> Result<String> {
        self.private
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .map(|p| p.to_string())
            .map_err(|e| CryptoError::Rsa(e.to_string()))
    }
}

/// Parse a public key from PEM, as received over the wire or read from storage.
pub fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Parse a private key from PEM, after unwrapping it with the master key.
pub fn private_key_from_pem(pem: &str) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// OAEP-SHA1 encrypt. Payload must be `<= OAEP_MAX_PLAINTEXT` bytes.
pub fn oaep_encrypt(public: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    if plaintext.len() > OAEP_MAX_PLAINTEXT {
        return Err(CryptoError::DataTooLarge {
            size: plaintext.len() as u64,
            max: OAEP_MAX_PLAINTEXT as u64,
        });
    }
    let mut rng = rand::rngs::OsRng;
    public
        .encrypt(&mut rng, Oaep::new::<Sha1>(), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))
}

/// OAEP-SHA1 decrypt, inverse of [`oaep_encrypt`].
pub fn oaep_decrypt(private: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
    private
        .decrypt(Oaep::new::<Sha1>(), ciphertext)
        .map_err(|e| CryptoError::Decryption(e.to_string()))
}

/// Sign `message` with PKCS1v15-SHA256, used for the handshake transcript
/// signature (spec §4.3).
pub fn sign_pkcs1v15_sha256(private: &RsaPrivateKey, message: &[u8]) -> Result<Vec<u8>> {
    let signing_key = SigningKey::<Sha256>::new(private.clone());
    let mut rng = rand::rngs::OsRng;
    let signature = signing_key.sign_with_rng(&mut rng, message);
    Ok(signature.to_bytes().to_vec())
}

/// Verify a PKCS1v15-SHA256 signature produced by [`sign_pkcs1v15_sha256`].
pub fn verify_pkcs1v15_sha256(public: &RsaPublicKey, message: &[u8], signature: &[u8]) -> Result<()> {
    let verifying_key = VerifyingKey::<Sha256>::new(public.clone());
    let signature = Signature::try_from(signature).map_err(|e| CryptoError::Signature(e.to_string()))?;
    verifying_key
        .verify(message, &signature)
        .map_err(|_| CryptoError::Signature("handshake transcript signature invalid".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pem_roundtrip() {
        let kp = RsaKeyPair::generate().unwrap();
        let pub_pem = kp.public_key_pem().unwrap();
        let priv_pem = kp.private_key_pem().unwrap();
        let parsed_pub = public_key_from_pem(&pub_pem).unwrap();
        let parsed_priv = private_key_from_pem(&priv_pem).unwrap();
        assert_eq!(parsed_pub, kp.public);
        assert_eq!(parsed_priv, kp.private);
    }

    #[test]
    fn oaep_roundtrip() {
        let kp = RsaKeyPair::generate().unwrap();
        let group_key = [42u8; 32];
        let wrapped = oaep_encrypt(&kp.public, &group_key).unwrap();
        let unwrapped = oaep_decrypt(&kp.private, &wrapped).unwrap();
        assert_eq!(unwrapped, group_key);
    }

    #[test]
    fn oaep_rejects_oversized_payload() {
        let kp = RsaKeyPair::generate().unwrap();
        let too_big = vec![0u8; OAEP_MAX_PLAINTEXT + 1];
        assert!(oaep_encrypt(&kp.public, &too_big).is_err());
    }

    #[test]
    fn signature_roundtrip_and_tamper_detection() {
        let kp = RsaKeyPair::generate().unwrap();
        let transcript = b"client_random||server_random||dh_pub_s";
        let sig = sign_pkcs1v15_sha256(&kp.private, transcript).unwrap();
        verify_pkcs1v15_sha256(&kp.public, transcript, &sig).unwrap();

        let mut tampered = transcript.to_vec();
        tampered[0] ^= 0x01;
        assert!(verify_pkcs1v15_sha256(&kp.public, &tampered, &sig).is_err());
    }
}
