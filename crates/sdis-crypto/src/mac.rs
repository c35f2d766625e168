//! HMAC-SHA256 for frame authentication and handshake Finished messages
//! (spec §4.2, §4.3).

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const MAC_LEN: usize = 32;

/// Compute `HMAC-SHA256(key, data)`.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; MAC_LEN] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Constant-time verification of a tag produced by [`hmac_sha256`].
pub fn hmac_sha256_verify(key: &[u8], data: &[u8], tag: &[u8]) -> bool {
    if tag.len() != MAC_LEN {
        return false;
    }
    let expected = hmac_sha256(key, data);
    expected.ct_eq(tag).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_matching_tag() {
        let key = b"K_mac";
        let tag = hmac_sha256(key, b"frame bytes");
        assert!(hmac_sha256_verify(key, b"frame bytes", &tag));
    }

    #[test]
    fn verify_rejects_single_bit_flip() {
        let key = b"K_mac";
        let mut tag = hmac_sha256(key, b"frame bytes").to_vec();
        tag[0] ^= 0x01;
        assert!(!hmac_sha256_verify(key, b"frame bytes", &tag));
    }

    #[test]
    fn verify_rejects_tampered_payload() {
        let key = b"K_mac";
        let tag = hmac_sha256(key, b"frame bytes");
        assert!(!hmac_sha256_verify(key, b"frame BYTES", &tag));
    }
}
