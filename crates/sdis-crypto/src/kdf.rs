//! Password/recovery-key-derived wrap keys (spec §4.1, §4.6).

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

pub const SALT_LEN: usize = 16;
pub const DERIVED_KEY_LEN: usize = 32;
pub const ITERATIONS: u32 = 100_000;

/// Generate a fresh 16-byte salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// `PBKDF2-HMAC-SHA256(password, salt, 100_000) -> 32 bytes`, used to
/// derive `K_p` from the password and `K_r` from the normalized recovery
/// key (spec §3, §4.6).
pub fn pbkdf2_sha256(input: &[u8], salt: &[u8]) -> [u8; DERIVED_KEY_LEN] {
    let mut out = [0u8; DERIVED_KEY_LEN];
    pbkdf2_hmac::<Sha256>(input, salt, ITERATIONS, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_inputs() {
        let salt = generate_salt();
        let a = pbkdf2_sha256(b"Passw0rd!", &salt);
        let b = pbkdf2_sha256(b"Passw0rd!", &salt);
        assert_eq!(a, b);
    }

    #[test]
    fn differs_for_different_salts() {
        let a = pbkdf2_sha256(b"Passw0rd!", &generate_salt());
        let b = pbkdf2_sha256(b"Passw0rd!", &generate_salt());
        assert_ne!(a, b);
    }
}
