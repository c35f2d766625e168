//! Human-transcribable recovery key (spec §3): 15 random bytes, Base32
//! (no padding), grouped in fours and separated by `-`. Shown once at
//! registration; never stored in plaintext server-side.

use base32::Alphabet;
use rand::RngCore;

const RAW_LEN: usize = 15;
const GROUP_SIZE: usize = 4;

/// A freshly generated recovery key, displayed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryKey(pub String);

impl RecoveryKey {
    /// Generate `15 random bytes -> Base32 -> XXXX-XXXX-...` grouping.
    pub fn generate() -> Self {
        let mut raw = [0u8; RAW_LEN];
        rand::rngs::OsRng.fill_bytes(&mut raw);
        let encoded = base32::encode(Alphabet::Rfc4648 { padding: false }, &raw);
        Self(group(&encoded))
    }

    /// Normalize for key derivation: strip separators, uppercase.
    pub fn normalize(&self) -> String {
        normalize(&self.0)
    }
}

fn group(encoded: &str) -> String {
    encoded
        .as_bytes()
        .chunks(GROUP_SIZE)
        .map(|c| std::str::from_utf8(c).expect("base32 alphabet is ASCII"))
        .collect::<Vec<_>>()
        .join("-")
}

/// Normalize any user-entered recovery key string: strip `-` separators
/// and whitespace, uppercase the rest. Used both when generating and
/// when the user types a recovery key back in for unlock/reset (spec §3).
pub fn normalize(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(char::to_uppercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_is_grouped_in_fours() {
        let key = RecoveryKey::generate();
        for group in key.0.split('-') {
            assert!(group.len() <= GROUP_SIZE);
        }
    }

    #[test]
    fn normalize_strips_separators_and_uppercases() {
        let key = RecoveryKey::generate();
        let typed_lowercase = key.0.to_lowercase();
        assert_eq!(normalize(&typed_lowercase), key.normalize());
    }

    #[test]
    fn normalize_is_idempotent() {
        let n = normalize("abcd-efgh-ijkl");
        assert_eq!(normalize(&n), n);
    }
}
