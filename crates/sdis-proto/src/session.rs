//! Per-direction session keys and the replay-protection sequence window
//! (spec §4.3, §4.4).

use std::collections::BTreeSet;

use sdis_crypto::mac::hmac_sha256;
use sha2::{Digest, Sha256};
use zeroize::ZeroizeOnDrop;

/// Anti-reordering window: a sequence number older than `max_seen - WINDOW`
/// is treated as a replay even if never actually seen.
pub const REPLAY_WINDOW: u32 = 1000;

/// Seen-set cap; beyond this, entries outside the replay window are
/// pruned to bound memory (spec §4.4).
pub const SEEN_SET_MAX: usize = 10_000;

/// Maximum allowed clock drift between a frame's timestamp and now.
pub const MAX_TIMESTAMP_DRIFT_MS: i64 = 300_000;

/// The three keys derived at the end of the handshake (spec §4.3).
#[derive(ZeroizeOnDrop)]
pub struct SessionKeys {
    pub k_c2s: [u8; 32],
    pub k_s2c: [u8; 32],
    pub k_mac: [u8; 32],
}

impl SessionKeys {
    /// Derive `K_c2s`, `K_s2c`, `K_mac` from the DH shared secret and both
    /// handshake randoms.
    pub fn derive(shared: &[u8; 32], client_random: &[u8; 32], server_random: &[u8; 32]) -> Self {
        let label = |tag: &[u8]| -> [u8; 32] {
            let mut hasher = Sha256::new();
            hasher.update(tag);
            hasher.update(shared);
            hasher.update(client_random);
            hasher.update(server_random);
            hasher.finalize().into()
        };
        Self {
            k_c2s: label(b"client_key"),
            k_s2c: label(b"server_key"),
            k_mac: label(b"hmac_key"),
        }
    }

    /// `HMAC(K_mac, "client_finished" ‖ client_random ‖ server_random)`.
    pub fn client_finished_mac(&self, client_random: &[u8; 32], server_random: &[u8; 32]) -> [u8; 32] {
        self.finished_mac(b"client_finished", client_random, server_random)
    }

    /// `HMAC(K_mac, "server_finished" ‖ client_random ‖ server_random)`.
    pub fn server_finished_mac(&self, client_random: &[u8; 32], server_random: &[u8; 32]) -> [u8; 32] {
        self.finished_mac(b"server_finished", client_random, server_random)
    }

    fn finished_mac(&self, label: &[u8], client_random: &[u8; 32], server_random: &[u8; 32]) -> [u8; 32] {
        let mut data = Vec::with_capacity(label.len() + 64);
        data.extend_from_slice(label);
        data.extend_from_slice(client_random);
        data.extend_from_slice(server_random);
        hmac_sha256(&self.k_mac, &data)
    }
}

/// Tracks the highest sequence number seen on one direction plus a
/// bounded set of individually-seen numbers below it, rejecting replays
/// and frames that fall outside the reordering window (spec §4.4).
#[derive(Debug, Default)]
pub struct SequenceWindow {
    max_seen: u32,
    seen: BTreeSet<u32>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReplayCheck {
    Accept,
    Replayed,
    TooOld,
}

impl SequenceWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_seen(&self) -> u32 {
        self.max_seen
    }

    /// Check and, if accepted, record `sequence`. Mirrors spec §4.4
    /// exactly: reject if already seen, or if `sequence < max_seen - 1000`.
    pub fn check_and_record(&mut self, sequence: u32) -> ReplayCheck {
        if self.seen.contains(&sequence) {
            return ReplayCheck::Replayed;
        }
        if sequence < self.max_seen.saturating_sub(REPLAY_WINDOW) {
            return ReplayCheck::TooOld;
        }

        self.seen.insert(sequence);
        if sequence > self.max_seen {
            self.max_seen = sequence;
        }
        self.prune();
        ReplayCheck::Accept
    }

    fn prune(&mut self) {
        if self.seen.len() <= SEEN_SET_MAX {
            return;
        }
        let floor = self.max_seen.saturating_sub(REPLAY_WINDOW);
        self.seen.retain(|&seq| seq >= floor);
    }
}

/// `|now_ms - frame.timestamp_ms| <= 300_000` (spec §4.4).
pub fn timestamp_within_drift(frame_timestamp_ms: u64, now_ms: u64) -> bool {
    let diff = (frame_timestamp_ms as i64) - (now_ms as i64);
    diff.abs() <= MAX_TIMESTAMP_DRIFT_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_keys_are_distinct_and_deterministic() {
        let shared = [7u8; 32];
        let cr = [1u8; 32];
        let sr = [2u8; 32];
        let a = SessionKeys::derive(&shared, &cr, &sr);
        let b = SessionKeys::derive(&shared, &cr, &sr);
        assert_eq!(a.k_c2s, b.k_c2s);
        assert_ne!(a.k_c2s, a.k_s2c);
        assert_ne!(a.k_s2c, a.k_mac);
    }

    #[test]
    fn sequence_window_rejects_exact_replay() {
        let mut window = SequenceWindow::new();
        assert_eq!(window.check_and_record(5), ReplayCheck::Accept);
        assert_eq!(window.check_and_record(5), ReplayCheck::Replayed);
    }

    #[test]
    fn sequence_window_rejects_too_old() {
        let mut window = SequenceWindow::new();
        window.check_and_record(5000);
        assert_eq!(window.check_and_record(3000), ReplayCheck::TooOld);
    }

    #[test]
    fn sequence_window_accepts_reordered_within_window() {
        let mut window = SequenceWindow::new();
        window.check_and_record(5000);
        assert_eq!(window.check_and_record(4500), ReplayCheck::Accept);
    }

    #[test]
    fn timestamp_drift_boundary() {
        assert!(timestamp_within_drift(1_000_000, 1_000_000 + 300_000));
        assert!(!timestamp_within_drift(1_000_000, 1_000_000 + 300_001));
    }
}
