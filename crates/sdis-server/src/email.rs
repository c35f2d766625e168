//! Verification-code state machine (§2 supplement: the original's
//! `EmailService`, minus the SMTP client itself). Keyed by `(email,
//! purpose)` with at most one active code; five failed verify attempts
//! invalidate the code and require a fresh request (spec §5).

use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::Rng;

const CODE_TTL: Duration = Duration::from_secs(10 * 60);
const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Login,
    Reset,
}

struct CodeEntry {
    code: String,
    issued_at: Instant,
    attempts: u32,
}

/// Abstracts the actual delivery mechanism so the state machine is
/// testable without sending real email, the same role the original's
/// SMTP client plays behind `EmailService`.
pub trait CodeSink: Send + Sync {
    fn deliver(&self, email: &str, purpose: Purpose, code: &str);
}

/// Logs the code instead of sending it; the production default until a
/// real SMTP-backed sink is wired in.
pub struct LoggingSink;

impl CodeSink for LoggingSink {
    fn deliver(&self, email: &str, purpose: Purpose, code: &str) {
        tracing::info!(email, ?purpose, code, "verification code issued");
    }
}

pub struct EmailService {
    codes: DashMap<(String, Purpose), CodeEntry>,
    sink: Box<dyn CodeSink>,
}

impl Default for EmailService {
    fn default() -> Self {
        Self::new(Box::new(LoggingSink))
    }
}

impl EmailService {
    pub fn new(sink: Box<dyn CodeSink>) -> Self {
        Self { codes: DashMap::new(), sink }
    }

    /// Issue a fresh 6-digit code, replacing any existing one for this
    /// `(email, purpose)` pair.
    pub fn request_code(&self, email: &str, purpose: Purpose) {
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        self.sink.deliver(email, purpose, &code);
        self.codes.insert((email.to_string(), purpose), CodeEntry { code, issued_at: Instant::now(), attempts: 0 });
    }

    /// Check a submitted code. On mismatch the attempt counter is
    /// incremented and the code invalidated once it hits the cap.
    pub fn verify_code(&self, email: &str, purpose: Purpose, submitted: &str) -> bool {
        let key = (email.to_string(), purpose);
        let Some(mut entry) = self.codes.get_mut(&key) else {
            return false;
        };

        if entry.issued_at.elapsed() > CODE_TTL {
            drop(entry);
            self.codes.remove(&key);
            return false;
        }

        if entry.code == submitted {
            drop(entry);
            self.codes.remove(&key);
            return true;
        }

        entry.attempts += 1;
        let exhausted = entry.attempts >= MAX_ATTEMPTS;
        drop(entry);
        if exhausted {
            self.codes.remove(&key);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct CapturingSink(Arc<Mutex<Option<String>>>);
    impl CodeSink for CapturingSink {
        fn deliver(&self, _email: &str, _purpose: Purpose, code: &str) {
            *self.0.lock().unwrap() = Some(code.to_string());
        }
    }

    #[test]
    fn correct_code_verifies_once_then_is_consumed() {
        let captured = Arc::new(Mutex::new(None));
        let service = EmailService::new(Box::new(CapturingSink(captured.clone())));
        service.request_code("a@x.com", Purpose::Login);
        let code = captured.lock().unwrap().clone().unwrap();

        assert!(service.verify_code("a@x.com", Purpose::Login, &code));
        assert!(!service.verify_code("a@x.com", Purpose::Login, &code));
    }

    #[test]
    fn five_wrong_attempts_invalidate_the_code() {
        let service = EmailService::default();
        service.request_code("b@x.com", Purpose::Reset);
        for _ in 0..5 {
            assert!(!service.verify_code("b@x.com", Purpose::Reset, "000000"));
        }
        // sixth attempt: code already invalidated, even a later correct
        // guess (if it happened to match) cannot succeed.
        assert!(!service.verify_code("b@x.com", Purpose::Reset, "000000"));
    }
}
