// Email Verification Codes - short-lived 2FA for registration and resets
//
// Codes are six digits, live for ten minutes and are single-use. A
// successful check opens a five-minute grace window during which exactly one
// follow-up action (finish registration, reset a password) may consume the
// verification. The cache is injected state, shared behind the app handle.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::info;

pub const CODE_TTL: Duration = Duration::from_secs(600);
pub const VERIFIED_GRACE: Duration = Duration::from_secs(300);

struct CodeEntry {
    code: String,
    issued_at: Instant,
    verified_at: Option<Instant>,
}

pub struct CodeCache {
    entries: Mutex<HashMap<String, CodeEntry>>,
    ttl: Duration,
    grace: Duration,
}

impl Default for CodeCache {
    fn default() -> Self {
        CodeCache::new()
    }
}

impl CodeCache {
    pub fn new() -> Self {
        CodeCache::with_ttl(CODE_TTL, VERIFIED_GRACE)
    }

    /// Custom windows, for tests
    pub fn with_ttl(ttl: Duration, grace: Duration) -> Self {
        CodeCache {
            entries: Mutex::new(HashMap::new()),
            ttl,
            grace,
        }
    }

    /// Issue a fresh code for an email, replacing any outstanding one
    pub fn issue(&self, email: &str) -> String {
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            email.to_string(),
            CodeEntry {
                code: code.clone(),
                issued_at: Instant::now(),
                verified_at: None,
            },
        );
        info!(email, "verification code issued");
        code
    }

    /// Check a submitted code. A correct, unexpired code is consumed and the
    /// grace window opens; a second check with the same code fails.
    pub fn verify(&self, email: &str, code: &str) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = entries.get_mut(email) else {
            return false;
        };

        if entry.issued_at.elapsed() > self.ttl {
            entries.remove(email);
            return false;
        }
        if entry.verified_at.is_some() || entry.code != code {
            return false;
        }

        entry.verified_at = Some(Instant::now());
        true
    }

    /// Spend a verification inside its grace window; at most once per code
    pub fn consume_verified(&self, email: &str) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = entries.get(email) else {
            return false;
        };
        match entry.verified_at {
            Some(at) if at.elapsed() <= self.grace => {
                entries.remove(email);
                true
            }
            Some(_) => {
                entries.remove(email);
                false
            }
            None => false,
        }
    }
}
