use std::time::{Duration, Instant};

use parking_lot::Mutex;
use zeroize::Zeroize;

/// How long a cached elevation secret stays usable.
pub const SECRET_TTL: Duration = Duration::from_secs(15 * 60);

struct Entry {
    secret: String,
    issued_at: Instant,
}

/// Time-boxed in-memory cache for the elevation secret, shared across
/// invocations within a session. At most one entry exists at a time and
/// nothing is ever persisted. Any component may clear it on an observed
/// elevation failure.
#[derive(Default)]
pub struct CredentialCache {
    entry: Mutex<Option<Entry>>,
    ttl: Option<Duration>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn with_ttl(ttl: Duration) -> Self {
        Self {
            entry: Mutex::new(None),
            ttl: Some(ttl),
        }
    }

    /// Returns the secret if present and younger than the TTL. An expired
    /// entry is treated as absent and dropped on observation.
    pub fn get(&self) -> Option<String> {
        let mut guard = self.entry.lock();
        match guard.as_ref() {
            Some(entry) if entry.issued_at.elapsed() < self.ttl.unwrap_or(SECRET_TTL) => {
                Some(entry.secret.clone())
            }
            Some(_) => {
                tracing::debug!("cached elevation secret expired");
                if let Some(mut stale) = guard.take() {
                    stale.secret.zeroize();
                }
                None
            }
            None => None,
        }
    }

    /// Records the secret with a fresh timestamp, replacing any prior entry.
    pub fn set(&self, secret: String) {
        let mut guard = self.entry.lock();
        if let Some(mut old) = guard.take() {
            old.secret.zeroize();
        }
        *guard = Some(Entry {
            secret,
            issued_at: Instant::now(),
        });
    }

    pub fn clear(&self) {
        if let Some(mut entry) = self.entry.lock().take() {
            entry.secret.zeroize();
        }
    }
}
