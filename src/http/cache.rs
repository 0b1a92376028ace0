use super::Payload;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Payload,
    expires_at: Instant,
}

/// TTL cache of successful GET payloads, keyed by request signature.
///
/// Expired entries are not served as fresh hits but stay around until the
/// next sweep so they can back an offline fallback.
#[derive(Debug, Clone, Default)]
pub struct ResponseCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A live (unexpired) entry.
    pub fn get(&self, signature: &str) -> Option<Payload> {
        self.entries()
            .get(signature)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.payload.clone())
    }

    /// Any entry, expired or not.
    pub fn get_stale(&self, signature: &str) -> Option<Payload> {
        self.entries()
            .get(signature)
            .map(|entry| entry.payload.clone())
    }

    pub fn insert(&self, signature: String, payload: Payload, ttl: Duration) {
        self.entries().insert(
            signature,
            CacheEntry {
                payload,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Drop every entry whose signature targets `prefix` itself or a URL
    /// below it. `.../spreadsheets/abc` does not cover `.../spreadsheets/abcd`.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|signature, _| {
            !signature
                .split_once(' ')
                .is_some_and(|(_, url)| under_prefix(url, prefix))
        });
        before - entries.len()
    }

    /// Drop expired entries, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "Swept expired cache entries");
        }
        removed
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries().len()
    }
}

fn under_prefix(url: &str, prefix: &str) -> bool {
    url.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?', ':', ' ']))
}
