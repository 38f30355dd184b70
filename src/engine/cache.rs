//! Expiring key/value store for rendered responses.
//!
//! Expiry is checked lazily on read; nothing sweeps the map in the
//! background. Timestamps come from `tokio::time::Instant` so tests can drive
//! the clock.
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Expiry used when a TTL is too large to represent as an instant.
const FAR_FUTURE: Duration = Duration::from_secs(u32::MAX as u64);

#[derive(Debug, Clone)]
struct Expiring<V> {
    value: V,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct TtlCache<V> {
    entries: DashMap<String, Expiring<V>>,
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns the value if it has not expired. An expired entry is evicted.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if now < entry.expires_at {
                return Some(entry.value.clone());
            }
        }
        // The read guard must be released before removing
        self.entries.remove_if(key, |_, entry| now >= entry.expires_at);
        None
    }

    /// Store `value` for `ttl_secs` seconds, replacing any previous entry.
    pub fn set(&self, key: impl Into<String>, value: V, ttl_secs: u64) {
        let now = Instant::now();
        let expires_at = now
            .checked_add(Duration::from_secs(ttl_secs))
            .unwrap_or(now + FAR_FUTURE);
        self.entries
            .insert(key.into(), Expiring { value, expires_at });
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Entries currently stored, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cache key for a request: `METHOD:path`, plus the query string with its
/// pairs sorted so parameter order never splits entries.
pub fn cache_key(method: &str, path: &str, query: &[(String, String)]) -> String {
    if query.is_empty() {
        return format!("{}:{}", method, path);
    }
    let mut pairs: Vec<&(String, String)> = query.iter().collect();
    pairs.sort();
    let normalized = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}:{}?{}", method, path, normalized)
}
