//! Time-bounded resolution cache.
//!
//! Keys are the exact original `orp://` strings. An entry is valid while
//! `now - inserted_at < ttl`; expired entries are never returned but may sit
//! in the map until a lookup or a sweep removes them. Time is taken from
//! `tokio::time::Instant` so paused-clock tests control expiry.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use orp_core::{CacheEntryReport, CacheStatsResponse};

/// A successful daemon resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub resolved_url: String,
    pub inserted_at: Instant,
    /// Wall-clock insertion time, reported in diagnostics only.
    pub inserted_at_wall: DateTime<Utc>,
}

impl CacheEntry {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.inserted_at)
    }

    fn is_valid(&self, now: Instant, ttl: Duration) -> bool {
        self.age(now) < ttl
    }
}

/// Snapshot of one entry for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntrySnapshot {
    pub uri: String,
    pub resolved_url: String,
    pub inserted_at: DateTime<Utc>,
    pub age: Duration,
}

/// Snapshot of the whole cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub entries: Vec<CacheEntrySnapshot>,
}

impl CacheStats {
    /// Wire form used by `GET_CACHE_STATS`.
    pub fn to_report(&self) -> CacheStatsResponse {
        CacheStatsResponse {
            cache_size: self.size,
            entries: self
                .entries
                .iter()
                .map(|entry| CacheEntryReport {
                    url: entry.uri.clone(),
                    resolved_url: entry.resolved_url.clone(),
                    timestamp: u64::try_from(entry.inserted_at.timestamp_millis()).unwrap_or(0),
                    age: u64::try_from(entry.age.as_millis()).unwrap_or(u64::MAX),
                })
                .collect(),
        }
    }
}

/// Unbounded URI → resolved-URL map with a fixed TTL.
#[derive(Debug, Clone)]
pub struct ResolutionCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
}

impl ResolutionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolved URL for `uri` if present and unexpired. An expired hit is
    /// dropped on the way out.
    pub fn lookup(&mut self, uri: &str, now: Instant) -> Option<String> {
        let ttl = self.ttl;
        match self.entries.get(uri) {
            Some(entry) if entry.is_valid(now, ttl) => Some(entry.resolved_url.clone()),
            Some(_) => {
                self.entries.remove(uri);
                None
            }
            None => None,
        }
    }

    /// Insert or overwrite, resetting the entry's timestamp.
    pub fn insert(&mut self, uri: &str, resolved_url: &str, now: Instant) {
        self.entries.insert(
            uri.to_string(),
            CacheEntry {
                key: uri.to_string(),
                resolved_url: resolved_url.to_string(),
                inserted_at: now,
                inserted_at_wall: Utc::now(),
            },
        );
    }

    /// Remove every entry with `now - inserted_at >= ttl`. Returns how many
    /// were removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_valid(now, ttl));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Every stored entry (expired or not), sorted by URI.
    pub fn stats(&self, now: Instant) -> CacheStats {
        let mut entries: Vec<CacheEntrySnapshot> = self
            .entries
            .values()
            .map(|entry| CacheEntrySnapshot {
                uri: entry.key.clone(),
                resolved_url: entry.resolved_url.clone(),
                inserted_at: entry.inserted_at_wall,
                age: entry.age(now),
            })
            .collect();
        entries.sort_by(|a, b| a.uri.cmp(&b.uri));
        CacheStats {
            size: self.entries.len(),
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(300);

    #[test]
    fn lookup_within_ttl_returns_url() {
        let start = Instant::now();
        let mut cache = ResolutionCache::new(TTL);
        cache.insert("orp://node-1/profile", "http://localhost:9001/profile", start);

        let hit = cache.lookup("orp://node-1/profile", start + Duration::from_secs(299));
        assert_eq!(hit.as_deref(), Some("http://localhost:9001/profile"));
    }

    #[test]
    fn expired_lookup_misses_and_drops_entry() {
        let start = Instant::now();
        let mut cache = ResolutionCache::new(TTL);
        cache.insert("orp://node-1/profile", "http://localhost:9001/profile", start);

        assert_eq!(cache.lookup("orp://node-1/profile", start + TTL), None);
        assert!(cache.is_empty(), "expired entry should be removed lazily");
    }

    #[test]
    fn keys_are_exact_strings() {
        let start = Instant::now();
        let mut cache = ResolutionCache::new(TTL);
        cache.insert("orp://node-1/profile", "http://localhost:9001/profile", start);

        assert_eq!(cache.lookup("orp://node-1/profile/", start), None);
        assert_eq!(cache.lookup("orp://NODE-1/profile", start), None);
    }

    #[test]
    fn insert_overwrites_and_resets_timestamp() {
        let start = Instant::now();
        let mut cache = ResolutionCache::new(TTL);
        cache.insert("orp://a", "http://localhost:1/", start);
        cache.insert("orp://a", "http://localhost:2/", start + Duration::from_secs(200));

        let later = start + Duration::from_secs(400);
        assert_eq!(cache.lookup("orp://a", later).as_deref(), Some("http://localhost:2/"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let start = Instant::now();
        let mut cache = ResolutionCache::new(TTL);
        cache.insert("orp://old", "http://localhost:1/", start);
        cache.insert("orp://edge", "http://localhost:2/", start + Duration::from_secs(100));
        cache.insert("orp://young", "http://localhost:3/", start + Duration::from_secs(250));

        let removed = cache.sweep(start + Duration::from_secs(400));
        assert_eq!(removed, 2, "old (400s) and edge (exactly TTL) must go");

        let stats = cache.stats(start + Duration::from_secs(400));
        assert_eq!(stats.size, 1);
        assert_eq!(stats.entries[0].uri, "orp://young");
        assert_eq!(stats.entries[0].age, Duration::from_secs(150));
    }

    #[test]
    fn clear_drops_everything() {
        let start = Instant::now();
        let mut cache = ResolutionCache::new(TTL);
        cache.insert("orp://a", "http://localhost:1/", start);
        cache.insert("orp://b", "http://localhost:2/", start);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats(start).entries.len(), 0);
    }

    #[test]
    fn report_uses_milliseconds() {
        let start = Instant::now();
        let mut cache = ResolutionCache::new(TTL);
        cache.insert("orp://a", "http://localhost:1/", start);

        let report = cache.stats(start + Duration::from_millis(1500)).to_report();
        assert_eq!(report.cache_size, 1);
        assert_eq!(report.entries[0].age, 1500);
        assert!(report.entries[0].timestamp > 0);
    }
}
