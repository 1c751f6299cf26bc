use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

struct CacheEntry<V> {
    data: V,
    cached_at: DateTime<Utc>,
}

/// Concurrent TTL cache keyed by string. Expired entries are treated as
/// misses on read and overwritten on the next insert; there is no background
/// sweeper.
pub struct TtlCache<V: Clone> {
    entries: DashMap<String, CacheEntry<V>>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Utc::now())
    }

    /// Read with an explicit clock, so tests can advance time without sleeping
    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<V> {
        let entry = self.entries.get(key)?;
        if now - entry.cached_at < self.ttl {
            Some(entry.data.clone())
        } else {
            None
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.insert_at(key, value, Utc::now());
    }

    /// Insert with an explicit timestamp, so tests can control expiry
    pub fn insert_at(&self, key: impl Into<String>, value: V, now: DateTime<Utc>) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                data: value,
                cached_at: now,
            },
        );
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
