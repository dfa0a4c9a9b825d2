//! Keyed TTL cache with stale reads and cost accounting.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    cost: u64,
}

/// A cache read. `stale` is set when the entry had already expired and the
/// caller asked for stale values.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit<V> {
    pub value: V,
    pub stale: bool,
}

/// Counters exposed through the health endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub stale_hits: u64,
    /// Sum of the `cost` weights of live entries.
    pub total_cost: u64,
}

#[derive(Debug)]
struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    stale_hits: u64,
}

/// TTL cache shared by every outbound call path.
///
/// Expired entries are kept until a non-stale read, `purge_expired` or an
/// explicit `remove`/`clear`, so they remain available as a fallback.
#[derive(Debug)]
pub struct TtlCache<V> {
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                stale_hits: 0,
            }),
        }
    }

    pub fn get(&self, key: &str, allow_stale: bool) -> Option<CacheHit<V>> {
        self.get_at(key, allow_stale, Instant::now())
    }

    /// Read `key` as of `now`.
    pub fn get_at(&self, key: &str, allow_stale: bool, now: Instant) -> Option<CacheHit<V>> {
        let mut inner = self.inner.lock();

        let (value, fresh) = match inner.entries.get(key) {
            Some(entry) => (entry.value.clone(), now < entry.expires_at),
            None => {
                inner.misses += 1;
                return None;
            }
        };

        if fresh {
            inner.hits += 1;
            Some(CacheHit { value, stale: false })
        } else if allow_stale {
            inner.stale_hits += 1;
            Some(CacheHit { value, stale: true })
        } else {
            inner.entries.remove(key);
            inner.misses += 1;
            None
        }
    }

    /// Read for callers that only fall back to expired values on failure.
    ///
    /// Expired entries are returned with `stale` set but are counted as a
    /// miss and kept in place; call [`Self::record_stale_hit`] once the value
    /// is actually served.
    pub fn lookup(&self, key: &str) -> Option<CacheHit<V>> {
        self.lookup_at(key, Instant::now())
    }

    pub fn lookup_at(&self, key: &str, now: Instant) -> Option<CacheHit<V>> {
        let mut inner = self.inner.lock();

        let hit = inner.entries.get(key).map(|entry| CacheHit {
            value: entry.value.clone(),
            stale: now >= entry.expires_at,
        });
        match hit {
            Some(CacheHit { stale: false, .. }) => inner.hits += 1,
            _ => inner.misses += 1,
        }
        hit
    }

    pub fn record_stale_hit(&self) {
        self.inner.lock().stale_hits += 1;
    }

    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration, cost: u64) {
        self.set_at(key, value, ttl, cost, Instant::now());
    }

    pub fn set_at(&self, key: impl Into<String>, value: V, ttl: Duration, cost: u64, now: Instant) {
        let entry = CacheEntry {
            value,
            expires_at: now + ttl,
            cost,
        };
        self.inner.lock().entries.insert(key.into(), entry);
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.inner.lock().entries.remove(key).map(|e| e.value)
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// Drop every expired entry. Returns how many were evicted.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| now < entry.expires_at);
        before - inner.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            stale_hits: inner.stale_hits,
            total_cost: inner.entries.values().map(|e| e.cost).sum(),
        }
    }
}
