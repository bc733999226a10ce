//! Fingerprint-keyed memoization for scalars and instances.
//!
//! One mutex guards the map; the producer closure in [`FingerprintCache::fetch`]
//! always runs with the lock released, so concurrent misses may compute the
//! same value twice but a slow producer never blocks another.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use font_types::Tag;
use regex::Regex;
use serde::Serialize;

/// Cache sizing and expiry. `ttl: None` keeps entries until evicted.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub max_size: usize,
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 256,
            ttl: None,
        }
    }
}

/// A point-in-time view of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub size: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Entry<V> {
    value: V,
    last_access: u64,
    expires_at: Option<Instant>,
}

struct CacheInner<V> {
    map: HashMap<String, Entry<V>>,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    invalidations: u64,
}

/// A bounded LRU map from canonical fingerprints to values.
pub struct FingerprintCache<V> {
    config: CacheConfig,
    inner: Mutex<CacheInner<V>>,
}

impl<V: Clone> FingerprintCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                tick: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
                invalidations: 0,
            }),
        }
    }

    /// Looks a key up, refreshing its recency. Expired entries read as
    /// misses and are dropped.
    pub fn lookup(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock().unwrap();
        inner.tick += 1;
        let tick = inner.tick;
        let value = match inner.map.get_mut(key) {
            Some(entry) => {
                if entry.expires_at.is_some_and(|deadline| Instant::now() >= deadline) {
                    inner.map.remove(key);
                    inner.misses += 1;
                    return None;
                }
                entry.last_access = tick;
                Some(entry.value.clone())
            }
            None => None,
        };
        if value.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        value
    }

    /// Inserts a value, evicting the least recently used entry when full.
    pub fn insert(&self, key: String, value: V) {
        let mut inner = self.inner.lock().unwrap();
        inner.tick += 1;
        let tick = inner.tick;
        if !inner.map.contains_key(&key) && inner.map.len() >= self.config.max_size {
            if let Some(oldest) = inner
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(k, _)| k.clone())
            {
                inner.map.remove(&oldest);
                inner.evictions += 1;
            }
        }
        let expires_at = self.config.ttl.map(|ttl| Instant::now() + ttl);
        inner.map.insert(
            key,
            Entry {
                value,
                last_access: tick,
                expires_at,
            },
        );
    }

    /// Lookup-or-produce. The producer runs outside the lock; under
    /// contention two threads may produce the same value, and the second
    /// insert simply wins.
    pub fn fetch(&self, key: &str, produce: impl FnOnce() -> V) -> V {
        if let Some(value) = self.lookup(key) {
            return value;
        }
        let value = produce();
        self.insert(key.to_string(), value.clone());
        value
    }

    /// Like [`Self::fetch`] but the producer may fail; failures are never
    /// cached.
    pub fn try_fetch<E>(
        &self,
        key: &str,
        produce: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.lookup(key) {
            return Ok(value);
        }
        let value = produce()?;
        self.insert(key.to_string(), value.clone());
        Ok(value)
    }

    /// Removes one entry by exact key.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let removed = inner.map.remove(key).is_some();
        if removed {
            inner.invalidations += 1;
        }
        removed
    }

    /// Removes every entry whose key matches the pattern; returns the count.
    pub fn invalidate_matching(&self, pattern: &Regex) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let keys: Vec<String> = inner
            .map
            .keys()
            .filter(|key| pattern.is_match(key))
            .cloned()
            .collect();
        for key in &keys {
            inner.map.remove(key);
        }
        inner.invalidations += keys.len() as u64;
        keys.len()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        let count = inner.map.len() as u64;
        inner.map.clear();
        inner.invalidations += count;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            invalidations: inner.invalidations,
            size: inner.map.len(),
        }
    }
}

/// Formats a coordinate with enough fractional digits to round-trip 16.16
/// fixed-point axis values.
fn canonical_coord(value: f64) -> String {
    format!("{value:.6}")
}

/// The fingerprint of a normalized location: sorted tag=coordinate pairs.
pub fn location_fingerprint(location: &[(Tag, f64)]) -> String {
    let mut pairs: Vec<(Tag, f64)> = location.to_vec();
    pairs.sort_by_key(|(tag, _)| *tag);
    let parts: Vec<String> = pairs
        .iter()
        .map(|(tag, value)| format!("{tag}={}", canonical_coord(*value)))
        .collect();
    parts.join(",")
}

/// The fingerprint of a scalar vector request: the location plus a stable
/// identity for the region list it was computed against.
pub fn scalar_fingerprint(location: &[(Tag, f64)], store_id: u64) -> String {
    format!("scalars:{store_id:016x}:{}", location_fingerprint(location))
}

/// The fingerprint of a full instance: a font identity plus the location.
pub fn instance_fingerprint(font_id: u64, location: &[(Tag, f64)]) -> String {
    format!("instance:{font_id:016x}:{}", location_fingerprint(location))
}

/// FNV-1a over the font bytes: a stable identity for cache keys.
pub fn font_identity(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in data {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
