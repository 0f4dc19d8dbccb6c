//! Ephemeral TTL cache for read-heavy roster aggregates.
//!
//! Keeps the evaluator and API layer off the database for reference lists and
//! computed statistics. Entries live for a per-entry TTL; a sweep removes
//! expired entries and, once over the configured cap, evicts oldest-written
//! first. Hit/miss/eviction counters are lock-free atomics.
//!
//! The cache holds no write path back to the source of truth — collaborators
//! that mutate the underlying records call `invalidate` / `invalidate_all`.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use skyroster_core::Result;

struct CacheEntry<T> {
    data: T,
    cached_at: Instant,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// TTL-keyed in-memory store. Concurrent readers, exclusive writers.
pub struct TtlCache<T> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<T: Clone> TtlCache<T> {
    /// Create a cache that sweeps down to `max_entries` when over cap.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Get a live entry, counting the hit or miss.
    pub fn get(&self, key: &str) -> Option<T> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.data.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a value with the given TTL.
    pub fn put(&self, key: &str, data: T, ttl: Duration) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key.to_string(),
            CacheEntry {
                data,
                cached_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Return the live entry for `key`, or invoke `loader` and cache its result.
    ///
    /// A loader failure propagates to the caller unmutated — nothing is cached
    /// and the error is never masked as an empty value.
    pub fn get_or_load<F>(&self, key: &str, ttl: Duration, loader: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        if let Some(data) = self.get(key) {
            tracing::debug!("💾 Cache hit: {key}");
            return Ok(data);
        }
        tracing::debug!("💾 Cache miss: {key} — loading");
        let data = loader()?;
        self.put(key, data.clone(), ttl);
        Ok(data)
    }

    /// Remove a single entry immediately.
    pub fn invalidate(&self, key: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.remove(key).is_some() {
            tracing::debug!("💾 Cache invalidated: {key}");
        }
    }

    /// Clear everything.
    pub fn invalidate_all(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let n = entries.len();
        entries.clear();
        if n > 0 {
            tracing::debug!("💾 Cache cleared ({n} entries)");
        }
    }

    /// Remove expired entries, then evict oldest-written entries until back
    /// under the cap. Returns how many entries were removed.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());

        if entries.len() > self.max_entries {
            let mut by_age: Vec<(String, Instant)> = entries
                .iter()
                .map(|(k, e)| (k.clone(), e.cached_at))
                .collect();
            by_age.sort_by_key(|(_, cached_at)| *cached_at);
            let excess = entries.len() - self.max_entries;
            for (key, _) in by_age.into_iter().take(excess) {
                entries.remove(&key);
            }
        }

        let removed = before - entries.len();
        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
            tracing::debug!("🧹 Cache sweep removed {removed} entries");
        }
        removed
    }

    /// Current entry count.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of hit/miss/eviction counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}
