//! LRU cache for raw image payloads, bounded by total bytes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;

/// Default capacity: 4 MiB of encoded payloads
pub const DEFAULT_CAPACITY_BYTES: usize = 4 * 1024 * 1024;

/// Shared, immutable payload bytes
pub type Payload = Arc<Vec<u8>>;

/// Counters describing cache behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found an entry
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Entries dropped to make room
    pub evictions: u64,
    /// Inserts refused because the entry alone exceeds capacity
    pub rejected: u64,
    /// Bytes currently held
    pub size_bytes: usize,
    /// Entries currently held
    pub entry_count: usize,
}

struct Entries {
    lru: LruCache<String, Payload>,
    size_bytes: usize,
}

/// Thread-safe payload cache.
///
/// The sum of entry sizes never exceeds the capacity. Reads refresh recency.
pub struct MemoryCache {
    entries: Mutex<Entries>,
    capacity_bytes: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    rejected: AtomicU64,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY_BYTES)
    }
}

impl MemoryCache {
    /// Create a cache holding at most `capacity_bytes` of payload.
    #[must_use]
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(Entries {
                lru: LruCache::unbounded(),
                size_bytes: 0,
            }),
            capacity_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Store a payload, evicting least recently used entries until it fits.
    ///
    /// Returns `false` when the payload is larger than the whole cache; in
    /// that case nothing is evicted.
    pub fn insert(&self, key: &str, payload: Payload) -> bool {
        let size = payload.len();
        if size > self.capacity_bytes {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key, size, capacity = self.capacity_bytes, "Payload too large to cache");
            return false;
        }

        let mut entries = self.entries.lock();

        if let Some(previous) = entries.lru.pop(key) {
            entries.size_bytes -= previous.len();
        }

        while entries.size_bytes + size > self.capacity_bytes {
            let Some((evicted_key, evicted)) = entries.lru.pop_lru() else {
                break;
            };
            entries.size_bytes -= evicted.len();
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(key = %evicted_key, size = evicted.len(), "Evicted cached payload");
        }

        entries.size_bytes += size;
        entries.lru.put(key.to_string(), payload);
        true
    }

    /// Get a payload, marking it most recently used.
    pub fn get(&self, key: &str) -> Option<Payload> {
        let found = self.entries.lock().lru.get(key).map(Arc::clone);
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Check if a key is cached without touching recency.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().lru.contains(key)
    }

    /// Drop one entry.
    pub fn remove(&self, key: &str) -> Option<Payload> {
        let mut entries = self.entries.lock();
        let removed = entries.lru.pop(key);
        if let Some(payload) = &removed {
            entries.size_bytes -= payload.len();
        }
        removed
    }

    /// Clear the entire cache.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.lru.clear();
        entries.size_bytes = 0;
    }

    /// Bytes currently held.
    pub fn size_bytes(&self) -> usize {
        self.entries.lock().size_bytes
    }

    /// Configured capacity in bytes.
    pub const fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    /// Get the number of cached payloads.
    pub fn len(&self) -> usize {
        self.entries.lock().lru.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().lru.is_empty()
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        let (size_bytes, entry_count) = {
            let entries = self.entries.lock();
            (entries.size_bytes, entries.lru.len())
        };
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            size_bytes,
            entry_count,
        }
    }
}
