use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::engine::ValidatorHandle;

/// Default number of compiled validators kept in memory
pub const DEFAULT_CAPACITY: usize = 10;

/// Bounded memo of compiled validators keyed by schema identifier.
///
/// Eviction is first-in first-out: when a new key would exceed the capacity,
/// the earliest inserted key is dropped, however often it has been read since.
/// Failed constructions are never stored, so a later request retries them.
///
/// Concurrent misses on the same key may each construct a validator. The last
/// insert wins and keeps the key's original position.
pub struct ValidatorCache {
    entries: RwLock<IndexMap<String, ValidatorHandle>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicU64,
    evictions: AtomicU64,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
    pub entries: usize,
    pub capacity: usize,
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

impl ValidatorCache {
    /// Create a cache holding at most `capacity` validators (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(IndexMap::with_capacity(capacity + 1)),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            insertions: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Return the cached validator for `key`, or build one with `constructor`.
    ///
    /// The lock is not held while the constructor runs.
    pub async fn get_or_create<F, Fut, E>(
        &self,
        key: &str,
        constructor: F,
    ) -> Result<ValidatorHandle, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ValidatorHandle, E>>,
    {
        if let Some(handle) = self.get(key) {
            return Ok(handle);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let handle = constructor().await?;
        self.insert(key, handle.clone());
        Ok(handle)
    }

    /// Blocking variant of [`Self::get_or_create`]
    pub fn get_or_create_with<F, E>(&self, key: &str, constructor: F) -> Result<ValidatorHandle, E>
    where
        F: FnOnce() -> Result<ValidatorHandle, E>,
    {
        if let Some(handle) = self.get(key) {
            return Ok(handle);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let handle = constructor()?;
        self.insert(key, handle.clone());
        Ok(handle)
    }

    /// Look up a validator without changing eviction order
    pub fn get(&self, key: &str) -> Option<ValidatorHandle> {
        let handle = self.entries.read().get(key).cloned();
        if handle.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "validator cache hit");
        }
        handle
    }

    /// Store a validator, evicting the oldest entries past capacity
    pub fn insert(&self, key: &str, handle: ValidatorHandle) {
        let mut entries = self.entries.write();
        // Replacing keeps the original insertion slot
        entries.insert(key.to_string(), handle);
        self.insertions.fetch_add(1, Ordering::Relaxed);

        while entries.len() > self.capacity {
            if let Some((evicted, _)) = entries.shift_remove_index(0) {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %evicted, "validator evicted");
            }
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Drop every cached validator. Handles already given out stay usable.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        let dropped = entries.len();
        entries.clear();
        debug!(dropped, "validator cache cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys in insertion order, oldest first
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            insertions: self.insertions.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
            capacity: self.capacity,
        }
    }
}

impl Default for ValidatorCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for ValidatorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorCache")
            .field("keys", &self.keys())
            .field("capacity", &self.capacity)
            .finish()
    }
}
