use crate::errors::StorageResult;
use lru::LruCache;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters of a [`KeyCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub cached: u64,
}

/// Bounded cache of index ordinal -> key.
///
/// Concurrent misses for the same ordinal share one in-flight cell, so the
/// loader runs at most once while the key is missing.
pub struct KeyCache {
    entries: Mutex<LruCache<u64, Arc<str>>>,
    in_flight: Mutex<HashMap<u64, Arc<OnceCell<Option<Arc<str>>>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
}

impl KeyCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        KeyCache {
            entries: Mutex::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            loads: AtomicU64::new(0),
        }
    }

    /// Returns the cached key or runs `loader` to produce it.
    ///
    /// A loader answering `None` (reader closed) is passed through and not
    /// cached. After a loader error the next waiting caller runs its own loader.
    pub fn get_or_load<F>(&self, ordinal: u64, loader: F) -> StorageResult<Option<Arc<str>>>
    where
        F: FnOnce() -> StorageResult<Option<String>>,
    {
        if let Some(key) = self.entries.lock().get(&ordinal) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(key.clone()));
        }

        let cell = {
            let mut in_flight = self.in_flight.lock();
            // A load may have finished between the first lookup and here.
            if let Some(key) = self.entries.lock().get(&ordinal) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(key.clone()));
            }
            in_flight
                .entry(ordinal)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        self.misses.fetch_add(1, Ordering::Relaxed);

        let result = cell
            .get_or_try_init(|| {
                self.loads.fetch_add(1, Ordering::Relaxed);
                loader().map(|key| key.map(Arc::from))
            })
            .cloned();

        if let Ok(Some(key)) = &result {
            self.entries.lock().put(ordinal, key.clone());
        }

        let mut in_flight = self.in_flight.lock();
        if in_flight
            .get(&ordinal)
            .is_some_and(|current| Arc::ptr_eq(current, &cell))
        {
            in_flight.remove(&ordinal);
        }

        result
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> KeyCacheStats {
        KeyCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            cached: self.len() as u64,
        }
    }
}
