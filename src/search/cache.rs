//! Bounded query-result cache
//!
//! LRU over normalized query text, `k` and the fusion parameters. Each key
//! owns a slot with its own lock, held while the response is computed, so
//! concurrent identical queries run the pipeline once and the rest wait
//! for the stored result. Degraded responses are returned but not stored.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use itertools::Itertools;
use lru::LruCache;
use parking_lot::Mutex;

use crate::error::Result;
use crate::search::engine::SearchResponse;
use crate::search::hybrid::FusionStrategy;

type Slot = Arc<Mutex<Option<Arc<SearchResponse>>>>;

/// Cache key: lowercased, whitespace-collapsed query plus request parameters.
pub fn cache_key(query: &str, k: usize, strategy: &FusionStrategy) -> String {
    let normalized = query.split_whitespace().map(str::to_lowercase).join(" ");
    format!("{normalized}\u{1f}{k}\u{1f}{}", strategy.fingerprint())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

pub struct QueryCache {
    slots: Mutex<LruCache<String, Slot>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("len", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}

impl QueryCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            slots: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the stored response for `key`, or compute and maybe store it.
    pub fn get_or_compute<F>(&self, key: &str, compute: F) -> Result<Arc<SearchResponse>>
    where
        F: FnOnce() -> Result<SearchResponse>,
    {
        let slot = self.slot(key);
        let mut guard = slot.lock();

        if let Some(response) = guard.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(response));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let response = Arc::new(compute()?);
        if !response.degraded {
            *guard = Some(Arc::clone(&response));
        }
        Ok(response)
    }

    fn slot(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(key) {
            return Arc::clone(slot);
        }
        let slot: Slot = Arc::new(Mutex::new(None));
        slots.put(key.to_string(), Arc::clone(&slot));
        slot
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
