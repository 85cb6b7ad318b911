//! Process-wide embedding cache
//!
//! Keyed by `(content_hash, model_id)` so that re-ingested text never hits
//! the provider twice and vectors from different models never collide.
//! Capacity is bounded in bytes with LRU eviction; values are shared
//! zero-copy as `Arc<[f32]>`.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    content_hash: u64,
    model_id: String,
}

struct CacheEntry {
    vector: Arc<[f32]>,
    bytes: usize,
    generation: u64,
}

struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    /// generation -> key, ordered oldest-first for eviction
    order: BTreeMap<u64, CacheKey>,
    next_generation: u64,
    bytes_used: usize,
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub bytes_used: usize,
    pub max_bytes: usize,
}

/// Thread-safe LRU embedding cache with bytes-based capacity
pub struct EmbeddingCache {
    state: Mutex<CacheState>,
    max_bytes: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_generation: 0,
                bytes_used: 0,
            }),
            max_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a vector; refreshes its LRU position on hit
    pub fn get(&self, content_hash: u64, model_id: &str) -> Option<Arc<[f32]>> {
        let key = CacheKey {
            content_hash,
            model_id: model_id.to_string(),
        };
        let mut state = self.state.lock();

        let generation = state.next_generation;
        match state.entries.get_mut(&key) {
            Some(entry) => {
                let old = entry.generation;
                entry.generation = generation;
                let vector = entry.vector.clone();
                state.order.remove(&old);
                state.order.insert(generation, key);
                state.next_generation += 1;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(vector)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a vector; last write wins on key collision
    pub fn put(&self, content_hash: u64, model_id: &str, vector: Arc<[f32]>) {
        let bytes = vector.len() * std::mem::size_of::<f32>();
        if bytes > self.max_bytes {
            return;
        }

        let key = CacheKey {
            content_hash,
            model_id: model_id.to_string(),
        };
        let mut state = self.state.lock();

        if let Some(old) = state.entries.remove(&key) {
            state.order.remove(&old.generation);
            state.bytes_used -= old.bytes;
        }

        while state.bytes_used + bytes > self.max_bytes {
            let Some((&oldest, _)) = state.order.iter().next() else {
                break;
            };
            let evicted_key = state.order.remove(&oldest).expect("key present");
            if let Some(evicted) = state.entries.remove(&evicted_key) {
                state.bytes_used -= evicted.bytes;
            }
        }

        let generation = state.next_generation;
        state.next_generation += 1;
        state.order.insert(generation, key.clone());
        state.entries.insert(
            key,
            CacheEntry {
                vector,
                bytes,
                generation,
            },
        );
        state.bytes_used += bytes;
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: state.entries.len(),
            bytes_used: state.bytes_used,
            max_bytes: self.max_bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec_of(len: usize, fill: f32) -> Arc<[f32]> {
        vec![fill; len].into()
    }

    #[test]
    fn test_basic_operations() {
        let cache = EmbeddingCache::new(1024);

        cache.put(1, "m", vec_of(3, 1.0));
        let hit = cache.get(1, "m").unwrap();
        assert_eq!(&*hit, &[1.0, 1.0, 1.0]);

        assert!(cache.get(2, "m").is_none());
        assert!(cache.get(1, "other-model").is_none(), "model id is part of the key");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_lru_eviction() {
        // Room for three 4-float entries (16 bytes each)
        let cache = EmbeddingCache::new(48);

        cache.put(1, "m", vec_of(4, 1.0));
        cache.put(2, "m", vec_of(4, 2.0));
        cache.put(3, "m", vec_of(4, 3.0));
        assert_eq!(cache.len(), 3);

        cache.put(4, "m", vec_of(4, 4.0));
        assert_eq!(cache.len(), 3);
        assert!(cache.get(1, "m").is_none(), "oldest entry evicted");
        assert!(cache.get(4, "m").is_some());
    }

    #[test]
    fn test_access_refreshes_lru_position() {
        let cache = EmbeddingCache::new(32);

        cache.put(1, "m", vec_of(4, 1.0));
        cache.put(2, "m", vec_of(4, 2.0));

        let _ = cache.get(1, "m");
        cache.put(3, "m", vec_of(4, 3.0));

        assert!(cache.get(1, "m").is_some(), "recently read entry survives");
        assert!(cache.get(2, "m").is_none());
    }

    #[test]
    fn test_oversized_entry_not_cached() {
        let cache = EmbeddingCache::new(8);
        cache.put(1, "m", vec_of(100, 1.0));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_last_write_wins() {
        let cache = EmbeddingCache::new(1024);
        cache.put(1, "m", vec_of(2, 1.0));
        cache.put(1, "m", vec_of(2, 9.0));
        assert_eq!(&*cache.get(1, "m").unwrap(), &[9.0, 9.0]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_copy_sharing() {
        let cache = EmbeddingCache::new(1024);
        cache.put(1, "m", vec_of(2, 1.0));
        let a = cache.get(1, "m").unwrap();
        let b = cache.get(1, "m").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
