//! Bounded FIFO cache for query-text embeddings.
//!
//! Retrieval embeds the same query strings repeatedly (agents retry and
//! rephrase); caching the text-to-vector mapping avoids redundant provider
//! calls. The cache is injected by the caller, never a hidden singleton, so
//! tests can hand each run a fresh instance. A miss is always tolerable:
//! it only costs one extra embedding call.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Mutex-guarded FIFO map from query text to embedding vector.
///
/// Insertion past `capacity` evicts the oldest entry. Safe for concurrent
/// read/insert across ranking requests.
pub struct EmbeddingCache {
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    map: HashMap<String, Vec<f32>>,
    order: VecDeque<String>,
    capacity: usize,
}

impl EmbeddingCache {
    /// A cache holding at most `capacity` entries. Zero capacity disables
    /// storage entirely (every lookup misses).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
                capacity,
            }),
        }
    }

    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        let inner = self.inner.lock().expect("cache mutex poisoned");
        inner.map.get(text).cloned()
    }

    pub fn insert(&self, text: &str, vector: Vec<f32>) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        if inner.capacity == 0 {
            return;
        }
        if inner.map.contains_key(text) {
            inner.map.insert(text.to_string(), vector);
            return;
        }
        while inner.map.len() >= inner.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.map.remove(&oldest);
            } else {
                break;
            }
        }
        inner.order.push_back(text.to_string());
        inner.map.insert(text.to_string(), vector);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache mutex poisoned").map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
