//! Memoization of assembled contexts by (query, breadth).
//!
//! The cache fills monotonically: once it holds `capacity` entries new keys are not
//! admitted and nothing is ever evicted. Entries already present may be overwritten,
//! which makes concurrent misses on the same key harmless.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

pub const DEFAULT_CACHE_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    query: String,
    k: usize,
}

#[derive(Debug)]
pub struct ResultCache {
    capacity: usize,
    entries: RwLock<HashMap<CacheKey, String>>,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, query: &str, k: usize) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&CacheKey {
                query: query.to_string(),
                k,
            })
            .cloned()
    }

    /// Store a context. Returns false when the cache is full and the key is new.
    pub fn insert(&self, query: &str, k: usize, context: String) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let key = CacheKey {
            query: query.to_string(),
            k,
        };

        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            debug!(capacity = self.capacity, "Result cache full, not admitting entry");
            return false;
        }

        entries.insert(key, context);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
