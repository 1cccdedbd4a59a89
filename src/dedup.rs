use lru::LruCache;
use std::hash::Hash;

pub const DEFAULT_CAPACITY: usize = 1000;
pub const DEFAULT_EVICT_BATCH: usize = 100;

/// Bounded set of keys that have already been alerted.
///
/// Entries are never promoted on lookup, so the LRU end is always the
/// oldest insertion and overflow drops the oldest batch first.
pub struct DedupCache<K> {
    capacity: usize,
    evict_batch: usize,
    entries: LruCache<K, ()>,
}

impl<K> DedupCache<K>
where
    K: Hash + Eq,
{
    pub fn new(capacity: usize, evict_batch: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            evict_batch: evict_batch.max(1),
            entries: LruCache::unbounded(),
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    pub fn insert(&mut self, key: K) {
        if self.entries.contains(&key) {
            return;
        }
        self.entries.put(key, ());
        if self.entries.len() > self.capacity {
            self.evict_some();
        }
    }

    /// Drops the oldest `evict_batch` entries, or more if that is still not
    /// enough to get back under capacity.
    pub fn evict_some(&mut self) {
        let overflow = self.entries.len().saturating_sub(self.capacity);
        let count = self.evict_batch.max(overflow).min(self.entries.len());
        for _ in 0..count {
            self.entries.pop_lru();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
