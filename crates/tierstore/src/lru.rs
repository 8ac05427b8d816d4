//! Byte-weighted LRU used as the RAM tier of each pool
//!
//! Uses an index-linked list for O(1) promotion and eviction. Evicted
//! entries are handed back to the caller so they can be demoted.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use ahash::RandomState;

struct Entry<K, V> {
    key: K,
    value: V,
    weight: usize,
    newer: Option<usize>,
    older: Option<usize>,
}

/// LRU cache bounded by total entry weight
pub struct LruCache<K, V> {
    index: HashMap<K, usize, RandomState>,
    slots: Vec<Option<Entry<K, V>>>,
    vacant: Vec<usize>,
    // Most and least recently used slots
    newest: Option<usize>,
    oldest: Option<usize>,
    weight: usize,
    capacity: usize,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create a new LRU cache holding at most `capacity` weight units
    pub fn new(capacity: usize) -> Self {
        Self {
            index: HashMap::with_hasher(RandomState::new()),
            slots: Vec::new(),
            vacant: Vec::new(),
            newest: None,
            oldest: None,
            weight: 0,
            capacity,
        }
    }

    /// Get a value and mark it most recently used
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = *self.index.get(key)?;
        self.touch(slot);
        self.slots[slot].as_ref().map(|e| &e.value)
    }

    /// Insert or replace `key`, returning whatever had to be evicted.
    ///
    /// An entry heavier than the whole cache is returned immediately
    /// without being stored.
    pub fn put(&mut self, key: K, value: V, weight: usize) -> Vec<(K, V)> {
        if weight > self.capacity {
            self.remove(&key);
            return vec![(key, value)];
        }

        match self.index.get(&key).copied() {
            Some(slot) => {
                if let Some(entry) = self.slots[slot].as_mut() {
                    self.weight = self.weight - entry.weight + weight;
                    entry.value = value;
                    entry.weight = weight;
                }
                self.touch(slot);
            }
            None => {
                let slot = self.vacant.pop().unwrap_or_else(|| {
                    self.slots.push(None);
                    self.slots.len() - 1
                });
                self.slots[slot] = Some(Entry {
                    key: key.clone(),
                    value,
                    weight,
                    newer: None,
                    older: None,
                });
                self.link_newest(slot);
                self.index.insert(key, slot);
                self.weight += weight;
            }
        }

        let mut evicted = Vec::new();
        while self.weight > self.capacity {
            let Some(slot) = self.oldest else { break };
            let Some(entry) = self.detach(slot) else { break };
            self.index.remove(&entry.key);
            evicted.push((entry.key, entry.value));
        }
        evicted
    }

    /// Remove a key from the cache
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = self.index.remove(key)?;
        self.detach(slot).map(|e| e.value)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Total weight currently held
    pub fn weight(&self) -> usize {
        self.weight
    }

    fn touch(&mut self, slot: usize) {
        if self.newest != Some(slot) {
            self.unlink(slot);
            self.link_newest(slot);
        }
    }

    fn link_newest(&mut self, slot: usize) {
        let previous = self.newest;
        if let Some(entry) = self.slots[slot].as_mut() {
            entry.newer = None;
            entry.older = previous;
        }
        match previous.and_then(|p| self.slots[p].as_mut()) {
            Some(prev) => prev.newer = Some(slot),
            None => self.oldest = Some(slot),
        }
        self.newest = Some(slot);
    }

    fn unlink(&mut self, slot: usize) {
        let Some((newer, older)) = self.slots[slot].as_ref().map(|e| (e.newer, e.older)) else {
            return;
        };
        match newer.and_then(|n| self.slots[n].as_mut()) {
            Some(n) => n.older = older,
            None => self.newest = older,
        }
        match older.and_then(|o| self.slots[o].as_mut()) {
            Some(o) => o.newer = newer,
            None => self.oldest = newer,
        }
    }

    /// Unlink `slot`, free it and hand back its entry
    fn detach(&mut self, slot: usize) -> Option<Entry<K, V>> {
        self.unlink(slot);
        let entry = self.slots[slot].take()?;
        self.vacant.push(slot);
        self.weight -= entry.weight;
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_basic() {
        let mut cache = LruCache::new(10);

        assert!(cache.put(1, "a", 4).is_empty());
        assert!(cache.put(2, "b", 4).is_empty());

        assert_eq!(cache.get(&1), Some(&"a"));
        assert_eq!(cache.get(&2), Some(&"b"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.weight(), 8);
    }

    #[test]
    fn test_lru_evicts_by_weight() {
        let mut cache = LruCache::new(10);

        cache.put(1, "a", 4);
        cache.put(2, "b", 4);
        let evicted = cache.put(3, "c", 4);

        assert_eq!(evicted, vec![(1, "a")]);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&3), Some(&"c"));
        assert_eq!(cache.weight(), 8);
    }

    #[test]
    fn test_lru_heavy_insert_evicts_several() {
        let mut cache = LruCache::new(10);

        cache.put(1, "a", 3);
        cache.put(2, "b", 3);
        cache.put(3, "c", 3);
        let evicted = cache.put(4, "d", 8);

        assert_eq!(evicted, vec![(1, "a"), (2, "b"), (3, "c")]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lru_recency_order() {
        let mut cache = LruCache::new(2);

        cache.put(1, "a", 1);
        cache.put(2, "b", 1);
        cache.get(&1);
        let evicted = cache.put(3, "c", 1);

        assert_eq!(evicted, vec![(2, "b")]);
        assert_eq!(cache.get(&1), Some(&"a"));
    }

    #[test]
    fn test_lru_oversized_rejected() {
        let mut cache = LruCache::new(4);

        cache.put(1, "a", 2);
        let evicted = cache.put(2, "big", 5);

        assert_eq!(evicted, vec![(2, "big")]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lru_overwrite_reweighs() {
        let mut cache = LruCache::new(10);

        cache.put(1, "a", 2);
        cache.put(1, "b", 7);

        assert_eq!(cache.get(&1), Some(&"b"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.weight(), 7);
    }

    #[test]
    fn test_lru_remove() {
        let mut cache = LruCache::new(10);

        cache.put(1, "a", 1);
        cache.put(2, "b", 1);

        assert_eq!(cache.remove(&2), Some("b"));
        assert_eq!(cache.remove(&2), None);
        assert_eq!(cache.weight(), 1);
        assert!(!cache.is_empty());
    }
}
