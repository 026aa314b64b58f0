//! A bounded key/value cache with least-recently-used eviction.
//!
//! Used by the ledger for its per-slot bid-key index and by bidding agents
//! for their reveal-locator cache. "Used" means both insert and successful
//! lookup; eviction removes the single entry touched longest ago.
//!
//! All operations are O(1) amortized: a hash index locates entries, and a
//! slab-backed doubly-linked list tracks recency. The cache takes `&self`
//! and is safe for concurrent callers; reads may proceed concurrently with
//! each other, writes are exclusive.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;
use thiserror::Error;

/// Cache construction failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    /// Capacity must be at least 1.
    #[error("cache capacity must be positive, got {0}")]
    InvalidCapacity(usize),
}

struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Inner<K, V> {
    map: HashMap<K, usize>,
    nodes: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

/// A fixed-capacity LRU cache.
pub struct LruCache<K, V> {
    inner: RwLock<Inner<K, V>>,
    capacity: usize,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Construct a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Result<Self, CacheError> {
        if capacity == 0 {
            return Err(CacheError::InvalidCapacity(capacity));
        }
        Ok(Self {
            inner: RwLock::new(Inner {
                map: HashMap::new(),
                nodes: Vec::new(),
                free: Vec::new(),
                head: None,
                tail: None,
            }),
            capacity,
        })
    }

    /// The configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).map.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace the value for `key`, returning the entry evicted to
    /// make room, if any. The inserted entry becomes most recently used.
    pub fn put(&self, key: K, value: V) -> Option<(K, V)> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());

        if let Some(&idx) = inner.map.get(&key) {
            let node = inner.nodes[idx].as_mut().expect("indexed node missing");
            node.value = value;
            inner.detach(idx);
            inner.attach_front(idx);
            return None;
        }

        let evicted = if inner.map.len() == self.capacity {
            inner.evict_lru()
        } else {
            None
        };

        let idx = inner.allocate();
        inner.map.insert(key.clone(), idx);
        inner.nodes[idx] = Some(Node {
            key,
            value,
            prev: None,
            next: None,
        });
        inner.attach_front(idx);
        evicted
    }

    /// Fetch the value for `key`, promoting the entry to most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let idx = *inner.map.get(key)?;
        inner.detach(idx);
        inner.attach_front(idx);
        inner.nodes[idx].as_ref().map(|node| node.value.clone())
    }

    /// Look up `key` without changing recency.
    pub fn peek(&self, key: &K) -> Option<V> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let idx = *inner.map.get(key)?;
        inner.nodes[idx].as_ref().map(|node| node.value.clone())
    }

    /// Remove the entry for `key`, returning its value if it was present.
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let idx = inner.map.remove(key)?;
        inner.detach(idx);
        let node = inner.nodes[idx].take().expect("indexed node missing");
        inner.free.push(idx);
        Some(node.value)
    }
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash,
{
    fn allocate(&mut self) -> usize {
        if let Some(idx) = self.free.pop() {
            idx
        } else {
            self.nodes.push(None);
            self.nodes.len() - 1
        }
    }

    fn attach_front(&mut self, idx: usize) {
        let node = self.nodes[idx].as_mut().expect("indexed node missing");
        node.prev = None;
        node.next = self.head;
        if let Some(old) = self.head {
            self.nodes[old].as_mut().expect("head node missing").prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.nodes[idx].as_mut().expect("indexed node missing");
            (node.prev.take(), node.next.take())
        };
        match prev {
            Some(p) => self.nodes[p].as_mut().expect("prev node missing").next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].as_mut().expect("next node missing").prev = prev,
            None => self.tail = prev,
        }
    }

    fn evict_lru(&mut self) -> Option<(K, V)> {
        let idx = self.tail?;
        self.detach(idx);
        let node = self.nodes[idx].take().expect("tail node missing");
        self.map.remove(&node.key);
        self.free.push(idx);
        Some((node.key, node.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_capacity() {
        let cache = LruCache::<u32, u32>::new(0);
        assert!(matches!(cache, Err(CacheError::InvalidCapacity(0))));
    }

    #[test]
    fn evicts_least_recently_used_on_overflow() {
        let cache = LruCache::new(3).unwrap();
        for k in 0..3 {
            cache.put(k, k * 10);
        }
        // Key 0 was inserted first and never touched again.
        let evicted = cache.put(3, 30);
        assert_eq!(evicted, Some((0, 0)));
        assert_eq!(cache.get(&0), None);
        assert_eq!(cache.get(&3), Some(30));
    }

    #[test]
    fn get_promotes_entry() {
        let cache = LruCache::new(2).unwrap();
        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.get(&"a"), Some(1));
        // "b" is now least recently used and should go first.
        let evicted = cache.put("c", 3);
        assert_eq!(evicted, Some(("b", 2)));
        assert_eq!(cache.get(&"a"), Some(1));
    }

    #[test]
    fn put_replaces_without_eviction() {
        let cache = LruCache::new(2).unwrap();
        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.put("a", 9), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), Some(9));
    }

    #[test]
    fn remove_frees_a_slot() {
        let cache = LruCache::new(2).unwrap();
        cache.put(1, "one");
        cache.put(2, "two");
        assert_eq!(cache.remove(&1), Some("one"));
        assert_eq!(cache.remove(&1), None);
        assert_eq!(cache.put(3, "three"), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn peek_does_not_promote() {
        let cache = LruCache::new(2).unwrap();
        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.peek(&"a"), Some(1));
        let evicted = cache.put("c", 3);
        assert_eq!(evicted, Some(("a", 1)));
    }
}
