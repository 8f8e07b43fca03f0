//! Size-capped cache with FIFO eviction and optional per-entry TTL.
//!
//! Backs every transient keyed container in the core: the resolution cache,
//! the failed-entity negative cache, and the notification dedup set. Entries
//! are evicted oldest-first when the cap is reached; expired entries are
//! dropped lazily on read and in bulk by the maintenance sweep.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
    seq: u64,
}

#[derive(Debug)]
struct Inner<K, V> {
    map: HashMap<K, Entry<V>>,
    // Insertion order as (key, seq); stale pairs left by re-insertion are
    // skipped during eviction by comparing seq against the live entry.
    order: VecDeque<(K, u64)>,
    next_seq: u64,
}

/// Bounded FIFO cache, optionally expiring entries after a fixed TTL
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    capacity: usize,
    ttl: Option<Duration>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Cache bounded by entry count only
    pub fn new(capacity: usize) -> Self {
        Self::build(capacity, None)
    }

    /// Cache bounded by entry count whose entries expire after `ttl`
    pub fn with_ttl(capacity: usize, ttl: Duration) -> Self {
        Self::build(capacity, Some(ttl))
    }

    fn build(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
                next_seq: 0,
            }),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Look up a live entry, dropping it when expired
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let expired = match inner.map.get(key) {
            Some(entry) => self.is_expired(entry),
            None => return None,
        };
        if expired {
            inner.map.remove(key);
            return None;
        }
        inner.map.get(key).map(|e| e.value.clone())
    }

    /// Insert or replace an entry, evicting oldest-first past capacity
    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.map.insert(
            key.clone(),
            Entry {
                value,
                inserted_at: Instant::now(),
                seq,
            },
        );
        inner.order.push_back((key, seq));
        self.evict_to(&mut inner, self.capacity);
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.lock().map.remove(key).map(|e| e.value)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.order.clear();
    }

    /// Drop expired entries and re-trim to capacity; called by the
    /// maintenance sweep
    pub fn sweep(&self) {
        let mut inner = self.inner.lock();
        if self.ttl.is_some() {
            let expired: Vec<K> = inner
                .map
                .iter()
                .filter(|(_, entry)| self.is_expired(entry))
                .map(|(k, _)| k.clone())
                .collect();
            for key in expired {
                inner.map.remove(&key);
            }
        }
        self.evict_to(&mut inner, self.capacity);
    }

    fn is_expired(&self, entry: &Entry<V>) -> bool {
        match self.ttl {
            Some(ttl) => entry.inserted_at.elapsed() >= ttl,
            None => false,
        }
    }

    fn evict_to(&self, inner: &mut Inner<K, V>, capacity: usize) {
        while inner.map.len() > capacity {
            let Some((key, seq)) = inner.order.pop_front() else {
                break;
            };
            // Skip order pairs superseded by a later re-insertion
            let live = inner.map.get(&key).map(|e| e.seq) == Some(seq);
            if live {
                inner.map.remove(&key);
            }
        }
        // Keep the order queue from accumulating stale pairs unbounded
        if inner.order.len() > inner.map.len().saturating_mul(4) + 16 {
            let map = &inner.map;
            inner
                .order
                .retain(|(key, seq)| map.get(key).map(|e| e.seq) == Some(*seq));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_evicts_oldest_first() {
        let cache = BoundedCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("c", 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn test_reinsert_does_not_double_count() {
        let cache = BoundedCache::new(2);
        cache.insert("a", 1);
        cache.insert("a", 10);
        cache.insert("b", 2);

        // "a" was re-inserted; its stale order pair must not evict the live entry
        cache.insert("c", 3);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn test_ttl_expires_entries() {
        let cache = BoundedCache::with_ttl(10, Duration::from_millis(0));
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn test_sweep_purges_expired() {
        let cache = BoundedCache::with_ttl(10, Duration::from_millis(0));
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.len(), 2);

        cache.sweep();
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_clear_empties_cache() {
        let cache = BoundedCache::new(10);
        cache.insert("a", 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
