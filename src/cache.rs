use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Key → (value, expiry) map with explicit invalidation.
///
/// Every operation has an `_at` variant taking the current instant so
/// expiry can be exercised without sleeping.
pub struct TtlCache<K, V> {
    entries: HashMap<K, Entry<V>>,
}

impl<K, V> Default for TtlCache<K, V> {
    fn default() -> Self {
        TtlCache {
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Returns a live entry; an expired one is evicted.
    pub fn get_at(&mut self, key: &K, now: Instant) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&mut self, key: K, value: V, ttl: Duration) {
        self.insert_at(key, value, ttl, Instant::now());
    }

    pub fn insert_at(&mut self, key: K, value: V, ttl: Duration, now: Instant) {
        let expires_at = now.checked_add(ttl).unwrap_or(now);
        self.entries.insert(key, Entry { value, expires_at });
    }

    pub fn get_or_compute<F>(&mut self, key: K, ttl: Duration, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        self.get_or_compute_at(key, ttl, Instant::now(), compute)
    }

    pub fn get_or_compute_at<F>(&mut self, key: K, ttl: Duration, now: Instant, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get_at(&key, now) {
            return value;
        }
        let value = compute();
        self.insert_at(key, value.clone(), ttl, now);
        value
    }

    /// Drop every entry, related to the current key or not.
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
