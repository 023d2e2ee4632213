//! Shared FIFO cache bookkeeping.
//!
//! One discipline for every tier: entries expire after the TTL, total
//! weight never exceeds the cap by more than one entry, and eviction
//! is strictly insertion-ordered. An entry heavier than the whole cap
//! is rejected outright.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How much of the byte budget a value consumes.
pub trait CacheWeight {
    fn weight(&self) -> usize;
}

struct Entry<V> {
    value: V,
    weight: usize,
    inserted_at: Instant,
}

struct Inner<V> {
    map: HashMap<String, Entry<V>>,
    order: VecDeque<String>,
    total_weight: usize,
}

/// TTL + capped FIFO cache. All operations take the one internal lock;
/// weight accounting changes in the same critical section as the map.
pub struct FifoCache<V> {
    inner: Mutex<Inner<V>>,
    ttl: Duration,
    max_entries: usize,
    max_weight: usize,
}

impl<V: Clone + CacheWeight> FifoCache<V> {
    pub fn new(ttl: Duration, max_entries: usize, max_weight: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
                total_weight: 0,
            }),
            ttl,
            max_entries,
            max_weight,
        }
    }

    /// Insert a value; returns false when it alone exceeds the cap.
    pub fn insert(&self, key: String, value: V) -> bool {
        let weight = value.weight();
        if weight > self.max_weight {
            tracing::debug!(key = %key, weight = weight, "Cache entry exceeds cap, rejected");
            return false;
        }

        let mut inner = self.inner.lock().expect("cache lock poisoned");

        // Replacing a key re-inserts it at the back of the order.
        if let Some(old) = inner.map.remove(&key) {
            inner.total_weight -= old.weight;
            inner.order.retain(|k| k != &key);
        }

        while inner.map.len() >= self.max_entries
            || inner.total_weight + weight > self.max_weight
        {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            if let Some(evicted) = inner.map.remove(&oldest) {
                inner.total_weight -= evicted.weight;
            }
        }

        inner.order.push_back(key.clone());
        inner.total_weight += weight;
        inner.map.insert(
            key,
            Entry {
                value,
                weight,
                inserted_at: Instant::now(),
            },
        );
        true
    }

    /// Fetch a live entry; expired entries are removed on the way.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let expired = match inner.map.get(key) {
            Some(entry) => entry.inserted_at.elapsed() >= self.ttl,
            None => return None,
        };
        if expired {
            if let Some(old) = inner.map.remove(key) {
                inner.total_weight -= old.weight;
            }
            inner.order.retain(|k| k != key);
            return None;
        }
        inner.map.get(key).map(|e| e.value.clone())
    }

    pub fn remove(&self, key: &str) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        if let Some(old) = inner.map.remove(key) {
            inner.total_weight -= old.weight;
            inner.order.retain(|k| k != key);
        }
    }

    pub fn flush(&self) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.map.clear();
        inner.order.clear();
        inner.total_weight = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_weight(&self) -> usize {
        self.inner
            .lock()
            .expect("cache lock poisoned")
            .total_weight
    }
}
