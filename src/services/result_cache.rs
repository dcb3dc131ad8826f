// Result Cache
// Bounded, time-expiring store shared by all detectors.
// Eviction is by insertion order only; reads never refresh an entry.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub const DEFAULT_CACHE_CAPACITY: usize = 200;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: Instant,
}

#[derive(Debug)]
struct CacheState<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    order: VecDeque<K>,
}

#[derive(Debug)]
pub struct ResultCache<K, V> {
    capacity: usize,
    ttl: Duration,
    state: Mutex<CacheState<K, V>>,
}

impl<K, V> Default for ResultCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL)
    }
}

impl<K, V> ResultCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<K, V>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let mut state = self.lock();
        let expired = match state.entries.get(key) {
            None => return None,
            Some(entry) => now.saturating_duration_since(entry.inserted_at) >= self.ttl,
        };
        if expired {
            state.entries.remove(key);
            state.order.retain(|k| k != key);
            return None;
        }
        state.entries.get(key).map(|e| e.value.clone())
    }

    pub fn set(&self, key: K, value: V) {
        self.set_at(key, value, Instant::now());
    }

    pub fn set_at(&self, key: K, value: V, now: Instant) {
        let mut state = self.lock();
        if let Some(entry) = state.entries.get_mut(&key) {
            entry.value = value;
            entry.inserted_at = now;
            return;
        }
        if state.entries.len() >= self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.entries.remove(&oldest);
            }
        }
        state.order.push_back(key.clone());
        state.entries.insert(key, CacheEntry { value, inserted_at: now });
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.order.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
