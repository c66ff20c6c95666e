//! In-memory cache with LRU eviction.

use crate::cache::types::{default_low_water, CacheError, CacheListener, MemoryCacheConfig};
use crate::cache::CacheStats;
use crate::event::{ListenerHandle, ListenerList};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Entry in the memory cache.
#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    /// Declared size in bytes
    size: usize,
    /// Monotonic access tick, the key into the LRU index
    tick: u64,
    /// Wall-clock time of the last access, used by idle pruning
    last_used: Instant,
}

struct Inner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    /// Access tick -> key, oldest first
    lru: BTreeMap<u64, K>,
    next_tick: u64,
    used: usize,
    capacity: usize,
    low_water: usize,
    stats: CacheStats,
}

impl<K: Hash + Eq + Clone, V> Inner<K, V> {
    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn take(&mut self, key: &K) -> Option<(K, V)> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(&entry.tick);
        self.used -= entry.size;
        Some((key.clone(), entry.value))
    }

    /// Evicts oldest entries until `used + incoming <= target`.
    fn evict_to(&mut self, target: usize, incoming: usize, removed: &mut Vec<(K, V)>) {
        let mut count = 0;
        while self.used + incoming > target {
            let Some((_, key)) = self.lru.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.used -= entry.size;
                removed.push((key, entry.value));
                count += 1;
            }
        }
        self.stats.record_evictions(count);
    }

    fn sync_stats(&mut self) {
        let (used, len) = (self.used, self.entries.len());
        self.stats.update_size(used, len);
    }
}

/// Size-bounded, thread-safe object cache keyed by `K`.
///
/// Values are returned by clone, so large payloads are normally stored
/// behind an `Arc`. Capacity and low-water mark are distinct: when an add
/// would exceed the capacity, least-recently-used entries are removed until
/// the resident size plus the new object fits under the low-water mark.
pub struct MemoryCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    listeners: ListenerList<dyn CacheListener<K, V>>,
}

impl<K, V> MemoryCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a cache with the given capacity and an 80% low-water mark.
    pub fn new(capacity_bytes: usize) -> Self {
        Self::with_limits(capacity_bytes, default_low_water(capacity_bytes))
    }

    /// Create a cache from a validated configuration.
    pub fn from_config(config: &MemoryCacheConfig) -> Result<Self, CacheError> {
        config.validate()?;
        Ok(Self::with_limits(config.capacity_bytes, config.low_water()))
    }

    fn with_limits(capacity: usize, low_water: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                lru: BTreeMap::new(),
                next_tick: 0,
                used: 0,
                capacity,
                low_water: low_water.min(capacity),
                stats: CacheStats::new(),
            }),
            listeners: ListenerList::new(),
        }
    }

    /// Add an object, replacing any existing entry under the same key.
    ///
    /// Returns `false` without touching the cache when `size_bytes` exceeds
    /// the capacity.
    pub fn add(&self, key: K, value: V, size_bytes: usize) -> bool {
        let mut removed = Vec::new();
        {
            let mut inner = self.inner.lock();
            if size_bytes > inner.capacity {
                inner.stats.record_rejection();
                debug!(
                    size = size_bytes,
                    capacity = inner.capacity,
                    "Object larger than cache capacity, not cached"
                );
                return false;
            }

            if let Some(old) = inner.take(&key) {
                removed.push(old);
                inner.stats.record_removals(1);
            }

            if inner.used + size_bytes > inner.capacity {
                let target = inner.low_water;
                inner.evict_to(target, size_bytes, &mut removed);
            }

            let tick = inner.bump();
            inner.lru.insert(tick, key.clone());
            inner.entries.insert(
                key,
                CacheEntry {
                    value,
                    size: size_bytes,
                    tick,
                    last_used: Instant::now(),
                },
            );
            inner.used += size_bytes;
            inner.sync_stats();
        }
        self.notify_removed(removed);
        true
    }

    /// Look up an object, marking it most recently used.
    pub fn get_object(&self, key: &K) -> Option<V> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let tick = inner.bump();
        match inner.entries.get_mut(key) {
            Some(entry) => {
                let old_tick = std::mem::replace(&mut entry.tick, tick);
                entry.last_used = Instant::now();
                let value = entry.value.clone();
                inner.lru.remove(&old_tick);
                inner.lru.insert(tick, key.clone());
                inner.stats.record_hit();
                Some(value)
            }
            None => {
                inner.stats.record_miss();
                None
            }
        }
    }

    /// Check presence without affecting recency or statistics.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// Remove an entry, returning whether it was present.
    pub fn remove(&self, key: &K) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            let removed = inner.take(key);
            if removed.is_some() {
                inner.stats.record_removals(1);
                inner.sync_stats();
            }
            removed
        };
        let found = removed.is_some();
        self.notify_removed(removed.into_iter().collect());
        found
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let removed: Vec<(K, V)> = {
            let mut inner = self.inner.lock();
            inner.lru.clear();
            inner.used = 0;
            let removed: Vec<(K, V)> = inner
                .entries
                .drain()
                .map(|(k, e)| (k, e.value))
                .collect();
            inner.stats.record_removals(removed.len());
            inner.sync_stats();
            removed
        };
        self.notify_removed(removed);
    }

    /// Remove entries not accessed within `idle`, returning how many went.
    pub fn remove_unused_since(&self, idle: Duration) -> usize {
        let removed: Vec<(K, V)> = {
            let mut inner = self.inner.lock();
            let stale: Vec<K> = inner
                .entries
                .iter()
                .filter(|(_, e)| e.last_used.elapsed() > idle)
                .map(|(k, _)| k.clone())
                .collect();
            let removed: Vec<(K, V)> = stale.iter().filter_map(|k| inner.take(k)).collect();
            inner.stats.record_evictions(removed.len());
            inner.sync_stats();
            removed
        };
        let count = removed.len();
        self.notify_removed(removed);
        count
    }

    /// Change the capacity, evicting down to the low-water mark if needed.
    ///
    /// A low-water mark above the new capacity is reset to 80% of it.
    pub fn set_capacity(&self, capacity_bytes: usize) {
        let mut removed = Vec::new();
        {
            let mut inner = self.inner.lock();
            inner.capacity = capacity_bytes;
            if inner.low_water > capacity_bytes {
                inner.low_water = default_low_water(capacity_bytes);
            }
            if inner.used > capacity_bytes {
                let target = inner.low_water;
                inner.evict_to(target, 0, &mut removed);
            }
            inner.sync_stats();
        }
        self.notify_removed(removed);
    }

    /// Set the eviction target, clamped to the capacity.
    pub fn set_low_water(&self, low_water_bytes: usize) {
        let mut inner = self.inner.lock();
        inner.low_water = low_water_bytes.min(inner.capacity);
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    pub fn low_water(&self) -> usize {
        self.inner.lock().low_water
    }

    pub fn used_capacity(&self) -> usize {
        self.inner.lock().used
    }

    pub fn free_capacity(&self) -> usize {
        let inner = self.inner.lock();
        inner.capacity.saturating_sub(inner.used)
    }

    pub fn num_objects(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats.clone()
    }

    pub(crate) fn record_pressure_release(&self) {
        self.inner.lock().stats.record_pressure_release();
    }

    pub fn add_cache_listener(&self, listener: Arc<dyn CacheListener<K, V>>) -> ListenerHandle {
        self.listeners.subscribe(listener)
    }

    pub fn remove_cache_listener(&self, handle: ListenerHandle) -> bool {
        self.listeners.unsubscribe(handle)
    }

    fn notify_removed(&self, removed: Vec<(K, V)>) {
        if removed.is_empty() || self.listeners.is_empty() {
            return;
        }
        let listeners = self.listeners.snapshot();
        for (key, value) in &removed {
            for listener in &listeners {
                listener.entry_removed(key, value);
            }
        }
    }
}
