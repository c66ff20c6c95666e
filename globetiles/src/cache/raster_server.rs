//! Memory cache for raster server buffers with pressure release and idle
//! pruning.
//!
//! Capacity equals the whole configured budget. When an add would push the
//! resident size past the pressure ceiling, or when the owner reports memory
//! pressure, everything is dropped at once and reconstituted lazily by the
//! cached rasters. A background thread prunes entries that have sat unused
//! for longer than the prune timeout.

use crate::cache::types::{CacheError, CacheListener, RasterServerCacheConfig};
use crate::cache::{CacheStats, MemoryCache};
use crate::event::ListenerHandle;
use parking_lot::Mutex;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shutdown polling granularity for the pruning thread.
const CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Background thread that prunes idle entries.
struct PruneDaemon {
    thread_handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl PruneDaemon {
    fn start<K, V>(
        cache: Arc<MemoryCache<K, V>>,
        timeout: Duration,
        interval: Duration,
    ) -> Result<Self, CacheError>
    where
        K: Hash + Eq + Clone + Send + 'static,
        V: Clone + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);

        let thread_handle = thread::Builder::new()
            .name("raster-cache-prune".to_string())
            .spawn(move || Self::run_loop(cache, timeout, interval, shutdown_clone))?;

        debug!(
            timeout_ms = timeout.as_millis() as u64,
            interval_ms = interval.as_millis() as u64,
            "Raster cache pruning started"
        );

        Ok(Self {
            thread_handle: Some(thread_handle),
            shutdown,
        })
    }

    fn run_loop<K, V>(
        cache: Arc<MemoryCache<K, V>>,
        timeout: Duration,
        interval: Duration,
        shutdown: Arc<AtomicBool>,
    ) where
        K: Hash + Eq + Clone,
        V: Clone,
    {
        let step = interval.min(CHECK_INTERVAL);
        let mut elapsed = Duration::ZERO;

        while !shutdown.load(Ordering::Relaxed) {
            thread::sleep(step);
            elapsed += step;

            if elapsed >= interval {
                elapsed = Duration::ZERO;
                let pruned = cache.remove_unused_since(timeout);
                if pruned > 0 {
                    debug!(
                        pruned,
                        remaining = cache.num_objects(),
                        used_bytes = cache.used_capacity(),
                        "Pruned idle raster buffers"
                    );
                }
            }
        }

        debug!("Raster cache pruning stopped");
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread_handle.take() {
            if let Err(e) = handle.join() {
                warn!("Raster cache prune thread panicked: {:?}", e);
            }
        }
    }
}

/// Budgeted cache shared by the rasters of a local raster server.
pub struct RasterServerCache<K, V> {
    cache: Arc<MemoryCache<K, V>>,
    ceiling_bytes: usize,
    /// Serializes the ceiling check with the insert it guards
    add_lock: Mutex<()>,
    pruner: Mutex<Option<PruneDaemon>>,
}

impl<K, V> RasterServerCache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Create the cache and start its pruning thread.
    pub fn new(config: RasterServerCacheConfig) -> Result<Self, CacheError> {
        config.validate()?;
        // Low water equals capacity: the pressure ceiling does the shedding.
        let cache = Arc::new(MemoryCache::new(config.budget_bytes));
        cache.set_low_water(config.budget_bytes);

        let pruner = PruneDaemon::start(
            Arc::clone(&cache),
            config.prune_timeout,
            config.prune_interval,
        )?;

        info!(
            budget_bytes = config.budget_bytes,
            ceiling_bytes = config.ceiling_bytes(),
            "Raster server cache created"
        );

        Ok(Self {
            cache,
            ceiling_bytes: config.ceiling_bytes(),
            add_lock: Mutex::new(()),
            pruner: Mutex::new(Some(pruner)),
        })
    }

    /// Add a buffer, releasing the whole cache first when the add would
    /// cross the pressure ceiling.
    ///
    /// Removal listeners run while adds are held off and must not add to
    /// this cache.
    pub fn add(&self, key: K, value: V, size_bytes: usize) -> bool {
        let _adding = self.add_lock.lock();
        let resident = self.cache.used_capacity();
        if resident > 0 && resident + size_bytes > self.ceiling_bytes {
            self.release(resident);
        }
        self.cache.add(key, value, size_bytes)
    }

    pub fn get_object(&self, key: &K) -> Option<V> {
        self.cache.get_object(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.cache.contains(key)
    }

    pub fn remove(&self, key: &K) -> bool {
        self.cache.remove(key)
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Drop the entire contents in response to external memory pressure.
    pub fn on_memory_pressure(&self) {
        let resident = self.cache.used_capacity();
        self.release(resident);
    }

    fn release(&self, resident: usize) {
        warn!(
            resident_bytes = resident,
            ceiling_bytes = self.ceiling_bytes,
            entries = self.cache.num_objects(),
            "Memory pressure, releasing raster server cache"
        );
        self.cache.record_pressure_release();
        self.cache.clear();
    }

    pub fn used_capacity(&self) -> usize {
        self.cache.used_capacity()
    }

    pub fn capacity(&self) -> usize {
        self.cache.capacity()
    }

    pub fn num_objects(&self) -> usize {
        self.cache.num_objects()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn add_cache_listener(&self, listener: Arc<dyn CacheListener<K, V>>) -> ListenerHandle {
        self.cache.add_cache_listener(listener)
    }

    pub fn remove_cache_listener(&self, handle: ListenerHandle) -> bool {
        self.cache.remove_cache_listener(handle)
    }

    /// Stop the pruning thread. Idempotent.
    pub fn shutdown(&self) {
        if let Some(mut pruner) = self.pruner.lock().take() {
            pruner.stop();
        }
    }

    pub fn is_pruning(&self) -> bool {
        self.pruner.lock().is_some()
    }
}

impl<K, V> Drop for RasterServerCache<K, V> {
    fn drop(&mut self) {
        if let Some(mut pruner) = self.pruner.get_mut().take() {
            pruner.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn quiet_config(budget: usize) -> RasterServerCacheConfig {
        RasterServerCacheConfig::new(budget)
            .with_prune_timing(Duration::from_secs(60), Duration::from_secs(60))
    }

    #[test]
    fn test_pressure_ceiling_drops_everything() {
        let cache: RasterServerCache<u32, Arc<Vec<u8>>> =
            RasterServerCache::new(quiet_config(100)).unwrap();
        let dropped = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&dropped);
        cache.add_cache_listener(Arc::new(move |_: &u32, _: &Arc<Vec<u8>>| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(cache.add(1, Arc::new(vec![0; 50]), 50));
        assert!(cache.add(2, Arc::new(vec![0; 30]), 30));
        assert_eq!(cache.used_capacity(), 80);

        // 80 + 20 > 90: everything goes, then the new entry lands.
        assert!(cache.add(3, Arc::new(vec![0; 20]), 20));
        assert_eq!(cache.num_objects(), 1);
        assert!(cache.contains(&3));
        assert_eq!(dropped.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().pressure_releases, 1);
    }

    #[test]
    fn test_concurrent_adds_stay_under_ceiling() {
        let cache: Arc<RasterServerCache<u32, u32>> =
            Arc::new(RasterServerCache::new(quiet_config(100)).unwrap());
        let peak = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..8u32)
            .map(|t| {
                let cache = Arc::clone(&cache);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    for i in 0..500u32 {
                        cache.add(t * 1000 + i, i, 10);
                        peak.fetch_max(cache.used_capacity(), Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 90);
        assert!(cache.used_capacity() <= 90);
        assert!(cache.stats().pressure_releases > 0);
    }

    #[test]
    fn test_on_memory_pressure_clears() {
        let cache: RasterServerCache<u32, u32> = RasterServerCache::new(quiet_config(100)).unwrap();
        cache.add(1, 1, 10);
        cache.add(2, 2, 10);

        cache.on_memory_pressure();
        assert_eq!(cache.num_objects(), 0);
        assert_eq!(cache.used_capacity(), 0);
    }

    #[test]
    fn test_prunes_idle_entries() {
        let config = RasterServerCacheConfig::new(100)
            .with_prune_timing(Duration::from_millis(30), Duration::from_millis(20));
        let cache: RasterServerCache<u32, u32> = RasterServerCache::new(config).unwrap();
        cache.add(1, 1, 10);

        let mut waited = Duration::ZERO;
        while cache.contains(&1) && waited < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(20));
            waited += Duration::from_millis(20);
        }
        assert!(!cache.contains(&1), "Idle entry should have been pruned");
    }

    #[test]
    fn test_shutdown_stops_pruning() {
        let cache: RasterServerCache<u32, u32> = RasterServerCache::new(quiet_config(100)).unwrap();
        assert!(cache.is_pruning());
        cache.shutdown();
        assert!(!cache.is_pruning());
        cache.shutdown();
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result: Result<RasterServerCache<u32, u32>, _> =
            RasterServerCache::new(RasterServerCacheConfig::new(0));
        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
    }
}
