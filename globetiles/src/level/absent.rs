//! Tracking of resources that failed to retrieve.
//!
//! A failed key is absent until `min_check_interval` passes. Once it has
//! failed `max_tries` times in a row it stays absent until
//! `try_again_interval` passes, or for good when that interval is `None`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tracing::debug;

/// Absent list thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsentConfig {
    pub max_tries: u32,
    pub min_check_interval: Duration,
    pub try_again_interval: Option<Duration>,
}

impl Default for AbsentConfig {
    fn default() -> Self {
        Self {
            max_tries: 3,
            min_check_interval: Duration::from_secs(10),
            try_again_interval: Some(Duration::from_secs(60)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct AbsentEntry {
    tries: u32,
    last_try: Instant,
}

/// Thread-safe set of keys whose retrieval recently failed.
#[derive(Debug)]
pub struct AbsentResourceList<K> {
    entries: Mutex<HashMap<K, AbsentEntry>>,
    config: AbsentConfig,
}

impl<K: Hash + Eq + Clone + std::fmt::Debug> AbsentResourceList<K> {
    pub fn new(config: AbsentConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &AbsentConfig {
        &self.config
    }

    /// Record a failed attempt.
    pub fn mark_absent(&self, key: &K) {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.clone()).or_insert(AbsentEntry {
            tries: 0,
            last_try: Instant::now(),
        });
        entry.tries = entry.tries.saturating_add(1);
        entry.last_try = Instant::now();
        if entry.tries == self.config.max_tries {
            debug!(key = ?key, tries = entry.tries, "Resource reached absent try limit");
        }
    }

    /// Forget any failures recorded for `key`.
    pub fn unmark_absent(&self, key: &K) {
        self.entries.lock().remove(key);
    }

    /// Whether `key` should not be requested right now.
    pub fn is_absent(&self, key: &K) -> bool {
        let entries = self.entries.lock();
        let Some(entry) = entries.get(key) else {
            return false;
        };
        let since = entry.last_try.elapsed();
        if entry.tries >= self.config.max_tries {
            match self.config.try_again_interval {
                Some(interval) => since < interval,
                None => true,
            }
        } else {
            since < self.config.min_check_interval
        }
    }

    /// Consecutive failures recorded for `key`.
    pub fn tries(&self, key: &K) -> u32 {
        self.entries.lock().get(key).map_or(0, |e| e.tries)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
