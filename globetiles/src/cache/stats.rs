//! Cache statistics tracking and reporting.

use std::time::Instant;

/// Cache statistics for monitoring and debugging.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to make room for new ones
    pub evictions: u64,
    /// Entries removed explicitly, by replacement or by `clear`
    pub removals: u64,
    /// Objects refused because they exceed the capacity
    pub rejections: u64,
    /// Full releases triggered by memory pressure
    pub pressure_releases: u64,
    pub used_bytes: usize,
    pub entry_count: usize,
    pub created_at: Instant,
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStats {
    pub fn new() -> Self {
        Self {
            hits: 0,
            misses: 0,
            evictions: 0,
            removals: 0,
            rejections: 0,
            pressure_releases: 0,
            used_bytes: 0,
            entry_count: 0,
            created_at: Instant::now(),
        }
    }

    /// Hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    pub fn record_removals(&mut self, count: usize) {
        self.removals += count as u64;
    }

    pub fn record_rejection(&mut self) {
        self.rejections += 1;
    }

    pub fn record_pressure_release(&mut self) {
        self.pressure_releases += 1;
    }

    /// Update the resident size snapshot.
    pub fn update_size(&mut self, used_bytes: usize, entry_count: usize) {
        self.used_bytes = used_bytes;
        self.entry_count = entry_count;
    }
}
