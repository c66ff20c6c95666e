//! Core types and configuration for the cache system.

use std::time::Duration;
use thiserror::Error;

/// Default low-water mark as a fraction of capacity.
pub const DEFAULT_LOW_WATER_FRACTION: f64 = 0.8;

/// Default pressure ceiling as a fraction of the raster server budget.
pub const DEFAULT_PRESSURE_CEILING_FRACTION: f64 = 0.9;

/// Cache-related errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Invalid cache configuration
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),

    /// The background pruning thread could not be started
    #[error("Failed to start cache pruning thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Receives every entry that leaves a cache.
///
/// Called exactly once per removed entry, after the cache has released its
/// internal lock, whether the entry was removed explicitly, cleared,
/// replaced or evicted.
pub trait CacheListener<K, V>: Send + Sync {
    fn entry_removed(&self, key: &K, value: &V);
}

impl<K, V, F> CacheListener<K, V> for F
where
    F: Fn(&K, &V) + Send + Sync,
{
    fn entry_removed(&self, key: &K, value: &V) {
        self(key, value)
    }
}

/// Memory cache configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryCacheConfig {
    /// Maximum resident size in bytes (default: 512 MB)
    pub capacity_bytes: usize,
    /// Eviction target in bytes; `None` means 80% of capacity
    pub low_water_bytes: Option<usize>,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: 512 * 1024 * 1024,
            low_water_bytes: None,
        }
    }
}

impl MemoryCacheConfig {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            capacity_bytes,
            low_water_bytes: None,
        }
    }

    pub fn with_low_water(mut self, bytes: usize) -> Self {
        self.low_water_bytes = Some(bytes);
        self
    }

    /// Effective low-water mark.
    pub fn low_water(&self) -> usize {
        self.low_water_bytes
            .unwrap_or_else(|| default_low_water(self.capacity_bytes))
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if self.capacity_bytes == 0 {
            return Err(CacheError::InvalidConfig(
                "capacity must be greater than zero".to_string(),
            ));
        }
        if self.low_water() > self.capacity_bytes {
            return Err(CacheError::InvalidConfig(format!(
                "low-water mark {} exceeds capacity {}",
                self.low_water(),
                self.capacity_bytes
            )));
        }
        Ok(())
    }
}

/// Raster server cache configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterServerCacheConfig {
    /// Total memory budget in bytes; also the cache capacity
    pub budget_bytes: usize,
    /// Fraction of the budget above which the whole cache is released
    pub pressure_ceiling: f64,
    /// Entries idle for longer than this are pruned (default: 20s)
    pub prune_timeout: Duration,
    /// How often the pruning thread runs (default: 5s)
    pub prune_interval: Duration,
}

impl Default for RasterServerCacheConfig {
    fn default() -> Self {
        Self {
            budget_bytes: 256 * 1024 * 1024,
            pressure_ceiling: DEFAULT_PRESSURE_CEILING_FRACTION,
            prune_timeout: Duration::from_secs(20),
            prune_interval: Duration::from_secs(5),
        }
    }
}

impl RasterServerCacheConfig {
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            budget_bytes,
            ..Default::default()
        }
    }

    pub fn with_prune_timing(mut self, timeout: Duration, interval: Duration) -> Self {
        self.prune_timeout = timeout;
        self.prune_interval = interval;
        self
    }

    /// Resident size that triggers a full release.
    pub fn ceiling_bytes(&self) -> usize {
        (self.budget_bytes as f64 * self.pressure_ceiling) as usize
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if self.budget_bytes == 0 {
            return Err(CacheError::InvalidConfig(
                "raster server budget must be greater than zero".to_string(),
            ));
        }
        if !(self.pressure_ceiling > 0.0 && self.pressure_ceiling <= 1.0) {
            return Err(CacheError::InvalidConfig(format!(
                "pressure ceiling {} must be in (0, 1]",
                self.pressure_ceiling
            )));
        }
        if self.prune_interval.is_zero() {
            return Err(CacheError::InvalidConfig(
                "prune interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn default_low_water(capacity: usize) -> usize {
    (capacity as f64 * DEFAULT_LOW_WATER_FRACTION) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_cache_config_default_low_water() {
        let config = MemoryCacheConfig::new(1000);
        assert_eq!(config.low_water(), 800);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_memory_cache_config_rejects_low_water_above_capacity() {
        let config = MemoryCacheConfig::new(1000).with_low_water(1500);
        assert!(matches!(
            config.validate(),
            Err(CacheError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_raster_server_config_defaults() {
        let config = RasterServerCacheConfig::new(1000);
        assert_eq!(config.ceiling_bytes(), 900);
        assert_eq!(config.prune_timeout, Duration::from_secs(20));
        assert_eq!(config.prune_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_raster_server_config_rejects_bad_ceiling() {
        let mut config = RasterServerCacheConfig::new(1000);
        config.pressure_ceiling = 1.5;
        assert!(config.validate().is_err());
    }
}
