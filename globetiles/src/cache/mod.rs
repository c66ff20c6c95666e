//! Memory caches.
//!
//! [`MemoryCache`] is the size-bounded LRU object cache shared by the models;
//! [`RasterServerCache`] is its budgeted variant for local raster buffers,
//! with an explicit memory-pressure release and idle pruning.

mod memory;
mod raster_server;
mod stats;
mod types;

pub use memory::MemoryCache;
pub use raster_server::RasterServerCache;
pub use stats::CacheStats;
pub use types::{
    CacheError, CacheListener, MemoryCacheConfig, RasterServerCacheConfig,
    DEFAULT_LOW_WATER_FRACTION, DEFAULT_PRESSURE_CEILING_FRACTION,
};
