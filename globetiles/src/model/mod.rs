//! Elevation and imagery models.
//!
//! Both models share one fetch pipeline, [`TileFetcher`], parameterized by
//! a [`RetrieverFactory`](crate::retrieve::RetrieverFactory) and a tile
//! decoder. Tiles flow from the memory cache, the file store or the
//! retrieval service; arrivals are announced through [`ModelEvent`]s.

mod config;
mod elevation;
mod error;
mod fetcher;
mod imagery;

pub use config::{
    ElevationModelConfig, ImageryModelConfig, ModelResources, DEFAULT_DISK_LOAD_THREADS,
    DEFAULT_MISSING_DATA_SIGNAL,
};
pub use elevation::ElevationModel;
pub use error::ModelError;
pub use fetcher::{CachedTile, FetcherStats, ModelEvent, TileCache, TileDecoder, TileFetcher};
pub use imagery::ImageryModel;
