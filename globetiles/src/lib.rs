//! GlobeTiles - tiled elevation and imagery for virtual globes
//!
//! Datasets are pyramids of fixed-size tiles served by WMS/WCS endpoints or
//! by local raster files. This library fetches tiles on worker threads,
//! keeps them in a shared memory cache and an on-disk file store, and
//! answers elevation and imagery queries from the best resolution available.
//!
//! # High-Level API
//!
//! ```no_run
//! use std::sync::Arc;
//! use globetiles::config::ConfigFile;
//! use globetiles::filestore::FileStore;
//! use globetiles::model::{ElevationModel, ModelResources, TileCache};
//! use globetiles::retrieve::{ReqwestTransport, RetrievalService};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigFile::load()?;
//! let resources = ModelResources::new(
//!     Arc::new(TileCache::from_config(&config.memory_cache_config())?),
//!     Arc::new(FileStore::new(&config.file_store_config())),
//!     Arc::new(RetrievalService::new(&config.retrieval_config())?),
//! );
//! let retrieval = config.retrieval_config();
//! let transport = Arc::new(ReqwestTransport::new(
//!     retrieval.connect_timeout,
//!     retrieval.read_timeout,
//! )?);
//! let source = config.elevation_source()?.ok_or("no elevation service configured")?;
//! let model = ElevationModel::from_source(
//!     config.elevation_model_config(),
//!     &resources,
//!     source,
//!     transport,
//! )?;
//!
//! // Returns immediately; the tile is fetched in the background.
//! let meters = model.get_elevation(46.5, 8.0);
//! # let _ = meters;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod event;
pub mod filestore;
pub mod geo;
pub mod level;
pub mod logging;
pub mod model;
pub mod raster;
pub mod rasterserver;
pub mod retrieve;
pub mod source;

/// Version of the GlobeTiles library and CLI.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
