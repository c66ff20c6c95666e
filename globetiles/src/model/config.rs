//! Model configuration and shared resources.

use std::sync::Arc;

use super::error::ModelError;
use super::fetcher::TileCache;
use crate::filestore::FileStore;
use crate::geo::LatLon;
use crate::level::LevelSetConfig;
use crate::raster::{ByteOrder, DataType};
use crate::retrieve::RetrievalService;

/// Signal used by SRTM-style datasets for voids.
pub const DEFAULT_MISSING_DATA_SIGNAL: f64 = -32768.0;

/// Threads decoding tiles found in the file store.
pub const DEFAULT_DISK_LOAD_THREADS: usize = 2;

/// Configuration of a tiled elevation model.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationModelConfig {
    pub dataset_name: String,
    pub level_set: LevelSetConfig,
    pub data_type: DataType,
    pub byte_order: ByteOrder,
    /// Raw sample value meaning "no data"
    pub missing_data_signal: f64,
    /// Value reported in place of missing data by mapped queries
    pub missing_data_replacement: f64,
    pub min_elevation: f64,
    pub max_elevation: f64,
    pub disk_load_threads: usize,
}

impl ElevationModelConfig {
    pub fn new(dataset_name: impl Into<String>, level_set: LevelSetConfig) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            level_set,
            data_type: DataType::Int16,
            byte_order: ByteOrder::LittleEndian,
            missing_data_signal: DEFAULT_MISSING_DATA_SIGNAL,
            missing_data_replacement: 0.0,
            min_elevation: -11000.0,
            max_elevation: 8850.0,
            disk_load_threads: DEFAULT_DISK_LOAD_THREADS,
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.dataset_name.is_empty() {
            return Err(ModelError::InvalidConfig("dataset name is required".into()));
        }
        if self.min_elevation > self.max_elevation {
            return Err(ModelError::InvalidConfig(format!(
                "minimum elevation {} exceeds maximum {}",
                self.min_elevation, self.max_elevation
            )));
        }
        if self.level_set.tile_width < 2 || self.level_set.tile_height < 2 {
            return Err(ModelError::InvalidConfig(
                "elevation tiles need at least 2x2 samples".into(),
            ));
        }
        if self.disk_load_threads == 0 {
            return Err(ModelError::InvalidConfig(
                "at least one disk load thread is required".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ElevationModelConfig {
    /// Global 16-bit elevations in 20 degree level-zero tiles of 150 samples.
    fn default() -> Self {
        Self::new(
            "Earth Elevation",
            LevelSetConfig::new("Earth/Elevation", LatLon::new(20.0, 20.0), 12, 150),
        )
    }
}

/// Configuration of a tiled imagery model.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageryModelConfig {
    pub dataset_name: String,
    /// Level set; its format suffix names the encoded image type
    pub level_set: LevelSetConfig,
    pub disk_load_threads: usize,
}

impl ImageryModelConfig {
    pub fn new(dataset_name: impl Into<String>, level_set: LevelSetConfig) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            level_set,
            disk_load_threads: DEFAULT_DISK_LOAD_THREADS,
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.dataset_name.is_empty() {
            return Err(ModelError::InvalidConfig("dataset name is required".into()));
        }
        if self.disk_load_threads == 0 {
            return Err(ModelError::InvalidConfig(
                "at least one disk load thread is required".into(),
            ));
        }
        Ok(())
    }
}

/// Caches and services shared by every model of an application.
#[derive(Clone)]
pub struct ModelResources {
    pub memory_cache: Arc<TileCache>,
    pub file_store: Arc<FileStore>,
    pub retrieval: Arc<RetrievalService>,
}

impl ModelResources {
    pub fn new(
        memory_cache: Arc<TileCache>,
        file_store: Arc<FileStore>,
        retrieval: Arc<RetrievalService>,
    ) -> Self {
        Self {
            memory_cache,
            file_store,
            retrieval,
        }
    }
}
