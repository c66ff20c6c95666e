//! Settings structs, one per `[section]` of the config file.

use std::path::PathBuf;

use crate::raster::{ByteOrder, DataType};

/// Complete application configuration loaded from `config.ini`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub cache: CacheSettings,
    pub file_store: FileStoreSettings,
    pub retrieval: RetrievalSettings,
    pub elevation: ElevationSettings,
    pub logging: LoggingSettings,
}

/// `[cache]`: in-memory caches.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    /// Tile memory cache capacity in bytes
    pub memory_size: usize,
    /// Percent of capacity eviction brings usage down to
    pub low_water_percent: u8,
    /// Budget of the local raster server cache in bytes
    pub raster_server_size: usize,
}

/// `[file_store]`: on-disk tile locations.
#[derive(Debug, Clone, PartialEq)]
pub struct FileStoreSettings {
    /// Candidate writable locations as `base[:sub/path]`, first usable wins
    pub write_locations: Vec<String>,
    /// Read-only locations searched after the write location
    pub read_locations: Vec<String>,
    /// Root of bundled resources
    pub bundled_root: Option<PathBuf>,
    /// Size limit of the write location in bytes
    pub max_size: usize,
}

/// `[retrieval]`: network fetching.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalSettings {
    pub threads: usize,
    pub queue_capacity: usize,
    pub stale_request_secs: u64,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Connection failures before a host is considered down
    pub attempt_limit: u32,
    pub try_again_secs: u64,
    pub offline: bool,
}

/// Protocol of the elevation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Wms,
    Wcs,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wms => "wms",
            Self::Wcs => "wcs",
        }
    }
}

/// `[elevation]`: the elevation dataset and its service.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationSettings {
    pub dataset_name: String,
    /// Directory name of the dataset inside the file store
    pub cache_name: String,
    /// Request endpoint; empty means no network source
    pub service_url: String,
    pub service: ServiceKind,
    pub version: String,
    /// WMS layer or WCS coverage
    pub layer: String,
    /// Requested MIME type
    pub format: String,
    pub tile_width: u32,
    pub tile_height: u32,
    /// Level-zero tile extent in degrees
    pub level_zero_delta: f64,
    pub num_levels: usize,
    pub num_empty_levels: usize,
    pub data_type: DataType,
    pub byte_order: ByteOrder,
    pub missing_data_signal: f64,
    pub missing_data_replacement: f64,
    pub min_elevation: f64,
    pub max_elevation: f64,
    /// Failures before a tile is held absent until the retry interval
    pub absent_max_tries: u32,
    pub absent_min_check_secs: u64,
    /// Zero keeps tiles absent permanently
    pub absent_try_again_secs: u64,
}

/// `[logging]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}
