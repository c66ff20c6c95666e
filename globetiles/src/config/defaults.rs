//! Default values for every configuration setting.

use super::settings::*;
use crate::raster::{ByteOrder, DataType};

// [cache]
pub const DEFAULT_MEMORY_CACHE_SIZE: usize = 512 * 1024 * 1024;
pub const DEFAULT_LOW_WATER_PERCENT: u8 = 80;
pub const DEFAULT_RASTER_SERVER_CACHE_SIZE: usize = 256 * 1024 * 1024;

// [file_store]
pub const DEFAULT_WRITE_LOCATIONS: [&str; 2] = ["cache:globetiles", "home:.globetiles/cache"];
pub const DEFAULT_READ_LOCATIONS: [&str; 1] = ["GLOBETILES_DATA"];
pub const DEFAULT_DISK_STORE_SIZE: usize = 4 * 1024 * 1024 * 1024;

// [retrieval]
pub const DEFAULT_RETRIEVAL_THREADS: usize = 8;
pub const DEFAULT_QUEUE_CAPACITY: usize = 200;
pub const DEFAULT_STALE_REQUEST_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 8;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_ATTEMPT_LIMIT: u32 = 7;
pub const DEFAULT_TRY_AGAIN_SECS: u64 = 60;

// [elevation]
pub const DEFAULT_DATASET_NAME: &str = "Earth Elevation";
pub const DEFAULT_CACHE_NAME: &str = "Earth/Elevation";
pub const DEFAULT_SERVICE_VERSION: &str = "1.3.0";
pub const DEFAULT_ELEVATION_FORMAT: &str = "application/bil16";
pub const DEFAULT_TILE_SIZE: u32 = 150;
pub const DEFAULT_LEVEL_ZERO_DELTA: f64 = 20.0;
pub const DEFAULT_NUM_LEVELS: usize = 12;
pub const DEFAULT_MISSING_DATA_SIGNAL: f64 = -32768.0;
pub const DEFAULT_MIN_ELEVATION: f64 = -11000.0;
pub const DEFAULT_MAX_ELEVATION: f64 = 8850.0;
pub const DEFAULT_ABSENT_MAX_TRIES: u32 = 3;
pub const DEFAULT_ABSENT_MIN_CHECK_SECS: u64 = 10;
pub const DEFAULT_ABSENT_TRY_AGAIN_SECS: u64 = 60;

// [logging]
pub const DEFAULT_LOG_FILE: &str = "globetiles.log";
pub const DEFAULT_LOG_LEVEL: &str = "info";

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            cache: CacheSettings {
                memory_size: DEFAULT_MEMORY_CACHE_SIZE,
                low_water_percent: DEFAULT_LOW_WATER_PERCENT,
                raster_server_size: DEFAULT_RASTER_SERVER_CACHE_SIZE,
            },
            file_store: FileStoreSettings {
                write_locations: DEFAULT_WRITE_LOCATIONS.map(String::from).to_vec(),
                read_locations: DEFAULT_READ_LOCATIONS.map(String::from).to_vec(),
                bundled_root: None,
                max_size: DEFAULT_DISK_STORE_SIZE,
            },
            retrieval: RetrievalSettings {
                threads: DEFAULT_RETRIEVAL_THREADS,
                queue_capacity: DEFAULT_QUEUE_CAPACITY,
                stale_request_secs: DEFAULT_STALE_REQUEST_SECS,
                connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
                read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
                attempt_limit: DEFAULT_ATTEMPT_LIMIT,
                try_again_secs: DEFAULT_TRY_AGAIN_SECS,
                offline: false,
            },
            elevation: ElevationSettings {
                dataset_name: DEFAULT_DATASET_NAME.to_string(),
                cache_name: DEFAULT_CACHE_NAME.to_string(),
                service_url: String::new(),
                service: ServiceKind::Wms,
                version: DEFAULT_SERVICE_VERSION.to_string(),
                layer: String::new(),
                format: DEFAULT_ELEVATION_FORMAT.to_string(),
                tile_width: DEFAULT_TILE_SIZE,
                tile_height: DEFAULT_TILE_SIZE,
                level_zero_delta: DEFAULT_LEVEL_ZERO_DELTA,
                num_levels: DEFAULT_NUM_LEVELS,
                num_empty_levels: 0,
                data_type: DataType::Int16,
                byte_order: ByteOrder::LittleEndian,
                missing_data_signal: DEFAULT_MISSING_DATA_SIGNAL,
                missing_data_replacement: 0.0,
                min_elevation: DEFAULT_MIN_ELEVATION,
                max_elevation: DEFAULT_MAX_ELEVATION,
                absent_max_tries: DEFAULT_ABSENT_MAX_TRIES,
                absent_min_check_secs: DEFAULT_ABSENT_MIN_CHECK_SECS,
                absent_try_again_secs: DEFAULT_ABSENT_TRY_AGAIN_SECS,
            },
            logging: LoggingSettings {
                directory: super::file::config_directory().join("logs"),
                file: DEFAULT_LOG_FILE.to_string(),
                level: DEFAULT_LOG_LEVEL.to_string(),
            },
        }
    }
}
