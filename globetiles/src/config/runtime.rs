//! Conversion of file settings into component configurations.

use std::sync::Arc;
use std::time::Duration;

use super::file::ConfigFileError;
use super::settings::{ConfigFile, ServiceKind};
use crate::cache::{MemoryCacheConfig, RasterServerCacheConfig};
use crate::filestore::{FileStoreConfig, LocationBase, LocationSpec};
use crate::geo::LatLon;
use crate::level::{AbsentConfig, LevelSetConfig};
use crate::model::ElevationModelConfig;
use crate::retrieve::RetrievalConfig;
use crate::source::{suffix_for_mime, ServiceVersion, TileSource, WcsTileSource, WmsTileSource};

impl ConfigFile {
    pub fn memory_cache_config(&self) -> MemoryCacheConfig {
        let capacity = self.cache.memory_size;
        let low_water = capacity / 100 * self.cache.low_water_percent as usize;
        MemoryCacheConfig::new(capacity).with_low_water(low_water)
    }

    pub fn raster_server_cache_config(&self) -> RasterServerCacheConfig {
        RasterServerCacheConfig::new(self.cache.raster_server_size)
    }

    /// File store locations: writable candidates first, then read-only ones.
    pub fn file_store_config(&self) -> FileStoreConfig {
        let settings = &self.file_store;
        let mut locations: Vec<LocationSpec> = settings
            .write_locations
            .iter()
            .map(|entry| {
                let (base, sub) = split_location(entry);
                LocationSpec::write(base, sub).mark_when_used()
            })
            .collect();
        locations.extend(settings.read_locations.iter().map(|entry| {
            let (base, sub) = split_location(entry);
            LocationSpec::read(base, sub).install()
        }));

        FileStoreConfig {
            locations,
            bundled_root: settings.bundled_root.clone(),
            max_write_bytes: settings.max_size as u64,
        }
    }

    pub fn retrieval_config(&self) -> RetrievalConfig {
        let r = &self.retrieval;
        RetrievalConfig {
            worker_threads: r.threads,
            queue_capacity: r.queue_capacity,
            stale_request_limit: Duration::from_secs(r.stale_request_secs),
            connect_timeout: Duration::from_secs(r.connect_timeout_secs),
            read_timeout: Duration::from_secs(r.read_timeout_secs),
            attempt_limit: r.attempt_limit,
            try_again_interval: Duration::from_secs(r.try_again_secs),
            offline: r.offline,
        }
    }

    pub fn elevation_model_config(&self) -> ElevationModelConfig {
        let e = &self.elevation;
        let mut level_set = LevelSetConfig::new(
            e.cache_name.clone(),
            LatLon::new(e.level_zero_delta, e.level_zero_delta),
            e.num_levels,
            e.tile_width,
        );
        level_set.tile_height = e.tile_height;
        level_set.num_empty_levels = e.num_empty_levels;
        // Archives are unpacked before they are stored.
        level_set.format_suffix = match suffix_for_mime(&e.format) {
            ".zip" | ".bin" => ".bil",
            suffix => suffix,
        }
        .to_string();
        level_set.absent = AbsentConfig {
            max_tries: e.absent_max_tries,
            min_check_interval: Duration::from_secs(e.absent_min_check_secs),
            try_again_interval: (e.absent_try_again_secs > 0)
                .then(|| Duration::from_secs(e.absent_try_again_secs)),
        };

        let mut config = ElevationModelConfig::new(e.dataset_name.clone(), level_set);
        config.data_type = e.data_type;
        config.byte_order = e.byte_order;
        config.missing_data_signal = e.missing_data_signal;
        config.missing_data_replacement = e.missing_data_replacement;
        config.min_elevation = e.min_elevation;
        config.max_elevation = e.max_elevation;
        config
    }

    /// Network source of the elevation dataset, or `None` when no service
    /// URL is configured.
    pub fn elevation_source(&self) -> Result<Option<Arc<dyn TileSource>>, ConfigFileError> {
        let e = &self.elevation;
        if e.service_url.is_empty() {
            return Ok(None);
        }
        let invalid = |key: &str, value: &str, reason: String| ConfigFileError::InvalidValue {
            section: "elevation".to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason,
        };

        let source: Arc<dyn TileSource> = match e.service {
            ServiceKind::Wms => {
                let version = ServiceVersion::parse(&e.version)
                    .map_err(|err| invalid("version", &e.version, err.to_string()))?;
                let source =
                    WmsTileSource::new(e.service_url.clone(), version, vec![e.layer.clone()], &e.format)
                        .map_err(|err| invalid("service_url", &e.service_url, err.to_string()))?
                        .with_name(e.cache_name.clone());
                Arc::new(source)
            }
            ServiceKind::Wcs => {
                let source = WcsTileSource::new(e.service_url.clone(), e.layer.clone(), &e.format)
                    .map_err(|err| invalid("service_url", &e.service_url, err.to_string()))?;
                Arc::new(source)
            }
        };
        Ok(Some(source))
    }
}

/// Split `base[:sub/path]` into its base and sub-path.
fn split_location(entry: &str) -> (LocationBase, &str) {
    match entry.split_once(':') {
        Some((base, sub)) => (LocationBase::parse(base), sub.trim()),
        None => (LocationBase::parse(entry), ""),
    }
}
