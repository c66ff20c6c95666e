//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! This module contains the `to_config_string()` function that produces
//! the commented INI representation written to `config.ini`.

use std::path::Path;

use super::settings::ConfigFile;
use super::size::format_size;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let bundled_root = config
        .file_store
        .bundled_root
        .as_ref()
        .map(|p| path_to_string(p))
        .unwrap_or_default();
    let e = &config.elevation;
    let r = &config.retrieval;

    format!(
        r#"[cache]
; Tile memory cache size (default: 512MB)
; Supports: KB, MB, GB suffixes (e.g., 256MB, 1GB)
memory_size = {}
; Percent of the memory cache kept after eviction (default: 80)
low_water_percent = {}
; Memory budget of local raster servers (default: 256MB)
raster_server_size = {}

[file_store]
; Candidate write locations, first usable one wins.
; Each entry is base[:sub/path] where base is home, cache, data, temp, cwd,
; an absolute path, or the name of an environment variable.
write_locations = {}
; Read-only locations searched after the write location
read_locations = {}
; Root of bundled resources such as raster server descriptions
bundled_root = {}
; Size limit of the write location used by pruning (default: 4GB)
max_size = {}

[retrieval]
; Retrieval worker threads (default: 8)
threads = {}
; Maximum queued requests (default: 200)
queue_capacity = {}
; Queued requests older than this are dropped (default: 30)
stale_request_secs = {}
connect_timeout_secs = {}
read_timeout_secs = {}
; Connection failures before a host is treated as down (default: 7)
attempt_limit = {}
; Seconds before a down host is tried again (default: 60)
try_again_secs = {}
; Never contact the network
offline = {}

[elevation]
dataset_name = {}
; Directory of the dataset inside the file store
cache_name = {}
; Service endpoint; leave empty to use only locally stored tiles
service_url = {}
; Service protocol: wms or wcs
service = {}
version = {}
; WMS layer or WCS coverage name
layer = {}
format = {}
tile_width = {}
tile_height = {}
; Level-zero tile size in degrees
level_zero_delta = {}
num_levels = {}
num_empty_levels = {}
; Sample type: int8, int16, int32, float32
data_type = {}
; Sample byte order: little or big
byte_order = {}
missing_data_signal = {}
missing_data_replacement = {}
min_elevation = {}
max_elevation = {}
; Failed fetches before a tile is held absent
absent_max_tries = {}
absent_min_check_secs = {}
; Seconds before an absent tile is tried again (0 = never)
absent_try_again_secs = {}

[logging]
directory = {}
file = {}
; Default level when RUST_LOG is unset: trace, debug, info, warn, error
level = {}
"#,
        format_size(config.cache.memory_size),
        config.cache.low_water_percent,
        format_size(config.cache.raster_server_size),
        config.file_store.write_locations.join(", "),
        config.file_store.read_locations.join(", "),
        bundled_root,
        format_size(config.file_store.max_size),
        r.threads,
        r.queue_capacity,
        r.stale_request_secs,
        r.connect_timeout_secs,
        r.read_timeout_secs,
        r.attempt_limit,
        r.try_again_secs,
        r.offline,
        e.dataset_name,
        e.cache_name,
        e.service_url,
        e.service.as_str(),
        e.version,
        e.layer,
        e.format,
        e.tile_width,
        e.tile_height,
        e.level_zero_delta,
        e.num_levels,
        e.num_empty_levels,
        e.data_type,
        e.byte_order,
        e.missing_data_signal,
        e.missing_data_replacement,
        e.min_elevation,
        e.max_elevation,
        e.absent_max_tries,
        e.absent_min_check_secs,
        e.absent_try_again_secs,
        path_to_string(&config.logging.directory),
        config.logging.file,
        config.logging.level,
    )
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::ServiceKind;
    use ini::Ini;

    #[test]
    fn test_written_defaults_parse_back() {
        let config = ConfigFile::default();
        let text = to_config_string(&config);
        let ini = Ini::load_from_str(&text).unwrap();
        assert_eq!(super::super::parser::parse_ini(&ini).unwrap(), config);
    }

    #[test]
    fn test_written_changes_survive() {
        let mut config = ConfigFile::default();
        config.elevation.service = ServiceKind::Wcs;
        config.elevation.service_url = "https://dem.example.com/wcs".to_string();
        config.retrieval.offline = true;
        config.file_store.bundled_root = Some("/opt/globetiles".into());

        let text = to_config_string(&config);
        assert!(text.contains("service = wcs"));
        assert!(text.contains("offline = true"));

        let ini = Ini::load_from_str(&text).unwrap();
        let parsed = super::super::parser::parse_ini(&ini).unwrap();
        assert_eq!(parsed.elevation.service_url, "https://dem.example.com/wcs");
        assert_eq!(parsed.file_store.bundled_root, config.file_store.bundled_root);
    }
}
