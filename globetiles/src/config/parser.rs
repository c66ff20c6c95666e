//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This module is the single place where INI key names are mapped to struct
//! fields. Missing sections and keys keep their defaults.

use ini::{Ini, Properties};
use std::path::PathBuf;
use std::str::FromStr;

use super::file::ConfigFileError;
use super::settings::{ConfigFile, ServiceKind};
use super::size::parse_size;
use crate::raster::{ByteOrder, DataType};

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        let s = Section::new("cache", section);
        if let Some(v) = s.size("memory_size")? {
            config.cache.memory_size = v;
        }
        if let Some(v) = s.number::<u8>("low_water_percent", "must be a percentage (0-100)")? {
            if v > 100 {
                return Err(s.invalid("low_water_percent", &v.to_string(), "must not exceed 100"));
            }
            config.cache.low_water_percent = v;
        }
        if let Some(v) = s.size("raster_server_size")? {
            config.cache.raster_server_size = v;
        }
    }

    // [file_store] section
    if let Some(section) = ini.section(Some("file_store")) {
        let s = Section::new("file_store", section);
        if let Some(v) = s.get("write_locations") {
            config.file_store.write_locations = split_list(v);
        }
        if let Some(v) = s.get("read_locations") {
            config.file_store.read_locations = split_list(v);
        }
        if let Some(v) = s.get("bundled_root") {
            config.file_store.bundled_root = (!v.is_empty()).then(|| expand_tilde(v));
        }
        if let Some(v) = s.size("max_size")? {
            config.file_store.max_size = v;
        }
    }

    // [retrieval] section
    if let Some(section) = ini.section(Some("retrieval")) {
        let s = Section::new("retrieval", section);
        if let Some(v) = s.number::<usize>("threads", "must be a positive integer")? {
            if v == 0 {
                return Err(s.invalid("threads", "0", "at least one thread is required"));
            }
            config.retrieval.threads = v;
        }
        if let Some(v) = s.number("queue_capacity", "must be a positive integer")? {
            config.retrieval.queue_capacity = v;
        }
        if let Some(v) = s.number("stale_request_secs", "must be an integer (seconds)")? {
            config.retrieval.stale_request_secs = v;
        }
        if let Some(v) = s.number("connect_timeout_secs", "must be an integer (seconds)")? {
            config.retrieval.connect_timeout_secs = v;
        }
        if let Some(v) = s.number("read_timeout_secs", "must be an integer (seconds)")? {
            config.retrieval.read_timeout_secs = v;
        }
        if let Some(v) = s.number("attempt_limit", "must be a positive integer")? {
            config.retrieval.attempt_limit = v;
        }
        if let Some(v) = s.number("try_again_secs", "must be an integer (seconds)")? {
            config.retrieval.try_again_secs = v;
        }
        if let Some(v) = s.boolean("offline")? {
            config.retrieval.offline = v;
        }
    }

    // [elevation] section
    if let Some(section) = ini.section(Some("elevation")) {
        let s = Section::new("elevation", section);
        let e = &mut config.elevation;
        if let Some(v) = s.get("dataset_name") {
            e.dataset_name = v.to_string();
        }
        if let Some(v) = s.get("cache_name") {
            if v.is_empty() {
                return Err(s.invalid("cache_name", v, "must not be empty"));
            }
            e.cache_name = v.to_string();
        }
        if let Some(v) = s.get("service_url") {
            e.service_url = v.to_string();
        }
        if let Some(v) = s.get("service") {
            e.service = match v.to_lowercase().as_str() {
                "wms" => ServiceKind::Wms,
                "wcs" => ServiceKind::Wcs,
                _ => return Err(s.invalid("service", v, "must be 'wms' or 'wcs'")),
            };
        }
        if let Some(v) = s.get("version") {
            e.version = v.to_string();
        }
        if let Some(v) = s.get("layer") {
            e.layer = v.to_string();
        }
        if let Some(v) = s.get("format") {
            e.format = v.to_string();
        }
        if let Some(v) = s.number::<u32>("tile_width", "must be an integer of at least 2")? {
            if v < 2 {
                return Err(s.invalid("tile_width", &v.to_string(), "must be at least 2"));
            }
            e.tile_width = v;
        }
        if let Some(v) = s.number::<u32>("tile_height", "must be an integer of at least 2")? {
            if v < 2 {
                return Err(s.invalid("tile_height", &v.to_string(), "must be at least 2"));
            }
            e.tile_height = v;
        }
        if let Some(v) = s.number::<f64>("level_zero_delta", "must be a number of degrees")? {
            if !(v > 0.0 && v <= 180.0) {
                return Err(s.invalid(
                    "level_zero_delta",
                    &v.to_string(),
                    "must be between 0 and 180 degrees",
                ));
            }
            e.level_zero_delta = v;
        }
        if let Some(v) = s.number("num_levels", "must be a positive integer")? {
            e.num_levels = v;
        }
        if let Some(v) = s.number("num_empty_levels", "must be an integer")? {
            e.num_empty_levels = v;
        }
        if let Some(v) = s.get("data_type") {
            e.data_type = DataType::parse(v)
                .ok_or_else(|| s.invalid("data_type", v, "must be int8, int16, int32 or float32"))?;
        }
        if let Some(v) = s.get("byte_order") {
            e.byte_order = ByteOrder::parse(v)
                .ok_or_else(|| s.invalid("byte_order", v, "must be 'little' or 'big'"))?;
        }
        if let Some(v) = s.number("missing_data_signal", "must be a number")? {
            e.missing_data_signal = v;
        }
        if let Some(v) = s.number("missing_data_replacement", "must be a number")? {
            e.missing_data_replacement = v;
        }
        if let Some(v) = s.number("min_elevation", "must be a number (meters)")? {
            e.min_elevation = v;
        }
        if let Some(v) = s.number("max_elevation", "must be a number (meters)")? {
            e.max_elevation = v;
        }
        if let Some(v) = s.number("absent_max_tries", "must be a positive integer")? {
            e.absent_max_tries = v;
        }
        if let Some(v) = s.number("absent_min_check_secs", "must be an integer (seconds)")? {
            e.absent_min_check_secs = v;
        }
        if let Some(v) = s.number("absent_try_again_secs", "must be an integer (seconds)")? {
            e.absent_try_again_secs = v;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        let s = Section::new("logging", section);
        if let Some(v) = s.get("directory") {
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = s.get("file") {
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
        if let Some(v) = s.get("level") {
            let v = v.to_lowercase();
            let valid_levels = ["trace", "debug", "info", "warn", "error"];
            if !valid_levels.contains(&v.as_str()) {
                return Err(s.invalid(
                    "level",
                    &v,
                    "must be one of: trace, debug, info, warn, error",
                ));
            }
            config.logging.level = v;
        }
    }

    Ok(config)
}

/// A section with its name, for error reporting.
struct Section<'a> {
    name: &'static str,
    props: &'a Properties,
}

impl<'a> Section<'a> {
    fn new(name: &'static str, props: &'a Properties) -> Self {
        Self { name, props }
    }

    /// Trimmed value of a key.
    fn get(&self, key: &str) -> Option<&'a str> {
        self.props.get(key).map(str::trim)
    }

    fn invalid(&self, key: &str, value: &str, reason: &str) -> ConfigFileError {
        ConfigFileError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    fn number<T: FromStr>(&self, key: &str, reason: &str) -> Result<Option<T>, ConfigFileError> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v
                .parse()
                .map(Some)
                .map_err(|_| self.invalid(key, v, reason)),
        }
    }

    fn size(&self, key: &str) -> Result<Option<usize>, ConfigFileError> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => parse_size(v)
                .map(Some)
                .map_err(|_| self.invalid(key, v, "expected format like '4GB', '500MB', or '1024KB'")),
        }
    }

    fn boolean(&self, key: &str) -> Result<Option<bool>, ConfigFileError> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => match v.to_lowercase().as_str() {
                "true" | "yes" | "1" | "on" => Ok(Some(true)),
                "false" | "no" | "0" | "off" => Ok(Some(false)),
                _ => Err(self.invalid(key, v, "must be true or false")),
            },
        }
    }
}

/// Split a comma-separated list, dropping empty entries.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Expand a leading `~` to the home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<ConfigFile, ConfigFileError> {
        let ini = Ini::load_from_str(text).unwrap();
        parse_ini(&ini)
    }

    #[test]
    fn test_empty_ini_gives_defaults() {
        assert_eq!(parse("").unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_overlay_values() {
        let config = parse(
            "[cache]\nmemory_size = 1GB\nlow_water_percent = 70\n\
             [file_store]\nwrite_locations = temp:tiles, home:.tiles\nmax_size = 10GB\n\
             [retrieval]\nthreads = 4\noffline = yes\n\
             [elevation]\nservice = WCS\nlayer = srtm30\nbyte_order = big\n\
             data_type = float32\nabsent_try_again_secs = 0\n",
        )
        .unwrap();

        assert_eq!(config.cache.memory_size, 1024 * 1024 * 1024);
        assert_eq!(config.cache.low_water_percent, 70);
        assert_eq!(config.file_store.write_locations, vec!["temp:tiles", "home:.tiles"]);
        assert_eq!(config.file_store.max_size, 10 * 1024 * 1024 * 1024);
        assert_eq!(config.retrieval.threads, 4);
        assert!(config.retrieval.offline);
        assert_eq!(config.elevation.service, ServiceKind::Wcs);
        assert_eq!(config.elevation.layer, "srtm30");
        assert_eq!(config.elevation.byte_order, ByteOrder::BigEndian);
        assert_eq!(config.elevation.data_type, DataType::Float32);
        assert_eq!(config.elevation.absent_try_again_secs, 0);
        // untouched keys keep their defaults
        assert_eq!(config.retrieval.queue_capacity, ConfigFile::default().retrieval.queue_capacity);
    }

    #[test]
    fn test_invalid_size_reports_key() {
        let err = parse("[cache]\nmemory_size = lots\n").unwrap_err();
        match err {
            ConfigFileError::InvalidValue { section, key, value, .. } => {
                assert_eq!(section, "cache");
                assert_eq!(key, "memory_size");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(parse("[elevation]\nservice = wmts\n").is_err());
        assert!(parse("[elevation]\ntile_width = 1\n").is_err());
        assert!(parse("[elevation]\nlevel_zero_delta = -5\n").is_err());
        assert!(parse("[elevation]\ndata_type = complex\n").is_err());
        assert!(parse("[retrieval]\nthreads = 0\n").is_err());
        assert!(parse("[retrieval]\noffline = maybe\n").is_err());
        assert!(parse("[cache]\nlow_water_percent = 120\n").is_err());
        assert!(parse("[logging]\nlevel = verbose\n").is_err());
    }

    #[test]
    fn test_empty_bundled_root_is_none() {
        let config = parse("[file_store]\nbundled_root =\n").unwrap();
        assert!(config.file_store.bundled_root.is_none());
    }

    #[test]
    fn test_expand_tilde() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/logs"), home.join("logs"));
        }
        assert_eq!(expand_tilde("/var/log"), PathBuf::from("/var/log"));
    }
}
