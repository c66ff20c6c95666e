//! Raster server description files.
//!
//! A dataset served from local files is described by
//! `<dataset>.RasterServer.ini`:
//!
//! ```ini
//! [server]
//! dataset = Earth/LocalDEM
//! cache_budget = 256MB
//! pixel_format = elevation
//! data_type = int16
//! byte_order = little
//! missing_data_signal = -32768
//!
//! [source.west]
//! path = dem/west.bil
//! sector = -10,10,-20,0
//! width = 1201
//! height = 1201
//! ```
//!
//! Source paths are relative to the directory holding the file.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};

use super::error::RasterServerError;
use crate::cache::RasterServerCacheConfig;
use crate::config::parse_size;
use crate::filestore::FileStore;
use crate::geo::Sector;
use crate::raster::{ByteOrder, DataType, PixelFormat, RasterDescriptor};

const SOURCE_PREFIX: &str = "source.";

/// Layout of the rasters a server composes.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFormat {
    pub pixel_format: PixelFormat,
    pub data_type: DataType,
    pub byte_order: ByteOrder,
    pub missing_data_signal: Option<f64>,
}

impl OutputFormat {
    pub fn elevation(data_type: DataType, byte_order: ByteOrder, missing_data_signal: f64) -> Self {
        Self {
            pixel_format: PixelFormat::Elevation,
            data_type,
            byte_order,
            missing_data_signal: Some(missing_data_signal),
        }
    }

    pub fn image() -> Self {
        Self {
            pixel_format: PixelFormat::Image,
            data_type: DataType::Int32,
            byte_order: ByteOrder::LittleEndian,
            missing_data_signal: None,
        }
    }

    /// MIME type of encoded output.
    pub fn content_type(&self) -> &'static str {
        match self.pixel_format {
            PixelFormat::Elevation => "application/bil",
            PixelFormat::Image => "image/png",
        }
    }
}

/// One local raster file.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterSourceConfig {
    pub name: String,
    pub path: PathBuf,
    pub descriptor: RasterDescriptor,
}

/// Parsed raster server description.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterServerConfig {
    pub dataset: String,
    pub output: OutputFormat,
    pub cache: RasterServerCacheConfig,
    pub sources: Vec<RasterSourceConfig>,
}

impl RasterServerConfig {
    /// File name of a dataset's description.
    pub fn file_name(dataset: &str) -> String {
        format!("{dataset}.RasterServer.ini")
    }

    /// Find a dataset's description in the file store, bundled files included.
    pub fn locate(file_store: &FileStore, dataset: &str) -> Result<PathBuf, RasterServerError> {
        let name = Self::file_name(dataset);
        file_store
            .find_file(&name, true)
            .ok_or(RasterServerError::NotFound(name))
    }

    pub fn load(path: &Path) -> Result<Self, RasterServerError> {
        let ini = Ini::load_from_file(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&ini, base)
    }

    /// Parse a description, resolving relative source paths against `base`.
    pub fn parse(ini: &Ini, base: &Path) -> Result<Self, RasterServerError> {
        let server = ini
            .section(Some("server"))
            .map(|p| Section::new("server", p))
            .ok_or_else(|| invalid("server", "", "", "section is required"))?;

        let dataset = server.required("dataset")?.to_string();

        let mut cache = RasterServerCacheConfig::default();
        if let Some(v) = server.get("cache_budget") {
            cache.budget_bytes = parse_size(v)
                .map_err(|_| server.invalid("cache_budget", v, "expected a size like '256MB'"))?;
        }
        if let Some(secs) = server.number::<u64>("prune_timeout_secs")? {
            cache.prune_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = server.number::<u64>("prune_interval_secs")? {
            cache.prune_interval = Duration::from_secs(secs);
        }

        let output = match server.get("pixel_format").unwrap_or("elevation") {
            "image" => OutputFormat::image(),
            "elevation" => OutputFormat {
                pixel_format: PixelFormat::Elevation,
                data_type: server.data_type()?.unwrap_or(DataType::Int16),
                byte_order: server.byte_order()?.unwrap_or(ByteOrder::LittleEndian),
                missing_data_signal: server.number("missing_data_signal")?,
            },
            other => {
                return Err(server.invalid(
                    "pixel_format",
                    other,
                    "must be 'elevation' or 'image'",
                ))
            }
        };

        let mut sources = Vec::new();
        for (name, props) in ini.iter() {
            let Some(source_name) = name.and_then(|n| n.strip_prefix(SOURCE_PREFIX)) else {
                continue;
            };
            let section = Section::new(name.unwrap_or_default(), props);
            sources.push(parse_source(&section, source_name, base, &output)?);
        }

        Ok(Self {
            dataset,
            output,
            cache,
            sources,
        })
    }
}

fn parse_source(
    s: &Section<'_>,
    name: &str,
    base: &Path,
    output: &OutputFormat,
) -> Result<RasterSourceConfig, RasterServerError> {
    let path = base.join(s.required("path")?);
    let sector_text = s.required("sector")?;
    let sector = parse_sector(sector_text).map_err(|reason| s.invalid("sector", sector_text, &reason))?;

    let mut descriptor = RasterDescriptor::new(sector);
    descriptor.width = s.number("width")?;
    descriptor.height = s.number("height")?;
    descriptor.data_type = s.data_type()?.or(Some(output.data_type));
    descriptor.byte_order = s.byte_order()?.unwrap_or(output.byte_order);
    descriptor.missing_data_signal = s.number("missing_data_signal")?.or(output.missing_data_signal);

    Ok(RasterSourceConfig {
        name: name.to_string(),
        path,
        descriptor,
    })
}

/// Parse `min_lat,max_lat,min_lon,max_lon`.
fn parse_sector(text: &str) -> Result<Sector, String> {
    let values: Vec<f64> = text
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| "expected four numbers: min_lat,max_lat,min_lon,max_lon".to_string())?;
    let [min_lat, max_lat, min_lon, max_lon] = values[..] else {
        return Err("expected four numbers: min_lat,max_lat,min_lon,max_lon".to_string());
    };
    Sector::new(min_lat, max_lat, min_lon, max_lon).map_err(|e| e.to_string())
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> RasterServerError {
    RasterServerError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

struct Section<'a> {
    name: &'a str,
    props: &'a Properties,
}

impl<'a> Section<'a> {
    fn new(name: &'a str, props: &'a Properties) -> Self {
        Self { name, props }
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.props.get(key).map(str::trim)
    }

    fn required(&self, key: &str) -> Result<&'a str, RasterServerError> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| self.invalid(key, "", "is required"))
    }

    fn invalid(&self, key: &str, value: &str, reason: &str) -> RasterServerError {
        invalid(self.name, key, value, reason)
    }

    fn number<T: FromStr>(&self, key: &str) -> Result<Option<T>, RasterServerError> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v
                .parse()
                .map(Some)
                .map_err(|_| self.invalid(key, v, "must be a number")),
        }
    }

    fn data_type(&self) -> Result<Option<DataType>, RasterServerError> {
        self.get("data_type")
            .map(|v| {
                DataType::parse(v)
                    .ok_or_else(|| self.invalid("data_type", v, "must be int8, int16, int32 or float32"))
            })
            .transpose()
    }

    fn byte_order(&self) -> Result<Option<ByteOrder>, RasterServerError> {
        self.get("byte_order")
            .map(|v| {
                ByteOrder::parse(v)
                    .ok_or_else(|| self.invalid("byte_order", v, "must be 'little' or 'big'"))
            })
            .transpose()
    }
}
