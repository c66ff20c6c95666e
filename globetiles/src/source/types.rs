//! Tile source types and traits.

use crate::geo::Sector;
use crate::level::Tile;
use std::fmt;
use thiserror::Error;

/// Errors building tile requests.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    #[error("Invalid service URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Layer {0} is not offered by the service")]
    UnknownLayer(String),

    #[error("Image format {0} is not offered by the service")]
    UnsupportedFormat(String),

    #[error("Invalid service version: {0}")]
    InvalidVersion(String),

    #[error("Missing source parameter: {0}")]
    MissingParameter(&'static str),
}

/// OGC service version, compared numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceVersion(pub u32, pub u32, pub u32);

impl ServiceVersion {
    pub const WMS_1_1_1: Self = Self(1, 1, 1);
    pub const WMS_1_3_0: Self = Self(1, 3, 0);
    pub const WCS_1_0_0: Self = Self(1, 0, 0);

    /// Parse `major.minor[.patch]`.
    pub fn parse(text: &str) -> Result<Self, SourceError> {
        let invalid = || SourceError::InvalidVersion(text.to_string());
        let mut parts = text.trim().split('.').map(|p| p.parse::<u32>());
        let major = parts.next().ok_or_else(invalid)?.map_err(|_| invalid())?;
        let minor = parts.next().ok_or_else(invalid)?.map_err(|_| invalid())?;
        let patch = match parts.next() {
            Some(p) => p.map_err(|_| invalid())?,
            None => 0,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(major, minor, patch))
    }
}

impl fmt::Display for ServiceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0, self.1, self.2)
    }
}

/// One layer or coverage advertised by a service.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerCapabilities {
    pub name: String,
    pub title: Option<String>,
    /// Geographic bounding box of the layer
    pub sector: Sector,
    /// Supported coordinate systems, e.g. `EPSG:4326`
    pub crs: Vec<String>,
}

impl LayerCapabilities {
    pub fn new(name: impl Into<String>, sector: Sector) -> Self {
        Self {
            name: name.into(),
            title: None,
            sector,
            crs: vec!["EPSG:4326".to_string()],
        }
    }
}

/// Pre-parsed capabilities of a WMS or WCS service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCapabilities {
    pub service_name: String,
    pub version: ServiceVersion,
    /// Endpoint for GetMap or GetCoverage requests
    pub request_url: String,
    /// Supported output MIME types
    pub formats: Vec<String>,
    pub layers: Vec<LayerCapabilities>,
}

impl ServiceCapabilities {
    pub fn layer(&self, name: &str) -> Option<&LayerCapabilities> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn supports_format(&self, format: &str) -> bool {
        self.formats.iter().any(|f| f.eq_ignore_ascii_case(format))
    }
}

/// Strategy building the request for one tile.
///
/// The model is independent of the service protocol; WMS and WCS differ
/// only in the source they are given.
pub trait TileSource: Send + Sync {
    /// Name used in logs and for the data cache directory.
    fn name(&self) -> &str;

    /// Request URL for a tile.
    fn tile_url(&self, tile: &Tile) -> Result<String, SourceError>;

    /// Whether responses may arrive as single-entry ZIP archives.
    fn unzip(&self) -> bool {
        false
    }
}

/// File suffix used on disk for a MIME type.
pub fn suffix_for_mime(mime: &str) -> &'static str {
    match mime.to_ascii_lowercase().as_str() {
        "image/png" => ".png",
        "image/jpeg" | "image/jpg" => ".jpg",
        "image/tiff" | "image/geotiff" => ".tif",
        "application/zip" => ".zip",
        "application/bil" | "application/bil16" | "application/bil32" | "image/bil" => ".bil",
        _ => ".bin",
    }
}

/// Format a coordinate for a query string without trailing noise.
pub(crate) fn coord(value: f64) -> String {
    let text = format!("{value}");
    if text == "-0" {
        "0".to_string()
    } else {
        text
    }
}
