//! WCS 1.0.0 `GetCoverage` tile source for elevation data.

use reqwest::Url;

use super::types::{coord, ServiceCapabilities, ServiceVersion, SourceError, TileSource};
use crate::level::Tile;

/// Builds WCS `GetCoverage` requests for tiles.
///
/// Only WCS 1.0.0 is spoken; its bounding box is always longitude first.
#[derive(Debug, Clone, PartialEq)]
pub struct WcsTileSource {
    request_url: String,
    coverage: String,
    format: String,
    crs: String,
    unzip: bool,
}

impl WcsTileSource {
    pub fn new(
        request_url: impl Into<String>,
        coverage: impl Into<String>,
        format: impl Into<String>,
    ) -> Result<Self, SourceError> {
        let request_url = request_url.into();
        Url::parse(&request_url).map_err(|e| SourceError::InvalidUrl {
            url: request_url.clone(),
            message: e.to_string(),
        })?;
        let coverage = coverage.into();
        if coverage.is_empty() {
            return Err(SourceError::MissingParameter("coverage"));
        }
        let format = format.into();
        let unzip = format.eq_ignore_ascii_case("application/zip");
        Ok(Self {
            request_url,
            coverage,
            format,
            crs: "EPSG:4326".to_string(),
            unzip,
        })
    }

    pub fn from_capabilities(
        caps: &ServiceCapabilities,
        coverage: &str,
        format: &str,
    ) -> Result<Self, SourceError> {
        if caps.version != ServiceVersion::WCS_1_0_0 {
            return Err(SourceError::InvalidVersion(caps.version.to_string()));
        }
        if caps.layer(coverage).is_none() {
            return Err(SourceError::UnknownLayer(coverage.to_string()));
        }
        if !caps.supports_format(format) {
            return Err(SourceError::UnsupportedFormat(format.to_string()));
        }
        Self::new(caps.request_url.clone(), coverage, format)
    }

    /// Expect zipped payloads regardless of the requested format.
    pub fn with_unzip(mut self, unzip: bool) -> Self {
        self.unzip = unzip;
        self
    }

    pub fn coverage(&self) -> &str {
        &self.coverage
    }
}

impl TileSource for WcsTileSource {
    fn name(&self) -> &str {
        &self.coverage
    }

    fn tile_url(&self, tile: &Tile) -> Result<String, SourceError> {
        let mut url = Url::parse(&self.request_url).map_err(|e| SourceError::InvalidUrl {
            url: self.request_url.clone(),
            message: e.to_string(),
        })?;
        let s = tile.sector();
        let bbox = [s.min_lon(), s.min_lat(), s.max_lon(), s.max_lat()]
            .map(coord)
            .join(",");
        url.query_pairs_mut()
            .append_pair("service", "WCS")
            .append_pair("request", "GetCoverage")
            .append_pair("version", "1.0.0")
            .append_pair("coverage", &self.coverage)
            .append_pair("crs", &self.crs)
            .append_pair("format", &self.format)
            .append_pair("width", &tile.width().to_string())
            .append_pair("height", &tile.height().to_string())
            .append_pair("bbox", &bbox);
        Ok(url.into())
    }

    fn unzip(&self) -> bool {
        self.unzip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Sector;
    use crate::level::TileKey;
    use crate::source::LayerCapabilities;
    use std::collections::HashMap;

    fn tile() -> Tile {
        Tile::standalone(
            TileKey::new(2, 3, 4, "srtm"),
            Sector::new(-10.0, -5.0, 100.0, 105.0).unwrap(),
            150,
            150,
            ".bil",
        )
    }

    #[test]
    fn test_get_coverage_url() {
        let source = WcsTileSource::new("https://example.com/wcs", "srtm30", "image/bil").unwrap();
        let url = source.tile_url(&tile()).unwrap();
        let p: HashMap<String, String> = Url::parse(&url).unwrap().query_pairs().into_owned().collect();
        assert_eq!(p["service"], "WCS");
        assert_eq!(p["request"], "GetCoverage");
        assert_eq!(p["version"], "1.0.0");
        assert_eq!(p["coverage"], "srtm30");
        assert_eq!(p["bbox"], "100,-10,105,-5");
        assert_eq!(p["width"], "150");
        assert!(!source.unzip());
    }

    #[test]
    fn test_zip_format_enables_unzip() {
        let source = WcsTileSource::new("https://example.com/wcs", "srtm30", "application/zip").unwrap();
        assert!(source.unzip());
    }

    #[test]
    fn test_from_capabilities_requires_wcs_100() {
        let mut caps = ServiceCapabilities {
            service_name: "WCS".into(),
            version: ServiceVersion(1, 1, 0),
            request_url: "https://example.com/wcs".into(),
            formats: vec!["image/bil".into()],
            layers: vec![LayerCapabilities::new("srtm30", Sector::FULL_SPHERE)],
        };
        assert!(matches!(
            WcsTileSource::from_capabilities(&caps, "srtm30", "image/bil"),
            Err(SourceError::InvalidVersion(_))
        ));
        caps.version = ServiceVersion::WCS_1_0_0;
        assert!(WcsTileSource::from_capabilities(&caps, "srtm30", "image/bil").is_ok());
    }
}
