//! WMS `GetMap` tile source.

use reqwest::Url;

use super::types::{coord, ServiceCapabilities, ServiceVersion, SourceError, TileSource};
use crate::geo::Sector;
use crate::level::Tile;

/// Geographic CRS with latitude-first axis order at WMS 1.3.0.
pub const EPSG_4326: &str = "EPSG:4326";
/// Geographic CRS with longitude-first axis order.
pub const CRS_84: &str = "CRS:84";

/// Builds WMS `GetMap` requests for tiles.
#[derive(Debug, Clone, PartialEq)]
pub struct WmsTileSource {
    name: String,
    request_url: String,
    version: ServiceVersion,
    layers: Vec<String>,
    styles: Vec<String>,
    crs: String,
    format: String,
    transparent: bool,
    background_color: Option<String>,
}

impl WmsTileSource {
    pub fn new(
        request_url: impl Into<String>,
        version: ServiceVersion,
        layers: Vec<String>,
        format: impl Into<String>,
    ) -> Result<Self, SourceError> {
        let request_url = request_url.into();
        Url::parse(&request_url).map_err(|e| SourceError::InvalidUrl {
            url: request_url.clone(),
            message: e.to_string(),
        })?;
        if layers.is_empty() {
            return Err(SourceError::MissingParameter("layers"));
        }
        Ok(Self {
            name: layers.join(","),
            request_url,
            version,
            layers,
            styles: Vec::new(),
            crs: EPSG_4326.to_string(),
            format: format.into(),
            transparent: false,
            background_color: None,
        })
    }

    /// Source for one layer of a pre-parsed capabilities document.
    pub fn from_capabilities(
        caps: &ServiceCapabilities,
        layer: &str,
        format: &str,
    ) -> Result<Self, SourceError> {
        let info = caps
            .layer(layer)
            .ok_or_else(|| SourceError::UnknownLayer(layer.to_string()))?;
        if !caps.supports_format(format) {
            return Err(SourceError::UnsupportedFormat(format.to_string()));
        }
        let mut source = Self::new(
            caps.request_url.clone(),
            caps.version,
            vec![info.name.clone()],
            format,
        )?;
        // Prefer CRS:84 when EPSG:4326 is not offered.
        if !info.crs.iter().any(|c| c.eq_ignore_ascii_case(EPSG_4326))
            && info.crs.iter().any(|c| c.eq_ignore_ascii_case(CRS_84))
        {
            source.crs = CRS_84.to_string();
        }
        Ok(source)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_styles(mut self, styles: Vec<String>) -> Self {
        self.styles = styles;
        self
    }

    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = crs.into();
        self
    }

    pub fn with_transparent(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    /// Background color as `0xRRGGBB`.
    pub fn with_background_color(mut self, color: impl Into<String>) -> Self {
        self.background_color = Some(color.into());
        self
    }

    pub fn version(&self) -> ServiceVersion {
        self.version
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    /// Whether the bounding box is sent latitude first.
    ///
    /// WMS 1.3.0 honours the EPSG:4326 axis order; earlier versions and
    /// CRS:84 are longitude first.
    fn lat_first(&self) -> bool {
        self.version >= ServiceVersion::WMS_1_3_0 && self.crs.eq_ignore_ascii_case(EPSG_4326)
    }

    /// `bbox` parameter value for a sector.
    pub fn bbox(&self, sector: &Sector) -> String {
        let values = if self.lat_first() {
            [sector.min_lat(), sector.min_lon(), sector.max_lat(), sector.max_lon()]
        } else {
            [sector.min_lon(), sector.min_lat(), sector.max_lon(), sector.max_lat()]
        };
        values.map(coord).join(",")
    }

    /// `GetMap` URL for an arbitrary sector and size.
    pub fn map_url(&self, sector: &Sector, width: u32, height: u32) -> Result<String, SourceError> {
        let mut url = Url::parse(&self.request_url).map_err(|e| SourceError::InvalidUrl {
            url: self.request_url.clone(),
            message: e.to_string(),
        })?;
        {
            let crs_key = if self.version >= ServiceVersion::WMS_1_3_0 {
                "crs"
            } else {
                "srs"
            };
            let mut query = url.query_pairs_mut();
            query
                .append_pair("service", "WMS")
                .append_pair("request", "GetMap")
                .append_pair("version", &self.version.to_string())
                .append_pair(crs_key, &self.crs)
                .append_pair("layers", &self.layers.join(","))
                .append_pair("styles", &self.styles.join(","))
                .append_pair("format", &self.format)
                .append_pair("width", &width.to_string())
                .append_pair("height", &height.to_string())
                .append_pair("bbox", &self.bbox(sector));
            if self.transparent {
                query.append_pair("transparent", "TRUE");
            }
            if let Some(color) = &self.background_color {
                query.append_pair("bgcolor", color);
            }
        }
        Ok(url.into())
    }
}

impl TileSource for WmsTileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn tile_url(&self, tile: &Tile) -> Result<String, SourceError> {
        self.map_url(tile.sector(), tile.width(), tile.height())
    }
}
