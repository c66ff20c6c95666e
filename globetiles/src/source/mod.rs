//! Tile sources.
//!
//! A [`TileSource`] turns a tile into a request URL. [`WmsTileSource`] and
//! [`WcsTileSource`] are built directly or from pre-parsed
//! [`ServiceCapabilities`].

mod types;
mod wcs;
mod wms;

pub use types::{
    suffix_for_mime, LayerCapabilities, ServiceCapabilities, ServiceVersion, SourceError,
    TileSource,
};
pub use wcs::WcsTileSource;
pub use wms::{WmsTileSource, CRS_84, EPSG_4326};
