//! Raster server errors.

use thiserror::Error;

use crate::cache::CacheError;
use crate::geo::Sector;
use crate::raster::RasterError;

#[derive(Debug, Error)]
pub enum RasterServerError {
    #[error("Failed to read raster server file: {0}")]
    Read(#[from] ini::Error),

    #[error("Invalid raster server setting: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("No raster server description '{0}' in the file store")]
    NotFound(String),

    #[error("No raster source covers {0:?}")]
    NoCoverage(Sector),

    #[error(transparent)]
    Raster(#[from] RasterError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}
