//! Model errors.

use crate::filestore::FileStoreError;
use crate::level::LevelError;
use crate::raster::RasterError;
use crate::retrieve::RetrievalError;
use crate::source::SourceError;
use thiserror::Error;

/// Errors raised by the elevation and imagery models.
///
/// Interactive queries never return these for data that is merely not
/// loaded yet; they surface configuration problems and blocking fetches.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Level(#[from] LevelError),

    #[error(transparent)]
    Raster(#[from] RasterError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    FileStore(#[from] FileStoreError),

    #[error("Failed to start model worker threads: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Fetch of {0} was interrupted")]
    Interrupted(String),

    #[error("Service returned no data for {0}")]
    NoData(String),
}
