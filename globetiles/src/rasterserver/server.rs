//! Composes tiles from local raster files.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::config::{OutputFormat, RasterServerConfig};
use super::error::RasterServerError;
use crate::filestore::FileStore;
use crate::geo::Sector;
use crate::raster::{
    encode_png, reader_for, CachedDataRaster, DataRaster, PixelFormat, RasterBufferCache,
    RasterParams,
};

/// A dataset backed by local raster files instead of a network service.
pub struct RasterServer {
    dataset: String,
    output: OutputFormat,
    sources: Vec<CachedDataRaster>,
    coverage: Option<Sector>,
    cache: Arc<RasterBufferCache>,
}

impl RasterServer {
    /// Build a server with its own buffer cache.
    pub fn new(config: RasterServerConfig) -> Result<Self, RasterServerError> {
        let cache = Arc::new(RasterBufferCache::new(config.cache.clone())?);
        Self::with_cache(config, cache)
    }

    /// Build a server whose buffers live in a shared cache.
    pub fn with_cache(
        config: RasterServerConfig,
        cache: Arc<RasterBufferCache>,
    ) -> Result<Self, RasterServerError> {
        let mut sources = Vec::with_capacity(config.sources.len());
        for source in config.sources {
            let reader = reader_for(&source.path)?;
            sources.push(CachedDataRaster::new(
                source.path,
                source.descriptor,
                Arc::from(reader),
                Arc::clone(&cache),
            ));
        }

        let coverage = sources
            .iter()
            .map(|s| *s.sector())
            .reduce(|a, b| a.union(&b));

        info!(
            dataset = %config.dataset,
            sources = sources.len(),
            "Raster server ready"
        );

        Ok(Self {
            dataset: config.dataset,
            output: config.output,
            sources,
            coverage,
            cache,
        })
    }

    /// Load `<dataset>.RasterServer.ini` from the file store.
    pub fn from_file_store(
        file_store: &FileStore,
        dataset: &str,
        cache: Arc<RasterBufferCache>,
    ) -> Result<Self, RasterServerError> {
        let path = RasterServerConfig::locate(file_store, dataset)?;
        debug!(path = %path.display(), "Loading raster server description");
        Self::with_cache(RasterServerConfig::load(&path)?, cache)
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn output(&self) -> &OutputFormat {
        &self.output
    }

    pub fn sources(&self) -> &[CachedDataRaster] {
        &self.sources
    }

    pub fn cache(&self) -> &Arc<RasterBufferCache> {
        &self.cache
    }

    /// Union of the source sectors, `None` without sources.
    pub fn coverage(&self) -> Option<Sector> {
        self.coverage
    }

    /// Draw every source intersecting `sector` onto a new raster.
    ///
    /// A source that fails to load is logged and skipped. Fails only when no
    /// source intersects the sector.
    pub fn compose(
        &self,
        sector: Sector,
        width: u32,
        height: u32,
    ) -> Result<DataRaster, RasterServerError> {
        let mut builder = RasterParams::builder()
            .size(width, height)
            .sector(sector)
            .pixel_format(self.output.pixel_format)
            .data_type(self.output.data_type)
            .byte_order(self.output.byte_order);
        if let Some(signal) = self.output.missing_data_signal {
            builder = builder.missing_data_signal(signal);
        }
        let mut canvas = DataRaster::new(builder.build()?)?;
        if self.output.pixel_format == PixelFormat::Image {
            canvas.fill(0.0);
        }

        let mut drawn = 0;
        for source in self.sources.iter().filter(|s| s.sector().intersects(&sector)) {
            match source.draw_on_to(&mut canvas) {
                Ok(()) => drawn += 1,
                Err(e) => warn!(
                    dataset = %self.dataset,
                    path = %source.path().display(),
                    error = %e,
                    "Raster source failed, skipping"
                ),
            }
        }

        if drawn == 0 {
            return Err(RasterServerError::NoCoverage(sector));
        }
        Ok(canvas)
    }

    /// Compose and encode: raw samples for elevation output, PNG for images.
    pub fn compose_bytes(
        &self,
        sector: Sector,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, RasterServerError> {
        let raster = self.compose(sector, width, height)?;
        Ok(match self.output.pixel_format {
            PixelFormat::Elevation => raster.to_bytes(),
            PixelFormat::Image => encode_png(&raster)?,
        })
    }
}

impl std::fmt::Debug for RasterServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterServer")
            .field("dataset", &self.dataset)
            .field("sources", &self.sources.len())
            .field("coverage", &self.coverage)
            .finish()
    }
}
