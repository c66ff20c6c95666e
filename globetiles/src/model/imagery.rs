//! Tiled imagery model.

use std::sync::Arc;

use tracing::debug;

use super::config::{ImageryModelConfig, ModelResources};
use super::error::ModelError;
use super::fetcher::{FetcherStats, ModelEvent, TileDecoder, TileFetcher};
use crate::event::ListenerHandle;
use crate::geo::Sector;
use crate::level::{LevelSet, Tile};
use crate::raster::{decode_image, ByteOrder, DataRaster, DataType, PixelFormat, RasterParams};
use crate::retrieve::{HttpRetrieverFactory, HttpTransport, RetrieverFactory};
use crate::source::TileSource;

const REQUEST_PRIORITY: f64 = 1.0;

/// Imagery of a tiled dataset, composed on demand onto canvas rasters.
pub struct ImageryModel {
    config: ImageryModelConfig,
    fetcher: TileFetcher,
}

impl ImageryModel {
    pub fn new(
        config: ImageryModelConfig,
        resources: &ModelResources,
        factory: Arc<dyn RetrieverFactory>,
    ) -> Result<Self, ModelError> {
        config.validate()?;
        let level_set = Arc::new(LevelSet::new(config.level_set.clone())?);
        let decoder: TileDecoder =
            Arc::new(|tile: &Tile, bytes: &[u8]| decode_image(bytes, *tile.sector()));
        let fetcher = TileFetcher::new(
            config.dataset_name.clone(),
            level_set,
            resources,
            factory,
            decoder,
            config.disk_load_threads,
        )?;
        Ok(Self { config, fetcher })
    }

    pub fn from_source(
        config: ImageryModelConfig,
        resources: &ModelResources,
        source: Arc<dyn TileSource>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ModelError> {
        let network = Arc::clone(resources.retrieval.network_status());
        let factory = HttpRetrieverFactory::new(source, transport).with_network_status(network);
        Self::new(config, resources, Arc::new(factory))
    }

    pub fn name(&self) -> &str {
        &self.config.dataset_name
    }

    pub fn level_set(&self) -> &LevelSet {
        self.fetcher.level_set()
    }

    pub fn fetcher(&self) -> &TileFetcher {
        &self.fetcher
    }

    /// Request the tiles covering `sector` at `resolution` radians per
    /// pixel. Returns how many of them are not available yet.
    pub fn request_tiles(&self, sector: &Sector, resolution: f64) -> usize {
        let level_set = self.level_set();
        let Some(target) = level_set.target_level(sector, resolution) else {
            return 0;
        };
        level_set
            .tiles_in_sector(target, sector)
            .iter()
            .filter(|tile| self.fetcher.cached_or_request(tile, REQUEST_PRIORITY).is_none())
            .count()
    }

    /// Draw every cached tile over `sector` onto a `width` x `height`
    /// canvas, coarse levels first so finer data ends on top. Tiles of the
    /// matching level that are not cached yet are requested.
    pub fn compose(
        &self,
        sector: &Sector,
        width: u32,
        height: u32,
    ) -> Result<DataRaster, ModelError> {
        let params = RasterParams::builder()
            .size(width, height)
            .sector(*sector)
            .pixel_format(PixelFormat::Image)
            .data_type(DataType::Int32)
            .byte_order(ByteOrder::LittleEndian)
            .build()?;
        let mut canvas = DataRaster::new(params)?;

        let level_set = self.level_set();
        let resolution = sector.delta_lat_radians() / f64::from(height);
        let Some(target) = level_set.target_level(sector, resolution) else {
            return Ok(canvas);
        };
        self.request_tiles(sector, resolution);

        let mut drawn = 0usize;
        for level in level_set.levels()[..=target.number]
            .iter()
            .filter(|l| !l.is_empty())
        {
            for tile in level_set.tiles_in_sector(level, sector) {
                if let Some(cached) = self.fetcher.cached(tile.key()) {
                    cached.raster().draw_on_to(&mut canvas);
                    drawn += 1;
                }
            }
        }

        debug!(
            dataset = %self.config.dataset_name,
            target_level = target.number,
            tiles = drawn,
            "Imagery composed"
        );
        Ok(canvas)
    }

    pub fn add_change_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&ModelEvent) + Send + Sync + 'static,
    {
        self.fetcher.add_change_listener(listener)
    }

    pub fn remove_change_listener(&self, handle: ListenerHandle) -> bool {
        self.fetcher.remove_change_listener(handle)
    }

    pub fn stats(&self) -> FetcherStats {
        self.fetcher.stats()
    }
}
