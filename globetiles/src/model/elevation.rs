//! Tiled elevation model.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::config::{ElevationModelConfig, ModelResources};
use super::error::ModelError;
use super::fetcher::{CachedTile, FetcherStats, ModelEvent, TileDecoder, TileFetcher};
use crate::event::ListenerHandle;
use crate::geo::{LatLon, Sector};
use crate::level::{Level, LevelSet, Tile, TileKey};
use crate::raster::{DataRaster, PixelFormat, RasterParams};
use crate::retrieve::{HttpRetrieverFactory, HttpTransport, RetrieverFactory};
use crate::source::TileSource;

/// Priority of tiles requested by region queries.
const REGION_PRIORITY: f64 = 1.0;
/// Level-zero tiles go first so that some data appears quickly.
const LEVEL_ZERO_PRIORITY: f64 = 2.0;

/// Elevations of a tiled dataset at multiple resolutions.
///
/// Queries answer from whatever tiles are cached and request the rest in the
/// background; listeners are told when tiles arrive. Only
/// [`compose_elevations`](Self::compose_elevations) blocks.
pub struct ElevationModel {
    config: ElevationModelConfig,
    fetcher: TileFetcher,
}

impl ElevationModel {
    pub fn new(
        config: ElevationModelConfig,
        resources: &ModelResources,
        factory: Arc<dyn RetrieverFactory>,
    ) -> Result<Self, ModelError> {
        config.validate()?;
        let level_set = Arc::new(LevelSet::new(config.level_set.clone())?);
        let fetcher = TileFetcher::new(
            config.dataset_name.clone(),
            level_set,
            resources,
            factory,
            elevation_decoder(&config),
            config.disk_load_threads,
        )?;
        Ok(Self { config, fetcher })
    }

    /// Model fetching tiles over HTTP from a WMS or WCS source.
    pub fn from_source(
        config: ElevationModelConfig,
        resources: &ModelResources,
        source: Arc<dyn TileSource>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ModelError> {
        let network = Arc::clone(resources.retrieval.network_status());
        let factory = HttpRetrieverFactory::new(source, transport).with_network_status(network);
        Self::new(config, resources, Arc::new(factory))
    }

    pub fn config(&self) -> &ElevationModelConfig {
        &self.config
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

    pub fn sector(&self) -> &Sector {
        self.level_set().sector()
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.sector().contains(lat, lon)
    }

    pub fn missing_data_signal(&self) -> f64 {
        self.config.missing_data_signal
    }

    pub fn missing_data_replacement(&self) -> f64 {
        self.config.missing_data_replacement
    }

    /// Texel size of the finest level, in radians.
    pub fn best_resolution(&self) -> f64 {
        self.level_set().last_level().texel_size()
    }

    pub fn target_level(&self, sector: &Sector, resolution: f64) -> Option<&Level> {
        self.level_set().target_level(sector, resolution)
    }

    /// Configured elevation range of the dataset.
    pub fn extreme_elevations(&self) -> (f64, f64) {
        (self.config.min_elevation, self.config.max_elevation)
    }

    /// Elevation range over cached coarse data in `sector`, falling back to
    /// the configured range when nothing is cached there.
    pub fn extreme_elevations_in(&self, sector: &Sector) -> (f64, f64) {
        let Some(level) = self.level_set().first_level() else {
            return self.extreme_elevations();
        };

        let mut range: Option<(f64, f64)> = None;
        for tile in self.level_set().tiles_in_sector(level, sector) {
            let Some(cached) = self.fetcher.cached(tile.key()) else {
                continue;
            };
            let raster = cached.raster();
            for y in 0..raster.height() {
                for x in 0..raster.width() {
                    let v = raster.get(x, y);
                    if raster.is_missing(v) {
                        continue;
                    }
                    range = Some(match range {
                        Some((lo, hi)) => (lo.min(v), hi.max(v)),
                        None => (v, v),
                    });
                }
            }
        }
        range.unwrap_or_else(|| self.extreme_elevations())
    }

    /// Replace the missing-data signal with the configured replacement.
    fn map_missing(&self, value: f64) -> f64 {
        if value == self.config.missing_data_signal {
            self.config.missing_data_replacement
        } else {
            value
        }
    }

    /// Elevation at a location with missing data replaced.
    pub fn get_elevation(&self, lat: f64, lon: f64) -> f64 {
        self.map_missing(self.get_unmapped_elevation(lat, lon))
    }

    /// Raw elevation at a location from the finest cached tile.
    ///
    /// Returns the missing-data signal when nothing is known, after
    /// requesting the level-zero tile.
    pub fn get_unmapped_elevation(&self, lat: f64, lon: f64) -> f64 {
        let signal = self.config.missing_data_signal;
        if !self.contains(lat, lon) {
            return signal;
        }

        let level_set = self.level_set();
        for level in level_set.levels().iter().rev().filter(|l| !l.is_empty()) {
            let tile = level_set.tile_at(level, lat, lon);
            if let Some(v) = self
                .fetcher
                .cached(tile.key())
                .and_then(|c| c.raster().interpolate(lat, lon))
            {
                return v;
            }
        }

        if let Some(first) = level_set.first_level() {
            let tile = level_set.tile_at(first, lat, lon);
            self.fetcher.request_tile(&tile, LEVEL_ZERO_PRIORITY);
        }
        signal
    }

    /// Fill `out` with elevations of `points` at up to `target_resolution`
    /// radians per sample.
    ///
    /// Tiles of the target level that are not cached are requested without
    /// blocking; meanwhile coarser cached tiles answer. Only resolved points
    /// are written. Returns the worst texel size actually used, or `None`
    /// when no point was resolved.
    pub fn get_elevations(
        &self,
        sector: &Sector,
        points: &[LatLon],
        target_resolution: f64,
        out: &mut [f64],
    ) -> Option<f64> {
        let level_set = self.level_set();
        let target = level_set.target_level(sector, target_resolution)?;

        for tile in level_set.tiles_in_sector(target, sector) {
            self.fetcher.cached_or_request(&tile, REGION_PRIORITY);
        }

        let candidates: Vec<&Level> = level_set.levels()[..=target.number]
            .iter()
            .rev()
            .filter(|l| !l.is_empty())
            .collect();
        let mut lookups: HashMap<TileKey, Option<Arc<CachedTile>>> = HashMap::new();
        let mut achieved: Option<f64> = None;

        for (point, slot) in points.iter().zip(out.iter_mut()) {
            if !self.contains(point.lat, point.lon) {
                continue;
            }
            for level in &candidates {
                let tile = level_set.tile_at(level, point.lat, point.lon);
                let cached = lookups
                    .entry(tile.key().clone())
                    .or_insert_with(|| self.fetcher.cached(tile.key()));
                let Some(value) = cached
                    .as_ref()
                    .and_then(|c| c.raster().interpolate(point.lat, point.lon))
                else {
                    continue;
                };
                *slot = value;
                let texel = level.texel_size();
                achieved = Some(achieved.map_or(texel, |a: f64| a.max(texel)));
                break;
            }
        }

        debug!(
            dataset = %self.config.dataset_name,
            target_level = target.number,
            points = points.len(),
            resolved = achieved.is_some(),
            "Elevations resolved"
        );
        achieved
    }

    /// Fetch one tile spanning `sector` on the calling thread and fill `out`
    /// with mapped elevations of `points`.
    pub fn compose_elevations(
        &self,
        sector: &Sector,
        points: &[LatLon],
        tile_width: u32,
        out: &mut [f64],
    ) -> Result<(), ModelError> {
        self.compose_elevations_with(sector, points, tile_width, out, &CancellationToken::new())
    }

    /// [`compose_elevations`](Self::compose_elevations) with a caller
    /// supplied cancellation token.
    pub fn compose_elevations_with(
        &self,
        sector: &Sector,
        points: &[LatLon],
        tile_width: u32,
        out: &mut [f64],
        cancel: &CancellationToken,
    ) -> Result<(), ModelError> {
        if tile_width < 2 {
            return Err(ModelError::InvalidConfig(format!(
                "composition tile width {tile_width} is below 2"
            )));
        }
        let key = TileKey::new(0, 0, 0, format!("{}-compose", self.config.level_set.cache_name));
        let tile = Tile::standalone(
            key,
            *sector,
            tile_width,
            tile_width,
            self.config.level_set.format_suffix.clone(),
        );
        let raster = self.fetcher.fetch_blocking(&tile, cancel)?;

        for (point, slot) in points.iter().zip(out.iter_mut()) {
            *slot = raster
                .interpolate(point.lat, point.lon)
                .map_or(self.config.missing_data_replacement, |v| self.map_missing(v));
        }
        Ok(())
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

fn elevation_decoder(config: &ElevationModelConfig) -> TileDecoder {
    let data_type = config.data_type;
    let byte_order = config.byte_order;
    let signal = config.missing_data_signal;
    Arc::new(move |tile: &Tile, bytes: &[u8]| {
        let params = RasterParams::builder()
            .size(tile.width(), tile.height())
            .sector(*tile.sector())
            .pixel_format(PixelFormat::Elevation)
            .data_type(data_type)
            .byte_order(byte_order)
            .missing_data_signal(signal)
            .build()?;
        DataRaster::from_bytes(params, bytes)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::filestore::{FileStore, StoreLocation};
    use crate::level::LevelSetConfig;
    use crate::retrieve::{MockResponse, MockTransport, RetrievalConfig, RetrievalService};
    use crate::source::{ServiceVersion, WmsTileSource};
    use std::time::Duration;
    use tempfile::TempDir;

    const SIGNAL: f64 = -32768.0;

    fn resources(dir: &TempDir) -> ModelResources {
        ModelResources::new(
            Arc::new(MemoryCache::new(1 << 20)),
            Arc::new(
                FileStore::with_locations(Some(StoreLocation::new(dir.path())), Vec::new())
                    .unwrap(),
            ),
            Arc::new(
                RetrievalService::new(&RetrievalConfig {
                    worker_threads: 2,
                    ..Default::default()
                })
                .unwrap(),
            ),
        )
    }

    fn config() -> ElevationModelConfig {
        let mut config = ElevationModelConfig::new(
            "test",
            LevelSetConfig::new("test/dem", LatLon::new(90.0, 90.0), 2, 2),
        );
        config.missing_data_replacement = -1.0;
        config
    }

    fn model(dir: &TempDir, body: Vec<u8>) -> (ElevationModel, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new(MockResponse::ok(body)));
        let source = WmsTileSource::new(
            "http://example.com/wms",
            ServiceVersion::WMS_1_3_0,
            vec!["dem".into()],
            "application/bil16",
        )
        .unwrap();
        let model =
            ElevationModel::from_source(config(), &resources(dir), Arc::new(source), transport.clone())
                .unwrap();
        (model, transport)
    }

    fn samples(values: [i16; 4]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn put(model: &ElevationModel, level: usize, lat: f64, lon: f64, values: [i16; 4]) {
        let level_set = model.level_set();
        let tile = level_set.tile_at(level_set.level(level).unwrap(), lat, lon);
        let raster = elevation_decoder(model.config())(&tile, &samples(values)).unwrap();
        let size = raster.size_in_bytes();
        model.fetcher().memory_cache().add(
            tile.key().clone(),
            Arc::new(CachedTile::new(raster, None)),
            size,
        );
    }

    #[test]
    fn test_unknown_location_returns_signal_and_requests_level_zero() {
        let dir = TempDir::new().unwrap();
        let (model, transport) = model(&dir, samples([5, 5, 5, 5]));

        assert_eq!(model.get_unmapped_elevation(10.0, 10.0), SIGNAL);
        assert!(model.fetcher().wait_for_pending(Duration::from_secs(5)));
        assert!(transport.request_count() >= 1);
        assert_eq!(model.get_unmapped_elevation(10.0, 10.0), 5.0);
    }

    #[test]
    fn test_missing_data_mapping() {
        let dir = TempDir::new().unwrap();
        let (model, _) = model(&dir, Vec::new());
        // Level-zero tile spanning lat 0..90, lon 0..90, all voids.
        put(&model, 0, 45.0, 45.0, [i16::MIN; 4]);

        assert_eq!(model.get_unmapped_elevation(45.0, 45.0), SIGNAL);
        assert_eq!(model.get_elevation(45.0, 45.0), -1.0);
    }

    #[test]
    fn test_finest_cached_level_wins() {
        let dir = TempDir::new().unwrap();
        let (model, _) = model(&dir, Vec::new());
        put(&model, 0, 45.0, 45.0, [100; 4]);
        assert_eq!(model.get_elevation(30.0, 30.0), 100.0);
        put(&model, 1, 30.0, 30.0, [200; 4]);
        assert_eq!(model.get_elevation(30.0, 30.0), 200.0);
    }

    #[test]
    fn test_get_elevations_falls_back_to_coarser_level() {
        let dir = TempDir::new().unwrap();
        let (model, _) = model(&dir, Vec::new());
        put(&model, 0, 45.0, 45.0, [100; 4]);

        let sector = Sector::new(10.0, 20.0, 10.0, 20.0).unwrap();
        let points = [LatLon::new(12.0, 12.0), LatLon::new(-50.0, -50.0)];
        let mut out = [f64::NAN; 2];
        let fine = model.best_resolution();

        let achieved = model.get_elevations(&sector, &points, fine, &mut out);
        let level_zero = model.level_set().level(0).unwrap().texel_size();
        assert_eq!(achieved, Some(level_zero));
        assert_eq!(out[0], 100.0);
        // Unresolved points are left untouched.
        assert!(out[1].is_nan());
    }

    #[test]
    fn test_get_elevations_outside_dataset() {
        let dir = TempDir::new().unwrap();
        let mut config = config();
        config.level_set.sector = Sector::new(0.0, 10.0, 0.0, 10.0).unwrap();
        config.level_set.tile_origin = LatLon::new(0.0, 0.0);
        config.level_set.level_zero_delta = LatLon::new(10.0, 10.0);
        let model = ElevationModel::new(
            config,
            &resources(&dir),
            Arc::new(HttpRetrieverFactory::new(
                Arc::new(
                    WmsTileSource::new(
                        "http://example.com/wms",
                        ServiceVersion::WMS_1_3_0,
                        vec!["dem".into()],
                        "application/bil16",
                    )
                    .unwrap(),
                ),
                Arc::new(MockTransport::new(MockResponse::ok(Vec::new()))),
            )),
        )
        .unwrap();

        let mut out = [7.0; 1];
        let sector = Sector::new(20.0, 30.0, 20.0, 30.0).unwrap();
        assert_eq!(
            model.get_elevations(&sector, &[LatLon::new(25.0, 25.0)], 1.0, &mut out),
            None
        );
        assert_eq!(out[0], 7.0);
        assert_eq!(model.get_unmapped_elevation(25.0, 25.0), SIGNAL);
    }

    #[test]
    fn test_extreme_elevations_in_sector() {
        let dir = TempDir::new().unwrap();
        let (model, _) = model(&dir, Vec::new());
        let sector = Sector::new(10.0, 20.0, 10.0, 20.0).unwrap();
        assert_eq!(model.extreme_elevations_in(&sector), model.extreme_elevations());

        put(&model, 0, 45.0, 45.0, [-5, 40, i16::MIN, 12]);
        assert_eq!(model.extreme_elevations_in(&sector), (-5.0, 40.0));
    }

    #[test]
    fn test_compose_elevations_blocks_and_maps() {
        let dir = TempDir::new().unwrap();
        let (model, transport) = model(&dir, samples([10, 20, 30, i16::MIN]));
        let sector = Sector::new(0.0, 1.0, 0.0, 1.0).unwrap();
        let points = [
            LatLon::new(1.0, 0.0),
            LatLon::new(0.0, 0.0),
            LatLon::new(5.0, 5.0),
        ];
        let mut out = [0.0; 3];

        model.compose_elevations(&sector, &points, 2, &mut out).unwrap();
        assert_eq!(out, [10.0, 30.0, -1.0]);
        assert_eq!(transport.request_count(), 1);
        assert!(matches!(
            model.compose_elevations(&sector, &points, 1, &mut out),
            Err(ModelError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let dir = TempDir::new().unwrap();
        let mut config = config();
        config.level_set.num_levels = 0;
        let transport = Arc::new(MockTransport::new(MockResponse::ok(Vec::new())));
        let source = WmsTileSource::new(
            "http://example.com/wms",
            ServiceVersion::WMS_1_3_0,
            vec!["dem".into()],
            "application/bil16",
        )
        .unwrap();
        assert!(matches!(
            ElevationModel::from_source(config, &resources(&dir), Arc::new(source), transport),
            Err(ModelError::Level(_))
        ));
    }
}
