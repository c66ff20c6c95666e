//! Ordered set of levels over a dataset sector.

use super::absent::{AbsentConfig, AbsentResourceList};
use super::types::{Level, LevelError, Tile, TileKey};
use crate::geo::{LatLon, Sector};
use std::collections::HashMap;

/// Parameters describing a level hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelSetConfig {
    pub sector: Sector,
    pub tile_origin: LatLon,
    pub level_zero_delta: LatLon,
    pub num_levels: usize,
    /// Leading levels with no data
    pub num_empty_levels: usize,
    pub tile_width: u32,
    pub tile_height: u32,
    /// Per-level `(width, height)` overrides
    pub tile_size_overrides: HashMap<usize, (u32, u32)>,
    pub cache_name: String,
    pub format_suffix: String,
    pub absent: AbsentConfig,
}

impl LevelSetConfig {
    pub fn new(
        cache_name: impl Into<String>,
        level_zero_delta: LatLon,
        num_levels: usize,
        tile_size: u32,
    ) -> Self {
        Self {
            sector: Sector::FULL_SPHERE,
            tile_origin: LatLon::new(-90.0, -180.0),
            level_zero_delta,
            num_levels,
            num_empty_levels: 0,
            tile_width: tile_size,
            tile_height: tile_size,
            tile_size_overrides: HashMap::new(),
            cache_name: cache_name.into(),
            format_suffix: ".bil".to_string(),
            absent: AbsentConfig::default(),
        }
    }
}

/// Multi-resolution level hierarchy, coarsest (0) to finest.
#[derive(Debug)]
pub struct LevelSet {
    sector: Sector,
    tile_origin: LatLon,
    level_zero_delta: LatLon,
    levels: Vec<Level>,
    absent: AbsentResourceList<TileKey>,
}

impl LevelSet {
    /// Build the level hierarchy, validating the configuration.
    pub fn new(config: LevelSetConfig) -> Result<Self, LevelError> {
        if config.num_levels == 0 {
            return Err(LevelError::InvalidConfig("at least one level is required".into()));
        }
        if config.num_empty_levels > config.num_levels {
            return Err(LevelError::InvalidConfig(format!(
                "{} empty levels exceed {} levels",
                config.num_empty_levels, config.num_levels
            )));
        }
        if config.level_zero_delta.lat <= 0.0 || config.level_zero_delta.lon <= 0.0 {
            return Err(LevelError::InvalidConfig(
                "level-zero tile delta must be positive".into(),
            ));
        }
        if config.tile_width == 0 || config.tile_height == 0 {
            return Err(LevelError::InvalidConfig("tile size must be positive".into()));
        }
        if config.cache_name.is_empty() {
            return Err(LevelError::InvalidConfig("cache name is required".into()));
        }

        let mut levels = Vec::with_capacity(config.num_levels);
        for number in 0..config.num_levels {
            let scale = f64::from(1u32 << number.min(31));
            let (tile_width, tile_height) = config
                .tile_size_overrides
                .get(&number)
                .copied()
                .unwrap_or((config.tile_width, config.tile_height));
            if tile_width == 0 || tile_height == 0 {
                return Err(LevelError::InvalidConfig(format!(
                    "tile size override for level {number} must be positive"
                )));
            }
            levels.push(Level {
                number,
                tile_delta: LatLon::new(
                    config.level_zero_delta.lat / scale,
                    config.level_zero_delta.lon / scale,
                ),
                tile_width,
                tile_height,
                cache_name: config.cache_name.clone(),
                format_suffix: config.format_suffix.clone(),
                empty: number < config.num_empty_levels,
            });
        }

        Ok(Self {
            sector: config.sector,
            tile_origin: config.tile_origin,
            level_zero_delta: config.level_zero_delta,
            levels,
            absent: AbsentResourceList::new(config.absent),
        })
    }

    pub fn sector(&self) -> &Sector {
        &self.sector
    }

    pub fn tile_origin(&self) -> LatLon {
        self.tile_origin
    }

    pub fn level_zero_delta(&self) -> LatLon {
        self.level_zero_delta
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, number: usize) -> Result<&Level, LevelError> {
        self.levels
            .get(number)
            .ok_or(LevelError::LevelOutOfRange(number))
    }

    /// Coarsest level holding data.
    pub fn first_level(&self) -> Option<&Level> {
        self.levels.iter().find(|l| !l.empty)
    }

    pub fn last_level(&self) -> &Level {
        // Construction guarantees at least one level.
        &self.levels[self.levels.len() - 1]
    }

    pub fn absent(&self) -> &AbsentResourceList<TileKey> {
        &self.absent
    }

    pub fn is_absent(&self, key: &TileKey) -> bool {
        self.absent.is_absent(key)
    }

    pub fn mark_absent(&self, key: &TileKey) {
        self.absent.mark_absent(key);
    }

    pub fn unmark_absent(&self, key: &TileKey) {
        self.absent.unmark_absent(key);
    }

    /// Level to use for `sector` at `resolution` radians per sample.
    ///
    /// The coarsest non-empty level whose texel size is at most the
    /// requested resolution, or the finest level when none is fine enough.
    /// `None` when the sector misses the dataset.
    pub fn target_level(&self, sector: &Sector, resolution: f64) -> Option<&Level> {
        if !self.sector.intersects(sector) {
            return None;
        }
        self.levels
            .iter()
            .filter(|l| !l.empty)
            .find(|l| l.texel_size() <= resolution)
            .or_else(|| self.levels.last())
    }

    fn row_count(&self, level: &Level) -> i32 {
        ((self.sector.max_lat() - self.tile_origin.lat) / level.tile_delta.lat).ceil() as i32
    }

    fn col_count(&self, level: &Level) -> i32 {
        ((self.sector.max_lon() - self.tile_origin.lon) / level.tile_delta.lon).ceil() as i32
    }

    /// Row containing `lat`; the top edge belongs to the last row.
    pub fn tile_row(&self, level: &Level, lat: f64) -> i32 {
        let row = ((lat - self.tile_origin.lat) / level.tile_delta.lat).floor() as i32;
        row.min(self.row_count(level) - 1).max(0)
    }

    /// Column containing `lon`; the right edge belongs to the last column.
    pub fn tile_col(&self, level: &Level, lon: f64) -> i32 {
        let col = ((lon - self.tile_origin.lon) / level.tile_delta.lon).floor() as i32;
        col.min(self.col_count(level) - 1).max(0)
    }

    /// Sector covered by a tile.
    pub fn tile_sector(&self, level: &Level, row: i32, col: i32) -> Sector {
        let d = level.tile_delta;
        let min_lat = self.tile_origin.lat + f64::from(row) * d.lat;
        let min_lon = self.tile_origin.lon + f64::from(col) * d.lon;
        Sector::from_bounds_unchecked(min_lat, min_lat + d.lat, min_lon, min_lon + d.lon)
    }

    pub fn create_tile(&self, level: &Level, row: i32, col: i32) -> Tile {
        let key = TileKey::new(level.number, row, col, level.cache_name.clone());
        Tile::new(key, self.tile_sector(level, row, col), level)
    }

    /// Tile for a key produced by this level set.
    pub fn tile_for_key(&self, key: &TileKey) -> Result<Tile, LevelError> {
        let level = self.level(key.level)?;
        Ok(self.create_tile(level, key.row, key.col))
    }

    /// Tile of `level` containing the location.
    pub fn tile_at(&self, level: &Level, lat: f64, lon: f64) -> Tile {
        self.create_tile(level, self.tile_row(level, lat), self.tile_col(level, lon))
    }

    /// Every tile of `level` intersecting `sector`, row-major from the
    /// south-west.
    pub fn tiles_in_sector(&self, level: &Level, sector: &Sector) -> Vec<Tile> {
        let Some(region) = self.sector.intersection(sector) else {
            return Vec::new();
        };
        let (r0, r1) = (
            self.tile_row(level, region.min_lat()),
            self.tile_row(level, region.max_lat()),
        );
        let (c0, c1) = (
            self.tile_col(level, region.min_lon()),
            self.tile_col(level, region.max_lon()),
        );

        let mut tiles = Vec::with_capacity(((r1 - r0 + 1) * (c1 - c0 + 1)).max(0) as usize);
        for row in r0..=r1 {
            for col in c0..=c1 {
                tiles.push(self.create_tile(level, row, col));
            }
        }
        tiles
    }
}
