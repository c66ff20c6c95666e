//! Level, tile key and tile types.

use crate::geo::{LatLon, Sector};
use std::fmt;
use thiserror::Error;

/// Level hierarchy errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LevelError {
    #[error("Invalid level set configuration: {0}")]
    InvalidConfig(String),

    #[error("Level {0} out of range")]
    LevelOutOfRange(usize),
}

/// One resolution level of a tiled dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    pub number: usize,
    /// Extent of one tile in degrees
    pub tile_delta: LatLon,
    pub tile_width: u32,
    pub tile_height: u32,
    pub cache_name: String,
    /// File suffix including the dot, e.g. `.bil`
    pub format_suffix: String,
    /// Placeholder level with no data
    pub empty: bool,
}

impl Level {
    /// Size of one texel in radians of latitude.
    pub fn texel_size(&self) -> f64 {
        self.tile_delta.lat.to_radians() / self.tile_height as f64
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Relative directory holding this level's tiles.
    pub fn path(&self) -> String {
        format!("{}/{}", self.cache_name, self.number)
    }
}

/// Identity of a tile: the unit of caching and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub level: usize,
    pub row: i32,
    pub col: i32,
    pub cache_name: String,
}

impl TileKey {
    pub fn new(level: usize, row: i32, col: i32, cache_name: impl Into<String>) -> Self {
        Self {
            level,
            row,
            col,
            cache_name: cache_name.into(),
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.cache_name, self.level, self.row, self.col
        )
    }
}

/// A tile: key, geographic extent and pixel size.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    key: TileKey,
    sector: Sector,
    width: u32,
    height: u32,
    format_suffix: String,
}

impl Tile {
    pub fn new(key: TileKey, sector: Sector, level: &Level) -> Self {
        Self {
            key,
            sector,
            width: level.tile_width,
            height: level.tile_height,
            format_suffix: level.format_suffix.clone(),
        }
    }

    /// A free-standing tile covering `sector`, used for one-off composition.
    pub fn standalone(
        key: TileKey,
        sector: Sector,
        width: u32,
        height: u32,
        format_suffix: impl Into<String>,
    ) -> Self {
        Self {
            key,
            sector,
            width,
            height,
            format_suffix: format_suffix.into(),
        }
    }

    pub fn key(&self) -> &TileKey {
        &self.key
    }

    pub fn sector(&self) -> &Sector {
        &self.sector
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn level(&self) -> usize {
        self.key.level
    }

    pub fn row(&self) -> i32 {
        self.key.row
    }

    pub fn col(&self) -> i32 {
        self.key.col
    }

    pub fn format_suffix(&self) -> &str {
        &self.format_suffix
    }

    /// Texel size in radians of latitude.
    pub fn texel_size(&self) -> f64 {
        self.sector.delta_lat_radians() / self.height as f64
    }

    /// Relative file store path: `<cache>/<level>/<row>/<row>_<col><suffix>`.
    ///
    /// Rows and columns are zero-padded to four digits.
    pub fn path(&self) -> String {
        format!(
            "{}/{}/{:04}/{:04}_{:04}{}",
            self.key.cache_name,
            self.key.level,
            self.key.row,
            self.key.row,
            self.key.col,
            self.format_suffix
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(delta: f64, size: u32) -> Level {
        Level {
            number: 2,
            tile_delta: LatLon::new(delta, delta),
            tile_width: size,
            tile_height: size,
            cache_name: "Earth/SRTM".to_string(),
            format_suffix: ".bil".to_string(),
            empty: false,
        }
    }

    #[test]
    fn test_texel_size() {
        let l = level(10.0, 100);
        assert!((l.texel_size() - 10f64.to_radians() / 100.0).abs() < 1e-15);
    }

    #[test]
    fn test_tile_path_layout() {
        let l = level(10.0, 150);
        let key = TileKey::new(2, 5, 17, "Earth/SRTM");
        let tile = Tile::new(key, Sector::new(0.0, 10.0, 0.0, 10.0).unwrap(), &l);
        assert_eq!(tile.path(), "Earth/SRTM/2/0005/0005_0017.bil");
        assert_eq!(tile.width(), 150);
        assert_eq!(l.path(), "Earth/SRTM/2");
    }

    #[test]
    fn test_tile_key_equality_and_display() {
        let a = TileKey::new(1, 2, 3, "c");
        let b = TileKey::new(1, 2, 3, "c");
        assert_eq!(a, b);
        assert_ne!(a, TileKey::new(1, 2, 4, "c"));
        assert_eq!(a.to_string(), "c/1/2/3");
    }
}
