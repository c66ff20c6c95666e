//! Tile and level hierarchy.
//!
//! A [`LevelSet`] splits a dataset sector into levels of tiles, level `n`
//! having half the tile extent of level `n - 1`. Tiles are addressed by
//! [`TileKey`] and located on disk by [`Tile::path`]. Failed retrievals are
//! remembered in the level set's [`AbsentResourceList`].

mod absent;
mod level_set;
mod types;

pub use absent::{AbsentConfig, AbsentResourceList};
pub use level_set::{LevelSet, LevelSetConfig};
pub use types::{Level, LevelError, Tile, TileKey};
