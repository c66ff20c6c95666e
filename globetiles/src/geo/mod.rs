//! Geographic primitives.
//!
//! [`LatLon`] locations and [`Sector`] bounding boxes in degrees. Sectors are
//! the spatial key used by levels, tiles, rasters and model queries.

mod types;

#[cfg(test)]
mod tests;

pub use types::{GeoError, LatLon, Sector, MAX_LAT, MAX_LON, MIN_LAT, MIN_LON};

/// Linear interpolation between two values.
#[inline]
pub(crate) fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Normalizes a longitude to the range [-180, 180].
#[inline]
pub fn normalize_longitude(lon: f64) -> f64 {
    if (MIN_LON..=MAX_LON).contains(&lon) {
        return lon;
    }
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lon > 0.0 {
        180.0
    } else {
        wrapped
    }
}
