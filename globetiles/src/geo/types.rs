//! Location and sector types.

use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Geodetic latitude range in degrees
pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;

/// Longitude range in degrees
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// Errors raised when constructing geographic values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    #[error("Invalid latitude: {0} (must be between -90 and 90)")]
    InvalidLatitude(f64),

    #[error("Invalid longitude: {0} (must be between -180 and 180)")]
    InvalidLongitude(f64),

    #[error("Inverted sector: min {min} is greater than max {max} on the {axis} axis")]
    InvertedSector {
        axis: &'static str,
        min: f64,
        max: f64,
    },
}

/// A geographic location in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Latitude in radians.
    pub fn lat_radians(&self) -> f64 {
        self.lat.to_radians()
    }

    /// Longitude in radians.
    pub fn lon_radians(&self) -> f64 {
        self.lon.to_radians()
    }
}

impl fmt::Display for LatLon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}°, {:.6}°)", self.lat, self.lon)
    }
}

/// A geographic bounding box in degrees.
///
/// Immutable value type. Constructors validate that each axis is ordered
/// (`min <= max`) and lies within the valid geodetic range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sector {
    min_lat: f64,
    max_lat: f64,
    min_lon: f64,
    max_lon: f64,
}

impl Sector {
    /// The degenerate sector at the origin.
    pub const EMPTY: Sector = Sector {
        min_lat: 0.0,
        max_lat: 0.0,
        min_lon: 0.0,
        max_lon: 0.0,
    };

    /// The whole globe.
    pub const FULL_SPHERE: Sector = Sector {
        min_lat: MIN_LAT,
        max_lat: MAX_LAT,
        min_lon: MIN_LON,
        max_lon: MAX_LON,
    };

    /// Creates a sector from its four bounds, validating range and ordering.
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Result<Self, GeoError> {
        for lat in [min_lat, max_lat] {
            if !(MIN_LAT..=MAX_LAT).contains(&lat) {
                return Err(GeoError::InvalidLatitude(lat));
            }
        }
        for lon in [min_lon, max_lon] {
            if !(MIN_LON..=MAX_LON).contains(&lon) {
                return Err(GeoError::InvalidLongitude(lon));
            }
        }
        if min_lat > max_lat {
            return Err(GeoError::InvertedSector {
                axis: "latitude",
                min: min_lat,
                max: max_lat,
            });
        }
        if min_lon > max_lon {
            return Err(GeoError::InvertedSector {
                axis: "longitude",
                min: min_lon,
                max: max_lon,
            });
        }
        Ok(Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        })
    }

    /// Creates a sector from two corner locations given in degrees.
    pub fn from_degrees(south_west: LatLon, north_east: LatLon) -> Result<Self, GeoError> {
        Self::new(south_west.lat, north_east.lat, south_west.lon, north_east.lon)
    }

    /// Creates a sector without validation.
    ///
    /// Used internally where the bounds are derived from an already valid
    /// sector (tile subdivision, intersections).
    pub(crate) const fn from_bounds_unchecked(
        min_lat: f64,
        max_lat: f64,
        min_lon: f64,
        max_lon: f64,
    ) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// Smallest sector containing all the given locations.
    pub fn bounding(locations: &[LatLon]) -> Option<Self> {
        let first = locations.first()?;
        let mut sector = Self::from_bounds_unchecked(first.lat, first.lat, first.lon, first.lon);
        for ll in &locations[1..] {
            sector.min_lat = sector.min_lat.min(ll.lat);
            sector.max_lat = sector.max_lat.max(ll.lat);
            sector.min_lon = sector.min_lon.min(ll.lon);
            sector.max_lon = sector.max_lon.max(ll.lon);
        }
        Some(sector)
    }

    pub fn min_lat(&self) -> f64 {
        self.min_lat
    }

    pub fn max_lat(&self) -> f64 {
        self.max_lat
    }

    pub fn min_lon(&self) -> f64 {
        self.min_lon
    }

    pub fn max_lon(&self) -> f64 {
        self.max_lon
    }

    /// Latitude extent in degrees.
    pub fn delta_lat(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Longitude extent in degrees.
    pub fn delta_lon(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn delta_lat_radians(&self) -> f64 {
        self.delta_lat().to_radians()
    }

    pub fn delta_lon_radians(&self) -> f64 {
        self.delta_lon().to_radians()
    }

    pub fn centroid(&self) -> LatLon {
        LatLon::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    /// True when the sector has no area.
    pub fn is_empty(&self) -> bool {
        self.delta_lat() <= 0.0 || self.delta_lon() <= 0.0
    }

    /// Whether the location lies inside the sector (edges inclusive).
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    pub fn contains_location(&self, location: &LatLon) -> bool {
        self.contains(location.lat, location.lon)
    }

    /// Whether this sector fully contains `other`.
    pub fn contains_sector(&self, other: &Sector) -> bool {
        other.min_lat >= self.min_lat
            && other.max_lat <= self.max_lat
            && other.min_lon >= self.min_lon
            && other.max_lon <= self.max_lon
    }

    /// Whether the two sectors share any point (touching edges count).
    pub fn intersects(&self, other: &Sector) -> bool {
        !(other.max_lat < self.min_lat
            || other.min_lat > self.max_lat
            || other.max_lon < self.min_lon
            || other.min_lon > self.max_lon)
    }

    /// The overlapping region, or `None` when the sectors are disjoint.
    pub fn intersection(&self, other: &Sector) -> Option<Sector> {
        if !self.intersects(other) {
            return None;
        }
        Some(Self::from_bounds_unchecked(
            self.min_lat.max(other.min_lat),
            self.max_lat.min(other.max_lat),
            self.min_lon.max(other.min_lon),
            self.max_lon.min(other.max_lon),
        ))
    }

    /// Smallest sector enclosing both.
    pub fn union(&self, other: &Sector) -> Sector {
        Self::from_bounds_unchecked(
            self.min_lat.min(other.min_lat),
            self.max_lat.max(other.max_lat),
            self.min_lon.min(other.min_lon),
            self.max_lon.max(other.max_lon),
        )
    }
}

impl Eq for Sector {}

impl Hash for Sector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.min_lat.to_bits().hash(state);
        self.max_lat.to_bits().hash(state);
        self.min_lon.to_bits().hash(state);
        self.max_lon.to_bits().hash(state);
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.6}, {:.6}] x [{:.6}, {:.6}]",
            self.min_lat, self.max_lat, self.min_lon, self.max_lon
        )
    }
}
