//! Georeferenced sample grids.

use super::buffer::RasterBuffer;
use super::types::{PixelFormat, RasterError, RasterOrigin, RasterParams};
use crate::geo::{lerp, Sector};

/// A rectangular grid of samples covering a sector.
///
/// Samples are corner registered: column 0 lies on the western edge and
/// column `width - 1` on the eastern edge, likewise for rows.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRaster {
    params: RasterParams,
    buffer: RasterBuffer,
}

impl DataRaster {
    /// Allocate a raster filled with the missing-data signal, or zero when
    /// the raster has none.
    pub fn new(params: RasterParams) -> Result<Self, RasterError> {
        let fill = params.missing_data_signal.unwrap_or(0.0);
        let buffer = RasterBuffer::filled(params.data_type, params.sample_count(), fill)?;
        Ok(Self { params, buffer })
    }

    /// Decode a raster from raw sample bytes.
    pub fn from_bytes(params: RasterParams, bytes: &[u8]) -> Result<Self, RasterError> {
        let expected = params.byte_size();
        if bytes.len() != expected {
            return Err(RasterError::SizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        let buffer = RasterBuffer::from_bytes(params.data_type, params.byte_order, bytes)?;
        Ok(Self { params, buffer })
    }

    /// Wrap an existing buffer.
    pub fn from_buffer(params: RasterParams, buffer: RasterBuffer) -> Result<Self, RasterError> {
        if buffer.len() != params.sample_count() || buffer.data_type() != params.data_type {
            return Err(RasterError::SizeMismatch {
                expected: params.byte_size(),
                actual: buffer.byte_size(),
            });
        }
        Ok(Self { params, buffer })
    }

    pub fn params(&self) -> &RasterParams {
        &self.params
    }

    pub fn width(&self) -> u32 {
        self.params.width
    }

    pub fn height(&self) -> u32 {
        self.params.height
    }

    pub fn sector(&self) -> &Sector {
        &self.params.sector
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.params.pixel_format
    }

    pub fn missing_data_signal(&self) -> Option<f64> {
        self.params.missing_data_signal
    }

    /// Size of the sample buffer in bytes.
    pub fn size_in_bytes(&self) -> usize {
        self.buffer.byte_size()
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.params.width as usize + x as usize
    }

    /// Raw sample at column `x`, row `y`.
    pub fn get(&self, x: u32, y: u32) -> f64 {
        self.buffer.get(self.index(x, y))
    }

    pub fn set(&mut self, x: u32, y: u32, value: f64) {
        let i = self.index(x, y);
        self.buffer.set(i, value);
    }

    /// Fill every sample with `value`.
    pub fn fill(&mut self, value: f64) {
        for i in 0..self.buffer.len() {
            self.buffer.set(i, value);
        }
    }

    /// Whether a sample value means "no data".
    pub fn is_missing(&self, value: f64) -> bool {
        if self.params.missing_data_signal == Some(value) {
            return true;
        }
        match self.params.pixel_format {
            PixelFormat::Image => rgba_alpha(value as i32) == 0,
            PixelFormat::Elevation => value.is_nan(),
        }
    }

    /// Fractional pixel position of a location.
    pub fn pixel_of(&self, lat: f64, lon: f64) -> (f64, f64) {
        let s = &self.params.sector;
        let span_x = f64::from(self.params.width.saturating_sub(1));
        let span_y = f64::from(self.params.height.saturating_sub(1));
        let fx = if s.delta_lon() > 0.0 {
            (lon - s.min_lon()) / s.delta_lon() * span_x
        } else {
            0.0
        };
        let from_top = if s.delta_lat() > 0.0 {
            (s.max_lat() - lat) / s.delta_lat() * span_y
        } else {
            0.0
        };
        let fy = match self.params.origin {
            RasterOrigin::UpperLeft => from_top,
            RasterOrigin::LowerLeft => span_y - from_top,
        };
        (fx, fy)
    }

    /// Location of the sample at column `x`, row `y`.
    pub fn location_of(&self, x: u32, y: u32) -> (f64, f64) {
        let s = &self.params.sector;
        let span_x = f64::from(self.params.width.saturating_sub(1)).max(1.0);
        let span_y = f64::from(self.params.height.saturating_sub(1)).max(1.0);
        let lon = lerp(s.min_lon(), s.max_lon(), f64::from(x) / span_x);
        let row_from_top = match self.params.origin {
            RasterOrigin::UpperLeft => f64::from(y),
            RasterOrigin::LowerLeft => f64::from(self.params.height - 1 - y),
        };
        let lat = lerp(s.max_lat(), s.min_lat(), row_from_top / span_y);
        (lat, lon)
    }

    /// Nearest sample at a location inside the sector, `None` when missing.
    pub fn nearest(&self, lat: f64, lon: f64) -> Option<f64> {
        if !self.params.sector.contains(lat, lon) {
            return None;
        }
        let (fx, fy) = self.pixel_of(lat, lon);
        let x = (fx.round() as i64).clamp(0, i64::from(self.params.width) - 1) as u32;
        let y = (fy.round() as i64).clamp(0, i64::from(self.params.height) - 1) as u32;
        let v = self.get(x, y);
        (!self.is_missing(v)).then_some(v)
    }

    /// Bilinear sample at a location inside the sector.
    ///
    /// Missing corners are excluded and the remaining weights renormalized.
    /// Along the last row or column the missing neighbour collapses onto the
    /// edge sample, giving nearest-sample behaviour. `None` when every
    /// contributing corner is missing.
    pub fn interpolate(&self, lat: f64, lon: f64) -> Option<f64> {
        if !self.params.sector.contains(lat, lon) {
            return None;
        }
        let (fx, fy) = self.pixel_of(lat, lon);
        let max_x = self.params.width - 1;
        let max_y = self.params.height - 1;

        let x0 = (fx.floor().max(0.0) as u32).min(max_x);
        let y0 = (fy.floor().max(0.0) as u32).min(max_y);
        let x1 = (x0 + 1).min(max_x);
        let y1 = (y0 + 1).min(max_y);
        let tx = if x1 == x0 { 0.0 } else { (fx - f64::from(x0)).clamp(0.0, 1.0) };
        let ty = if y1 == y0 { 0.0 } else { (fy - f64::from(y0)).clamp(0.0, 1.0) };

        let corners = [
            (x0, y0, (1.0 - tx) * (1.0 - ty)),
            (x1, y0, tx * (1.0 - ty)),
            (x0, y1, (1.0 - tx) * ty),
            (x1, y1, tx * ty),
        ];

        let mut sum = 0.0;
        let mut weight = 0.0;
        for (x, y, w) in corners {
            if w <= 0.0 {
                continue;
            }
            let v = self.get(x, y);
            if self.is_missing(v) {
                continue;
            }
            sum += v * w;
            weight += w;
        }

        (weight > 1e-12).then(|| sum / weight)
    }

    /// Value at a location using the sampling suited to the pixel format.
    pub fn sample(&self, lat: f64, lon: f64) -> Option<f64> {
        match self.params.pixel_format {
            PixelFormat::Elevation => self.interpolate(lat, lon),
            PixelFormat::Image => self.nearest(lat, lon),
        }
    }

    /// Resample the part of this raster inside `sector` into a new
    /// `width` x `height` raster. Uncovered samples hold the missing signal.
    pub fn get_sub_raster(
        &self,
        width: u32,
        height: u32,
        sector: Sector,
    ) -> Result<DataRaster, RasterError> {
        let mut sub = DataRaster::new(self.params.resized(width, height, sector))?;
        if self.params.pixel_format == PixelFormat::Image {
            sub.fill(0.0);
        }
        self.draw_on_to(&mut sub);
        Ok(sub)
    }

    /// Samples encoded with the raster's data type and byte order.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.buffer.to_bytes(self.params.byte_order)
    }

    /// Composite this raster into `canvas`, limited to the overlap of the
    /// two sectors. Missing source samples leave the canvas untouched.
    pub fn draw_on_to(&self, canvas: &mut DataRaster) {
        let Some(overlap) = self.params.sector.intersection(canvas.sector()) else {
            return;
        };

        // Canvas pixel window covering the overlap.
        let (x_a, y_a) = canvas.pixel_of(overlap.max_lat(), overlap.min_lon());
        let (x_b, y_b) = canvas.pixel_of(overlap.min_lat(), overlap.max_lon());
        let (x_start, x_end) = pixel_window(x_a, x_b, canvas.width());
        let (y_start, y_end) = pixel_window(y_a, y_b, canvas.height());

        for y in y_start..=y_end {
            for x in x_start..=x_end {
                let (lat, lon) = canvas.location_of(x, y);
                if !overlap.contains(lat, lon) {
                    continue;
                }
                if let Some(v) = self.sample(lat, lon) {
                    canvas.set(x, y, v);
                }
            }
        }
    }
}

fn pixel_window(a: f64, b: f64, size: u32) -> (u32, u32) {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let max = f64::from(size.saturating_sub(1));
    let start = lo.floor().clamp(0.0, max) as u32;
    let end = hi.ceil().clamp(0.0, max) as u32;
    (start, end)
}

/// Pack an RGBA color into the `Int32` image sample layout.
pub fn pack_rgba(r: u8, g: u8, b: u8, a: u8) -> i32 {
    u32::from_be_bytes([r, g, b, a]) as i32
}

/// Unpack an `Int32` image sample into RGBA.
pub fn unpack_rgba(value: i32) -> [u8; 4] {
    (value as u32).to_be_bytes()
}

fn rgba_alpha(value: i32) -> u8 {
    unpack_rgba(value)[3]
}
