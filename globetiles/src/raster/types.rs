//! Raster metadata and errors.

use crate::geo::Sector;
use std::fmt;
use thiserror::Error;

/// Raster errors.
#[derive(Debug, Error)]
pub enum RasterError {
    /// Buffer allocation failed
    #[error("Out of memory allocating {bytes} bytes for raster")]
    OutOfMemory { bytes: usize },

    #[error("Missing raster parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid raster parameter: {0}")]
    InvalidParameter(String),

    #[error("Raster data size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Cannot decode raster {source_name}: {message}")]
    Decode { source_name: String, message: String },

    #[error("No raster reader for {0}")]
    UnsupportedFormat(String),

    #[error("Raster I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Sample storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int8,
    Int16,
    Int32,
    Float32,
}

impl DataType {
    /// Bytes per sample.
    pub fn size(&self) -> usize {
        match self {
            Self::Int8 => 1,
            Self::Int16 => 2,
            Self::Int32 | Self::Float32 => 4,
        }
    }

    /// Parse a MIME-style or short name (`int16`, `application/bil16`,
    /// `float32`, `application/bil32`).
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "int8" | "byte" | "application/bil8" => Some(Self::Int8),
            "int16" | "short" | "application/bil16" => Some(Self::Int16),
            "int32" | "int" => Some(Self::Int32),
            "float32" | "float" | "application/bil32" => Some(Self::Float32),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Float32 => "float32",
        };
        f.write_str(s)
    }
}

/// What the samples mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Scalar elevation values
    Elevation,
    /// Packed RGBA colors stored as `Int32`
    Image,
}

/// Byte order of encoded samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "little" | "littleendian" | "little_endian" | "le" => Some(Self::LittleEndian),
            "big" | "bigendian" | "big_endian" | "be" => Some(Self::BigEndian),
            _ => None,
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LittleEndian => "little",
            Self::BigEndian => "big",
        })
    }
}

/// Coordinate reference system of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CoordinateSystem {
    /// Geographic latitude/longitude on WGS84
    #[default]
    GeographicWgs84,
}

/// Which corner row 0 starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RasterOrigin {
    #[default]
    UpperLeft,
    LowerLeft,
}

/// Raster metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterParams {
    pub width: u32,
    pub height: u32,
    pub sector: Sector,
    pub pixel_format: PixelFormat,
    pub data_type: DataType,
    pub byte_order: ByteOrder,
    pub missing_data_signal: Option<f64>,
    pub coordinate_system: CoordinateSystem,
    pub origin: RasterOrigin,
}

impl RasterParams {
    pub fn builder() -> RasterParamsBuilder {
        RasterParamsBuilder::default()
    }

    /// Same metadata with a different size and extent.
    pub fn resized(&self, width: u32, height: u32, sector: Sector) -> Self {
        Self {
            width,
            height,
            sector,
            ..self.clone()
        }
    }

    pub fn sample_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn byte_size(&self) -> usize {
        self.sample_count() * self.data_type.size()
    }
}

/// Builder for [`RasterParams`] validating the required fields.
#[derive(Debug, Clone, Default)]
pub struct RasterParamsBuilder {
    width: Option<u32>,
    height: Option<u32>,
    sector: Option<Sector>,
    pixel_format: Option<PixelFormat>,
    data_type: Option<DataType>,
    byte_order: Option<ByteOrder>,
    missing_data_signal: Option<f64>,
    coordinate_system: CoordinateSystem,
    origin: RasterOrigin,
}

impl RasterParamsBuilder {
    pub fn width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn size(self, width: u32, height: u32) -> Self {
        self.width(width).height(height)
    }

    pub fn sector(mut self, sector: Sector) -> Self {
        self.sector = Some(sector);
        self
    }

    pub fn pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = Some(format);
        self
    }

    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = Some(order);
        self
    }

    pub fn missing_data_signal(mut self, signal: f64) -> Self {
        self.missing_data_signal = Some(signal);
        self
    }

    pub fn coordinate_system(mut self, crs: CoordinateSystem) -> Self {
        self.coordinate_system = crs;
        self
    }

    pub fn origin(mut self, origin: RasterOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn build(self) -> Result<RasterParams, RasterError> {
        let width = self.width.ok_or(RasterError::MissingParameter("width"))?;
        let height = self.height.ok_or(RasterError::MissingParameter("height"))?;
        let sector = self.sector.ok_or(RasterError::MissingParameter("sector"))?;
        let pixel_format = self
            .pixel_format
            .ok_or(RasterError::MissingParameter("pixel format"))?;
        let data_type = self
            .data_type
            .ok_or(RasterError::MissingParameter("data type"))?;
        let byte_order = self
            .byte_order
            .ok_or(RasterError::MissingParameter("byte order"))?;

        if width == 0 || height == 0 {
            return Err(RasterError::InvalidParameter(format!(
                "raster size {width}x{height} must be positive"
            )));
        }
        if pixel_format == PixelFormat::Image && data_type != DataType::Int32 {
            return Err(RasterError::InvalidParameter(
                "image rasters store packed RGBA as int32".to_string(),
            ));
        }

        Ok(RasterParams {
            width,
            height,
            sector,
            pixel_format,
            data_type,
            byte_order,
            missing_data_signal: self.missing_data_signal,
            coordinate_system: self.coordinate_system,
            origin: self.origin,
        })
    }
}
