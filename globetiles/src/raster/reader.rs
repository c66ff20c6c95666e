//! Decoding raster files and tile payloads.

use std::io::Cursor;
use std::path::Path;

use image::{Rgba, RgbaImage};

use super::data_raster::{pack_rgba, unpack_rgba, DataRaster};
use super::types::{ByteOrder, DataType, PixelFormat, RasterError, RasterParams};
use crate::geo::Sector;

/// What a reader needs to know about a file beyond its bytes.
///
/// Raw formats carry no header, so their size and sample layout come from
/// configuration. Image formats only need the sector.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterDescriptor {
    pub sector: Sector,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub data_type: Option<DataType>,
    pub byte_order: ByteOrder,
    pub missing_data_signal: Option<f64>,
}

impl RasterDescriptor {
    pub fn new(sector: Sector) -> Self {
        Self {
            sector,
            width: None,
            height: None,
            data_type: None,
            byte_order: ByteOrder::LittleEndian,
            missing_data_signal: None,
        }
    }

    /// Describe a raw elevation grid.
    pub fn elevation(
        sector: Sector,
        width: u32,
        height: u32,
        data_type: DataType,
        byte_order: ByteOrder,
    ) -> Self {
        Self {
            sector,
            width: Some(width),
            height: Some(height),
            data_type: Some(data_type),
            byte_order,
            missing_data_signal: None,
        }
    }

    pub fn with_missing_data_signal(mut self, signal: f64) -> Self {
        self.missing_data_signal = Some(signal);
        self
    }

    fn elevation_params(&self) -> Result<RasterParams, RasterError> {
        let mut builder = RasterParams::builder()
            .sector(self.sector)
            .pixel_format(PixelFormat::Elevation)
            .byte_order(self.byte_order);
        if let Some(width) = self.width {
            builder = builder.width(width);
        }
        if let Some(height) = self.height {
            builder = builder.height(height);
        }
        if let Some(data_type) = self.data_type {
            builder = builder.data_type(data_type);
        }
        if let Some(signal) = self.missing_data_signal {
            builder = builder.missing_data_signal(signal);
        }
        builder.build()
    }
}

/// Reads one file into one or more rasters.
pub trait DataRasterReader: Send + Sync {
    /// Short format name used in logs.
    fn format_name(&self) -> &'static str;

    /// Whether this reader handles the file, judged by its extension.
    fn can_read(&self, path: &Path) -> bool;

    fn read(
        &self,
        path: &Path,
        descriptor: &RasterDescriptor,
    ) -> Result<Vec<DataRaster>, RasterError>;
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

/// Headerless band-interleaved elevation grids (`.bil`).
#[derive(Debug, Default, Clone, Copy)]
pub struct BilRasterReader;

impl DataRasterReader for BilRasterReader {
    fn format_name(&self) -> &'static str {
        "bil"
    }

    fn can_read(&self, path: &Path) -> bool {
        has_extension(path, &["bil"])
    }

    fn read(
        &self,
        path: &Path,
        descriptor: &RasterDescriptor,
    ) -> Result<Vec<DataRaster>, RasterError> {
        let params = descriptor.elevation_params()?;
        let bytes = std::fs::read(path)?;
        let raster = DataRaster::from_bytes(params, &bytes)?;
        Ok(vec![raster])
    }
}

/// PNG and JPEG imagery decoded into packed RGBA rasters.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageRasterReader;

impl DataRasterReader for ImageRasterReader {
    fn format_name(&self) -> &'static str {
        "image"
    }

    fn can_read(&self, path: &Path) -> bool {
        has_extension(path, &["png", "jpg", "jpeg"])
    }

    fn read(
        &self,
        path: &Path,
        descriptor: &RasterDescriptor,
    ) -> Result<Vec<DataRaster>, RasterError> {
        let bytes = std::fs::read(path)?;
        let raster = decode_image(&bytes, descriptor.sector).map_err(|e| match e {
            RasterError::Decode { message, .. } => RasterError::Decode {
                source_name: path.display().to_string(),
                message,
            },
            other => other,
        })?;
        Ok(vec![raster])
    }
}

/// Pick a reader for a file by extension.
pub fn reader_for(path: &Path) -> Result<Box<dyn DataRasterReader>, RasterError> {
    let readers: [Box<dyn DataRasterReader>; 2] =
        [Box::new(BilRasterReader), Box::new(ImageRasterReader)];
    readers
        .into_iter()
        .find(|r| r.can_read(path))
        .ok_or_else(|| RasterError::UnsupportedFormat(path.display().to_string()))
}

/// Decode PNG or JPEG bytes into an image raster covering `sector`.
pub fn decode_image(bytes: &[u8], sector: Sector) -> Result<DataRaster, RasterError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| RasterError::Decode {
            source_name: "image".to_string(),
            message: e.to_string(),
        })?
        .to_rgba8();

    let params = RasterParams::builder()
        .size(img.width(), img.height())
        .sector(sector)
        .pixel_format(PixelFormat::Image)
        .data_type(DataType::Int32)
        .byte_order(ByteOrder::LittleEndian)
        .build()?;
    let mut raster = DataRaster::new(params)?;
    for (x, y, pixel) in img.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        raster.set(x, y, f64::from(pack_rgba(r, g, b, a)));
    }
    Ok(raster)
}

/// Convert an image raster back into an RGBA image for export.
pub fn to_rgba_image(raster: &DataRaster) -> Result<RgbaImage, RasterError> {
    if raster.pixel_format() != PixelFormat::Image {
        return Err(RasterError::InvalidParameter(
            "only image rasters convert to RGBA".to_string(),
        ));
    }
    let mut img = RgbaImage::new(raster.width(), raster.height());
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        *pixel = Rgba(unpack_rgba(raster.get(x, y) as i32));
    }
    Ok(img)
}

/// Encode an image raster as PNG.
pub fn encode_png(raster: &DataRaster) -> Result<Vec<u8>, RasterError> {
    let img = to_rgba_image(raster)?;
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, image::ImageFormat::Png)
        .map_err(|e| RasterError::Decode {
            source_name: "png".to_string(),
            message: e.to_string(),
        })?;
    Ok(cursor.into_inner())
}
