//! Georeferenced sample rasters.
//!
//! A [`DataRaster`] owns a typed sample buffer plus [`RasterParams`]
//! metadata. Elevation rasters sample bilinearly and image rasters nearest,
//! with missing data excluded in both cases. [`CachedDataRaster`] keeps a
//! file's decoded rasters in a shared [`RasterBufferCache`].

mod buffer;
mod cached;
mod data_raster;
mod reader;
mod types;

pub use buffer::RasterBuffer;
pub use cached::{CachedDataRaster, RasterBufferCache};
pub use data_raster::{pack_rgba, unpack_rgba, DataRaster};
pub use reader::{
    decode_image, encode_png, reader_for, to_rgba_image, BilRasterReader, DataRasterReader,
    ImageRasterReader, RasterDescriptor,
};
pub use types::{
    ByteOrder, CoordinateSystem, DataType, PixelFormat, RasterError, RasterOrigin, RasterParams,
    RasterParamsBuilder,
};
