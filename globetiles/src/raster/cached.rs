//! Lazily loaded rasters whose buffers live in a shared cache.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use super::data_raster::DataRaster;
use super::reader::{DataRasterReader, RasterDescriptor};
use super::types::RasterError;
use crate::cache::RasterServerCache;
use crate::geo::Sector;

/// Cache holding decoded raster files keyed by source path.
pub type RasterBufferCache = RasterServerCache<PathBuf, Arc<Vec<DataRaster>>>;

/// Proxy for a raster file that loads on first use.
///
/// The decoded buffers belong to the cache. When the cache drops them the
/// next access reads the file again.
pub struct CachedDataRaster {
    path: PathBuf,
    descriptor: RasterDescriptor,
    reader: Arc<dyn DataRasterReader>,
    cache: Arc<RasterBufferCache>,
}

impl CachedDataRaster {
    pub fn new(
        path: impl Into<PathBuf>,
        descriptor: RasterDescriptor,
        reader: Arc<dyn DataRasterReader>,
        cache: Arc<RasterBufferCache>,
    ) -> Self {
        Self {
            path: path.into(),
            descriptor,
            reader,
            cache,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sector(&self) -> &Sector {
        &self.descriptor.sector
    }

    pub fn descriptor(&self) -> &RasterDescriptor {
        &self.descriptor
    }

    /// Whether the buffers are currently resident.
    pub fn is_loaded(&self) -> bool {
        self.cache.contains(&self.path)
    }

    /// The decoded rasters, loading them if the cache has none.
    ///
    /// An allocation failure releases the cache and retries once. A second
    /// failure is returned for this raster only.
    pub fn rasters(&self) -> Result<Arc<Vec<DataRaster>>, RasterError> {
        if let Some(rasters) = self.cache.get_object(&self.path) {
            return Ok(rasters);
        }

        let rasters = match self.reader.read(&self.path, &self.descriptor) {
            Err(RasterError::OutOfMemory { bytes }) => {
                warn!(
                    path = %self.path.display(),
                    bytes,
                    "Out of memory reading raster, releasing cache and retrying"
                );
                self.cache.on_memory_pressure();
                self.reader.read(&self.path, &self.descriptor)?
            }
            other => other?,
        };

        let size: usize = rasters.iter().map(DataRaster::size_in_bytes).sum();
        let rasters = Arc::new(rasters);
        if !self.cache.add(self.path.clone(), Arc::clone(&rasters), size) {
            debug!(
                path = %self.path.display(),
                size,
                "Raster larger than cache budget, serving uncached"
            );
        }
        Ok(rasters)
    }

    /// Draw every raster of this file onto `canvas`.
    pub fn draw_on_to(&self, canvas: &mut DataRaster) -> Result<(), RasterError> {
        if !self.descriptor.sector.intersects(canvas.sector()) {
            return Ok(());
        }
        for raster in self.rasters()?.iter() {
            raster.draw_on_to(canvas);
        }
        Ok(())
    }
}

impl std::fmt::Debug for CachedDataRaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedDataRaster")
            .field("path", &self.path)
            .field("sector", &self.descriptor.sector)
            .field("format", &self.reader.format_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RasterServerCacheConfig;
    use crate::raster::{BilRasterReader, ByteOrder, DataType, PixelFormat, RasterParams};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn sector() -> Sector {
        Sector::new(0.0, 1.0, 0.0, 1.0).unwrap()
    }

    fn cache(budget: usize) -> Arc<RasterBufferCache> {
        Arc::new(RasterServerCache::new(RasterServerCacheConfig::new(budget)).unwrap())
    }

    fn write_bil(dir: &TempDir, name: &str, value: i16) -> PathBuf {
        let path = dir.path().join(name);
        let bytes: Vec<u8> = std::iter::repeat(value.to_le_bytes())
            .take(4)
            .flatten()
            .collect();
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn descriptor() -> RasterDescriptor {
        RasterDescriptor::elevation(sector(), 2, 2, DataType::Int16, ByteOrder::LittleEndian)
    }

    /// Reader that fails with out-of-memory a set number of times.
    struct FlakyReader {
        failures: AtomicUsize,
        reads: AtomicUsize,
    }

    impl FlakyReader {
        fn new(failures: usize) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                reads: AtomicUsize::new(0),
            }
        }
    }

    impl DataRasterReader for FlakyReader {
        fn format_name(&self) -> &'static str {
            "flaky"
        }

        fn can_read(&self, _path: &Path) -> bool {
            true
        }

        fn read(
            &self,
            path: &Path,
            descriptor: &RasterDescriptor,
        ) -> Result<Vec<DataRaster>, RasterError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(RasterError::OutOfMemory { bytes: 1 << 30 });
            }
            BilRasterReader.read(path, descriptor)
        }
    }

    #[test]
    fn test_loads_lazily_and_caches() {
        let dir = TempDir::new().unwrap();
        let path = write_bil(&dir, "a.bil", 42);
        let reader = Arc::new(FlakyReader::new(0));
        let raster = CachedDataRaster::new(&path, descriptor(), reader.clone(), cache(1 << 20));

        assert!(!raster.is_loaded());
        assert_eq!(raster.rasters().unwrap()[0].get(0, 0), 42.0);
        assert!(raster.is_loaded());
        raster.rasters().unwrap();
        assert_eq!(reader.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reloads_after_eviction() {
        let dir = TempDir::new().unwrap();
        let path = write_bil(&dir, "a.bil", 7);
        let shared = cache(1 << 20);
        let reader = Arc::new(FlakyReader::new(0));
        let raster = CachedDataRaster::new(&path, descriptor(), reader.clone(), shared.clone());

        raster.rasters().unwrap();
        shared.clear();
        assert!(!raster.is_loaded());
        assert_eq!(raster.rasters().unwrap()[0].get(1, 1), 7.0);
        assert_eq!(reader.reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_out_of_memory_releases_cache_and_retries_once() {
        let dir = TempDir::new().unwrap();
        let shared = cache(1 << 20);

        let other = CachedDataRaster::new(
            write_bil(&dir, "other.bil", 1),
            descriptor(),
            Arc::new(BilRasterReader),
            shared.clone(),
        );
        other.rasters().unwrap();
        assert!(other.is_loaded());

        let reader = Arc::new(FlakyReader::new(1));
        let raster =
            CachedDataRaster::new(write_bil(&dir, "a.bil", 3), descriptor(), reader.clone(), shared.clone());
        assert_eq!(raster.rasters().unwrap()[0].get(0, 0), 3.0);
        assert_eq!(reader.reads.load(Ordering::SeqCst), 2);
        assert!(!other.is_loaded());
        assert_eq!(shared.stats().pressure_releases, 1);
    }

    #[test]
    fn test_second_out_of_memory_is_returned() {
        let dir = TempDir::new().unwrap();
        let reader = Arc::new(FlakyReader::new(2));
        let raster =
            CachedDataRaster::new(write_bil(&dir, "a.bil", 3), descriptor(), reader.clone(), cache(1 << 20));
        assert!(matches!(
            raster.rasters(),
            Err(RasterError::OutOfMemory { .. })
        ));
        assert_eq!(reader.reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_draw_on_to_canvas() {
        let dir = TempDir::new().unwrap();
        let raster = CachedDataRaster::new(
            write_bil(&dir, "a.bil", 12),
            descriptor(),
            Arc::new(BilRasterReader),
            cache(1 << 20),
        );
        let params = RasterParams::builder()
            .size(3, 3)
            .sector(sector())
            .pixel_format(PixelFormat::Elevation)
            .data_type(DataType::Float32)
            .byte_order(ByteOrder::LittleEndian)
            .missing_data_signal(-9999.0)
            .build()
            .unwrap();
        let mut canvas = DataRaster::new(params).unwrap();
        raster.draw_on_to(&mut canvas).unwrap();
        assert_eq!(canvas.get(1, 1), 12.0);
    }
}
