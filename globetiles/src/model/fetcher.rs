//! Shared tile fetch pipeline: memory cache, then file store, then network.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime};

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::ModelResources;
use super::error::ModelError;
use crate::cache::MemoryCache;
use crate::event::{EventListeners, ListenerHandle, ListenerList};
use crate::filestore::{FileStore, FileStoreError};
use crate::level::{LevelSet, Tile, TileKey};
use crate::raster::{DataRaster, RasterError};
use crate::retrieve::{
    BoxError, PoolConfig, RequestOutcome, RetrievalError, RetrievalService, RetrievedData,
    RetrieverFactory, RetrieverState, Submission, WorkerPool,
};

/// Memory cache of decoded tiles, shared across models.
pub type TileCache = MemoryCache<TileKey, Arc<CachedTile>>;

/// Turns a tile's encoded bytes into a raster.
pub type TileDecoder = Arc<dyn Fn(&Tile, &[u8]) -> Result<DataRaster, RasterError> + Send + Sync>;

/// Poll step of [`TileFetcher::wait_for_pending`].
const PENDING_POLL: Duration = Duration::from_millis(10);

/// A decoded tile held in the memory cache.
#[derive(Debug)]
pub struct CachedTile {
    raster: DataRaster,
    expiration: Option<SystemTime>,
}

impl CachedTile {
    pub fn new(raster: DataRaster, expiration: Option<SystemTime>) -> Self {
        Self { raster, expiration }
    }

    pub fn raster(&self) -> &DataRaster {
        &self.raster
    }

    pub fn expiration(&self) -> Option<SystemTime> {
        self.expiration
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expiration.is_some_and(|e| e <= now)
    }
}

/// Change notification delivered to model listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    /// A tile was decoded and added to the memory cache
    TileLoaded(TileKey),
    /// A tile fetch failed and the tile was marked absent
    TileFailed(TileKey),
}

/// Snapshot of fetcher activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetcherStats {
    pub requests: u64,
    /// Requests for a tile already being loaded
    pub coalesced: u64,
    pub disk_loads: u64,
    pub network_requests: u64,
    /// Requests refused by the retrieval service or disk queue
    pub rejected: u64,
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    coalesced: AtomicU64,
    disk_loads: AtomicU64,
    network_requests: AtomicU64,
    rejected: AtomicU64,
    failures: AtomicU64,
}

struct FetcherInner {
    name: String,
    level_set: Arc<LevelSet>,
    cache: Arc<TileCache>,
    file_store: Arc<FileStore>,
    retrieval: Arc<RetrievalService>,
    factory: Arc<dyn RetrieverFactory>,
    decoder: TileDecoder,
    /// Tiles with a disk load or retrieval outstanding
    in_flight: DashMap<TileKey, Instant>,
    /// Retrieved tiles the memory cache refused, awaiting completion
    uncached: DashSet<TileKey>,
    oversize_warned: AtomicBool,
    listeners: EventListeners<ModelEvent>,
    counters: Counters,
}

/// Loads tiles for one dataset.
///
/// Requests never block: a tile is looked up in the memory cache, decoded
/// from the file store on a disk-load thread, or fetched through the
/// retrieval service. Each completed load notifies the change listeners.
pub struct TileFetcher {
    inner: Arc<FetcherInner>,
    disk_pool: WorkerPool,
}

impl TileFetcher {
    pub fn new(
        name: impl Into<String>,
        level_set: Arc<LevelSet>,
        resources: &ModelResources,
        factory: Arc<dyn RetrieverFactory>,
        decoder: TileDecoder,
        disk_load_threads: usize,
    ) -> Result<Self, ModelError> {
        let name = name.into();
        let disk_pool = WorkerPool::new(PoolConfig::new(
            format!("{name}-disk"),
            disk_load_threads,
        ))
        .map_err(ModelError::Spawn)?;

        info!(dataset = %name, levels = level_set.num_levels(), "Tile fetcher created");

        Ok(Self {
            inner: Arc::new(FetcherInner {
                name,
                level_set,
                cache: Arc::clone(&resources.memory_cache),
                file_store: Arc::clone(&resources.file_store),
                retrieval: Arc::clone(&resources.retrieval),
                factory,
                decoder,
                in_flight: DashMap::new(),
                uncached: DashSet::new(),
                oversize_warned: AtomicBool::new(false),
                listeners: ListenerList::new(),
                counters: Counters::default(),
            }),
            disk_pool,
        })
    }

    pub fn level_set(&self) -> &Arc<LevelSet> {
        &self.inner.level_set
    }

    pub fn memory_cache(&self) -> &Arc<TileCache> {
        &self.inner.cache
    }

    /// Cached tile, stale or not, without requesting anything.
    pub fn cached(&self, key: &TileKey) -> Option<Arc<CachedTile>> {
        self.inner.cache.get_object(key)
    }

    /// Cached tile, requesting it when missing or expired.
    ///
    /// An expired tile keeps serving while its replacement is fetched.
    pub fn cached_or_request(&self, tile: &Tile, priority: f64) -> Option<Arc<CachedTile>> {
        let cached = self.inner.cache.get_object(tile.key());
        let fresh = cached
            .as_ref()
            .is_some_and(|c| !c.is_expired(SystemTime::now()));
        if !fresh {
            self.request_tile(tile, priority);
        }
        cached
    }

    /// Start loading a tile. Returns true when a load was started.
    pub fn request_tile(&self, tile: &Tile, priority: f64) -> bool {
        let inner = &self.inner;
        let key = tile.key();
        inner.counters.requests.fetch_add(1, Ordering::Relaxed);

        if inner.level_set.is_absent(key) {
            return false;
        }

        let stale = match inner.cache.get_object(key) {
            Some(c) if c.is_expired(SystemTime::now()) => true,
            Some(_) => return false,
            None => false,
        };

        match inner.in_flight.entry(key.clone()) {
            Entry::Occupied(_) => {
                inner.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            Entry::Vacant(entry) => {
                entry.insert(Instant::now());
            }
        }

        // An expired tile is as old as its file, so go straight to the network.
        if !stale {
            if let Some(path) = inner.file_store.find_file(&tile.path(), false) {
                return self.load_from_disk(tile, path, priority);
            }
        }
        FetcherInner::request_network(inner, tile, priority)
    }

    fn load_from_disk(&self, tile: &Tile, path: PathBuf, priority: f64) -> bool {
        let weak = Arc::downgrade(&self.inner);
        let guard = InFlightGuard::new(weak.clone(), tile.key().clone());
        let job_tile = tile.clone();
        let job_path = path.clone();
        let submitted = self.disk_pool.submit(
            path.to_string_lossy().into_owned(),
            priority,
            move || {
                if let Some(inner) = weak.upgrade() {
                    // load_file settles the in-flight entry itself
                    guard.disarm();
                    inner.load_file(&job_tile, &job_path, priority);
                }
            },
        );

        if submitted == Submission::Submitted {
            self.inner.counters.disk_loads.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            debug!(path = %path.display(), result = ?submitted, "Disk load not queued");
            self.inner.counters.rejected.fetch_add(1, Ordering::Relaxed);
            self.inner.in_flight.remove(tile.key());
            false
        }
    }

    /// Fetch and decode a tile on the calling thread, bypassing the caches.
    pub fn fetch_blocking(
        &self,
        tile: &Tile,
        cancel: &CancellationToken,
    ) -> Result<DataRaster, ModelError> {
        let post = |_: &str, _: &RetrievedData| -> Result<(), BoxError> { Ok(()) };
        let retriever = self.inner.factory.create_retriever(tile, Arc::new(post))?;
        let name = retriever.name().to_string();

        match retriever.call(cancel)? {
            RetrieverState::Successful => {}
            _ => return Err(ModelError::Interrupted(name)),
        }
        let data = retriever.data().ok_or_else(|| ModelError::NoData(name.clone()))?;
        check_content_type(&data).map_err(|_| ModelError::NoData(name))?;
        Ok((self.inner.decoder)(tile, &data.bytes)?)
    }

    /// Whether a load of this tile is outstanding.
    pub fn is_pending(&self, key: &TileKey) -> bool {
        self.inner.in_flight.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Block until no loads are outstanding or the timeout elapses.
    pub fn wait_for_pending(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.inner.in_flight.is_empty() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(PENDING_POLL);
        }
        true
    }

    pub fn add_change_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&ModelEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe_fn(listener)
    }

    pub fn remove_change_listener(&self, handle: ListenerHandle) -> bool {
        self.inner.listeners.unsubscribe(handle)
    }

    pub fn stats(&self) -> FetcherStats {
        let c = &self.inner.counters;
        FetcherStats {
            requests: c.requests.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            disk_loads: c.disk_loads.load(Ordering::Relaxed),
            network_requests: c.network_requests.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
        }
    }
}

impl FetcherInner {
    fn request_network(this: &Arc<Self>, tile: &Tile, priority: f64) -> bool {
        let key = tile.key().clone();

        let post_owner = Arc::downgrade(this);
        let post_tile = tile.clone();
        let post = move |_: &str, data: &RetrievedData| -> Result<(), BoxError> {
            match post_owner.upgrade() {
                Some(inner) => inner.store_retrieved(&post_tile, data),
                None => Err("tile fetcher dropped".into()),
            }
        };

        let retriever = match this.factory.create_retriever(tile, Arc::new(post)) {
            Ok(r) => r,
            Err(e) => {
                warn!(tile = %key, error = %e, "Cannot create retriever");
                this.fail(&key);
                this.in_flight.remove(&key);
                return false;
            }
        };

        let done_owner: Weak<Self> = Arc::downgrade(this);
        let done_key = key.clone();
        let outcome = this.retrieval.run_retriever_with(
            retriever,
            priority,
            Box::new(move |result| {
                if let Some(inner) = done_owner.upgrade() {
                    inner.finish_retrieval(&done_key, result);
                }
            }),
        );

        if outcome == RequestOutcome::Submitted {
            this.counters.network_requests.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            debug!(tile = %key, outcome = ?outcome, "Retrieval not queued");
            this.counters.rejected.fetch_add(1, Ordering::Relaxed);
            this.in_flight.remove(&key);
            false
        }
    }

    /// Disk-load job: decode a stored tile, falling back to the network
    /// when the file is unreadable.
    fn load_file(self: Arc<Self>, tile: &Tile, path: &std::path::Path, priority: f64) {
        let decoded = std::fs::read(path)
            .map_err(RasterError::from)
            .and_then(|bytes| (self.decoder)(tile, &bytes));

        match decoded {
            Ok(raster) => {
                if self.add_to_cache(tile.key(), raster, None) {
                    self.listeners.notify(&ModelEvent::TileLoaded(tile.key().clone()));
                }
                self.in_flight.remove(tile.key());
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Stored tile unreadable, fetching again"
                );
                self.file_store.remove_file(path);
                FetcherInner::request_network(&self, tile, priority);
            }
        }
    }

    /// Post-processor: decode, persist and cache a retrieved tile.
    fn store_retrieved(&self, tile: &Tile, data: &RetrievedData) -> Result<(), BoxError> {
        check_content_type(data)?;
        let raster = (self.decoder)(tile, &data.bytes)?;

        match self.file_store.write_file(&tile.path(), &data.bytes) {
            Ok(_) => {}
            Err(FileStoreError::NoWriteLocation) => {
                debug!(tile = %tile.key(), "No write location, tile cached in memory only");
            }
            Err(e) => warn!(tile = %tile.key(), error = %e, "Failed to store tile"),
        }

        if !self.add_to_cache(tile.key(), raster, data.expiration) {
            self.uncached.insert(tile.key().clone());
        }
        Ok(())
    }

    /// Returns false when the tile does not fit in the memory cache.
    fn add_to_cache(
        &self,
        key: &TileKey,
        raster: DataRaster,
        expiration: Option<SystemTime>,
    ) -> bool {
        let size = raster.size_in_bytes();
        let tile = Arc::new(CachedTile::new(raster, expiration));
        if self.cache.add(key.clone(), tile, size) {
            return true;
        }
        if !self.oversize_warned.swap(true, Ordering::Relaxed) {
            warn!(
                dataset = %self.name,
                tile = %key,
                size,
                capacity = self.cache.capacity(),
                "Tile larger than memory cache, tiles of this size will not be cached"
            );
        } else {
            debug!(tile = %key, size, "Tile larger than memory cache");
        }
        false
    }

    /// Completion of a network fetch. The tile leaves the in-flight set
    /// only after its outcome is visible.
    fn finish_retrieval(&self, key: &TileKey, result: Result<RetrieverState, RetrievalError>) {
        let cached = self.uncached.remove(key).is_none();
        match result {
            Ok(RetrieverState::Successful) => {
                self.level_set.unmark_absent(key);
                if cached {
                    self.listeners.notify(&ModelEvent::TileLoaded(key.clone()));
                }
            }
            Ok(state) => debug!(tile = %key, state = %state, "Retrieval ended without data"),
            Err(e) => {
                debug!(dataset = %self.name, tile = %key, error = %e, "Tile retrieval failed");
                self.fail(key);
            }
        }
        self.in_flight.remove(key);
    }

    fn fail(&self, key: &TileKey) {
        self.level_set.mark_absent(key);
        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        self.listeners.notify(&ModelEvent::TileFailed(key.clone()));
    }
}

/// Releases a tile's in-flight entry if its disk job is dropped unrun.
struct InFlightGuard {
    owner: Weak<FetcherInner>,
    key: Option<TileKey>,
}

impl InFlightGuard {
    fn new(owner: Weak<FetcherInner>, key: TileKey) -> Self {
        Self {
            owner,
            key: Some(key),
        }
    }

    fn disarm(mut self) {
        self.key = None;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let (Some(key), Some(inner)) = (self.key.take(), self.owner.upgrade()) {
            debug!(tile = %key, "Disk load abandoned");
            inner.in_flight.remove(&key);
        }
    }
}

/// Reject service error documents delivered in place of tile data.
fn check_content_type(data: &RetrievedData) -> Result<(), BoxError> {
    match data.content_type.as_deref() {
        Some(ct) if ct.starts_with("text/") || ct.contains("xml") => {
            let excerpt: String = String::from_utf8_lossy(&data.bytes).chars().take(200).collect();
            Err(format!("service returned {ct}: {excerpt}").into())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filestore::StoreLocation;
    use crate::geo::{LatLon, Sector};
    use crate::level::{AbsentConfig, LevelSetConfig};
    use crate::raster::{ByteOrder, DataType, PixelFormat, RasterParams};
    use crate::retrieve::{HttpRetrieverFactory, MockResponse, MockTransport, RetrievalConfig};
    use crate::source::{ServiceVersion, WmsTileSource};
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn level_set() -> Arc<LevelSet> {
        let mut config = LevelSetConfig::new("test/dem", LatLon::new(90.0, 90.0), 2, 2);
        config.absent = AbsentConfig {
            max_tries: 2,
            min_check_interval: Duration::from_secs(60),
            try_again_interval: None,
        };
        Arc::new(LevelSet::new(config).unwrap())
    }

    fn decoder() -> TileDecoder {
        Arc::new(|tile: &Tile, bytes: &[u8]| {
            let params = RasterParams::builder()
                .size(tile.width(), tile.height())
                .sector(*tile.sector())
                .pixel_format(PixelFormat::Elevation)
                .data_type(DataType::Int16)
                .byte_order(ByteOrder::LittleEndian)
                .missing_data_signal(-32768.0)
                .build()?;
            DataRaster::from_bytes(params, bytes)
        })
    }

    fn tile_bytes(value: i16) -> Vec<u8> {
        std::iter::repeat(value.to_le_bytes()).take(4).flatten().collect()
    }

    struct Fixture {
        _dir: TempDir,
        resources: ModelResources,
        transport: Arc<MockTransport>,
    }

    fn fixture(response: MockResponse) -> Fixture {
        let retrieval = RetrievalConfig {
            worker_threads: 2,
            ..Default::default()
        };
        fixture_with(response, &retrieval, 1 << 20)
    }

    fn fixture_with(
        response: MockResponse,
        retrieval: &RetrievalConfig,
        cache_bytes: usize,
    ) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = FileStore::with_locations(Some(StoreLocation::new(dir.path())), Vec::new()).unwrap();
        let retrieval = RetrievalService::new(retrieval).unwrap();
        Fixture {
            _dir: dir,
            resources: ModelResources::new(
                Arc::new(MemoryCache::new(cache_bytes)),
                Arc::new(store),
                Arc::new(retrieval),
            ),
            transport: Arc::new(MockTransport::new(response)),
        }
    }

    fn fetcher(fx: &Fixture) -> TileFetcher {
        let source = WmsTileSource::new(
            "http://example.com/wms",
            ServiceVersion::WMS_1_1_1,
            vec!["dem".into()],
            "application/bil16",
        )
        .unwrap();
        let factory = HttpRetrieverFactory::new(Arc::new(source), fx.transport.clone());
        TileFetcher::new("test", level_set(), &fx.resources, Arc::new(factory), decoder(), 1)
            .unwrap()
    }

    #[test]
    fn test_network_fetch_stores_and_caches() {
        let fx = fixture(MockResponse::ok(tile_bytes(12)));
        let fetcher = fetcher(&fx);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        fetcher.add_change_listener(move |e: &ModelEvent| sink.lock().push(e.clone()));

        let tile = fetcher.level_set().create_tile(fetcher.level_set().last_level(), 1, 2);
        assert!(fetcher.request_tile(&tile, 0.0));
        assert!(fetcher.wait_for_pending(Duration::from_secs(5)));

        let cached = fetcher.cached(tile.key()).unwrap();
        assert_eq!(cached.raster().get(0, 0), 12.0);
        assert!(fx.resources.file_store.contains_file(&tile.path()));
        assert_eq!(*events.lock(), vec![ModelEvent::TileLoaded(tile.key().clone())]);
        assert_eq!(fx.transport.request_count(), 1);
    }

    #[test]
    fn test_cached_tile_is_not_requested_again() {
        let fx = fixture(MockResponse::ok(tile_bytes(1)));
        let fetcher = fetcher(&fx);
        let tile = fetcher.level_set().create_tile(fetcher.level_set().last_level(), 0, 0);

        fetcher.request_tile(&tile, 0.0);
        assert!(fetcher.wait_for_pending(Duration::from_secs(5)));
        assert!(!fetcher.request_tile(&tile, 0.0));
        assert_eq!(fx.transport.request_count(), 1);
    }

    #[test]
    fn test_stored_tile_loads_from_disk() {
        let fx = fixture(MockResponse::status(500));
        let fetcher = fetcher(&fx);
        let tile = fetcher.level_set().create_tile(fetcher.level_set().last_level(), 0, 3);
        fx.resources
            .file_store
            .write_file(&tile.path(), &tile_bytes(99))
            .unwrap();

        assert!(fetcher.request_tile(&tile, 0.0));
        assert!(fetcher.wait_for_pending(Duration::from_secs(5)));
        assert_eq!(fetcher.cached(tile.key()).unwrap().raster().get(1, 1), 99.0);
        assert_eq!(fx.transport.request_count(), 0);
        assert_eq!(fetcher.stats().disk_loads, 1);
    }

    #[test]
    fn test_corrupt_stored_tile_is_refetched() {
        let fx = fixture(MockResponse::ok(tile_bytes(5)));
        let fetcher = fetcher(&fx);
        let tile = fetcher.level_set().create_tile(fetcher.level_set().last_level(), 0, 1);
        fx.resources.file_store.write_file(&tile.path(), b"bad").unwrap();

        fetcher.request_tile(&tile, 0.0);
        assert!(fetcher.wait_for_pending(Duration::from_secs(5)));
        assert_eq!(fetcher.cached(tile.key()).unwrap().raster().get(0, 0), 5.0);
        assert_eq!(fx.transport.request_count(), 1);
    }

    #[test]
    fn test_failure_marks_absent_and_notifies() {
        let fx = fixture(MockResponse::status(404));
        let fetcher = fetcher(&fx);
        let failures = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&failures);
        fetcher.add_change_listener(move |e: &ModelEvent| {
            if matches!(e, ModelEvent::TileFailed(_)) {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        let tile = fetcher.level_set().create_tile(fetcher.level_set().last_level(), 1, 1);
        fetcher.request_tile(&tile, 0.0);
        assert!(fetcher.wait_for_pending(Duration::from_secs(5)));

        assert!(fetcher.level_set().is_absent(tile.key()));
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        // Absent tiles are not requested again within the check interval.
        assert!(!fetcher.request_tile(&tile, 0.0));
        assert_eq!(fx.transport.request_count(), 1);
    }

    #[test]
    fn test_xml_response_is_rejected() {
        let fx = fixture(
            MockResponse::ok(b"<ServiceExceptionReport/>".to_vec())
                .with_header("Content-Type", "application/vnd.ogc.se_xml"),
        );
        let fetcher = fetcher(&fx);
        let tile = fetcher.level_set().create_tile(fetcher.level_set().last_level(), 0, 0);
        fetcher.request_tile(&tile, 0.0);
        assert!(fetcher.wait_for_pending(Duration::from_secs(5)));
        assert!(fetcher.cached(tile.key()).is_none());
        assert!(!fx.resources.file_store.contains_file(&tile.path()));
        assert!(fetcher.level_set().is_absent(tile.key()));
    }

    #[test]
    fn test_expired_tile_serves_while_refetching() {
        let fx = fixture(MockResponse::ok(tile_bytes(8)));
        let fetcher = fetcher(&fx);
        let tile = fetcher.level_set().create_tile(fetcher.level_set().last_level(), 1, 0);

        let params = RasterParams::builder()
            .size(2, 2)
            .sector(*tile.sector())
            .pixel_format(PixelFormat::Elevation)
            .data_type(DataType::Int16)
            .byte_order(ByteOrder::LittleEndian)
            .build()
            .unwrap();
        let stale = DataRaster::from_bytes(params, &tile_bytes(3)).unwrap();
        let expired = SystemTime::now() - Duration::from_secs(1);
        fx.resources.memory_cache.add(
            tile.key().clone(),
            Arc::new(CachedTile::new(stale, Some(expired))),
            8,
        );

        let served = fetcher.cached_or_request(&tile, 0.0).unwrap();
        assert_eq!(served.raster().get(0, 0), 3.0);
        assert!(fetcher.wait_for_pending(Duration::from_secs(5)));
        assert_eq!(fetcher.cached(tile.key()).unwrap().raster().get(0, 0), 8.0);
    }

    #[test]
    fn test_stale_retrieval_leaves_tile_requestable() {
        let retrieval = RetrievalConfig {
            worker_threads: 1,
            stale_request_limit: Duration::from_millis(20),
            ..Default::default()
        };
        let fx = fixture_with(
            MockResponse::ok(tile_bytes(6)).with_delay(Duration::from_millis(200)),
            &retrieval,
            1 << 20,
        );
        let fetcher = fetcher(&fx);
        let level = fetcher.level_set().last_level();
        let first = fetcher.level_set().create_tile(level, 0, 0);
        let second = fetcher.level_set().create_tile(level, 0, 1);

        assert!(fetcher.request_tile(&first, 0.0));
        assert!(fetcher.request_tile(&second, 0.0));
        assert!(fetcher.wait_for_pending(Duration::from_secs(5)));

        // The queued request went stale behind the slow one and never ran.
        assert_eq!(fx.transport.request_count(), 1);
        assert!(fetcher.cached(second.key()).is_none());
        assert!(!fetcher.level_set().is_absent(second.key()));

        assert!(fetcher.request_tile(&second, 0.0));
        assert!(fetcher.wait_for_pending(Duration::from_secs(5)));
        assert_eq!(fx.transport.request_count(), 2);
        assert_eq!(fetcher.cached(second.key()).unwrap().raster().get(0, 0), 6.0);
    }

    #[test]
    fn test_abandoned_disk_job_releases_tile() {
        let fx = fixture(MockResponse::ok(tile_bytes(1)));
        let fetcher = fetcher(&fx);
        let tile = fetcher.level_set().create_tile(fetcher.level_set().last_level(), 1, 3);
        let weak = Arc::downgrade(&fetcher.inner);

        fetcher.inner.in_flight.insert(tile.key().clone(), Instant::now());
        InFlightGuard::new(weak.clone(), tile.key().clone()).disarm();
        assert!(fetcher.is_pending(tile.key()));

        drop(InFlightGuard::new(weak, tile.key().clone()));
        assert!(!fetcher.is_pending(tile.key()));
        assert!(fetcher.request_tile(&tile, 0.0));
    }

    #[test]
    fn test_oversized_tile_is_not_announced() {
        let retrieval = RetrievalConfig {
            worker_threads: 1,
            ..Default::default()
        };
        // Decoded 2x2 Int16 tiles take more than four bytes.
        let fx = fixture_with(MockResponse::ok(tile_bytes(3)), &retrieval, 4);
        let fetcher = fetcher(&fx);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        fetcher.add_change_listener(move |e: &ModelEvent| sink.lock().push(e.clone()));

        let level = fetcher.level_set().last_level();
        let fetched = fetcher.level_set().create_tile(level, 1, 1);
        assert!(fetcher.request_tile(&fetched, 0.0));
        assert!(fetcher.wait_for_pending(Duration::from_secs(5)));
        assert!(fetcher.cached(fetched.key()).is_none());
        assert!(fx.resources.file_store.contains_file(&fetched.path()));
        assert!(!fetcher.level_set().is_absent(fetched.key()));

        let stored = fetcher.level_set().create_tile(level, 0, 2);
        fx.resources
            .file_store
            .write_file(&stored.path(), &tile_bytes(4))
            .unwrap();
        assert!(fetcher.request_tile(&stored, 0.0));
        assert!(fetcher.wait_for_pending(Duration::from_secs(5)));
        assert!(fetcher.cached(stored.key()).is_none());

        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_fetch_blocking_bypasses_caches() {
        let fx = fixture(MockResponse::ok(tile_bytes(-4)));
        let fetcher = fetcher(&fx);
        let tile = Tile::standalone(
            TileKey::new(0, 0, 0, "compose"),
            Sector::new(0.0, 1.0, 0.0, 1.0).unwrap(),
            2,
            2,
            ".bil",
        );
        let raster = fetcher.fetch_blocking(&tile, &CancellationToken::new()).unwrap();
        assert_eq!(raster.get(1, 0), -4.0);
        assert!(fetcher.cached(tile.key()).is_none());
    }

    #[test]
    fn test_fetch_blocking_cancelled() {
        let fx = fixture(MockResponse::ok(tile_bytes(1)));
        let fetcher = fetcher(&fx);
        let tile = fetcher.level_set().create_tile(fetcher.level_set().last_level(), 0, 0);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            fetcher.fetch_blocking(&tile, &cancel),
            Err(ModelError::Interrupted(_))
        ));
    }

    #[test]
    fn test_check_content_type() {
        let mut data = RetrievedData::default();
        assert!(check_content_type(&data).is_ok());
        data.content_type = Some("image/png".into());
        assert!(check_content_type(&data).is_ok());
        data.content_type = Some("text/html".into());
        assert!(check_content_type(&data).is_err());
    }
}
