//! Retrievers answering tile requests from a local raster server.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::server::RasterServer;
use crate::geo::Sector;
use crate::level::Tile;
use crate::retrieve::{
    PostProcessor, RetrievalError, RetrievedData, Retriever, RetrieverFactory, RetrieverState,
};

#[derive(Debug, Default)]
struct Progress {
    state: RetrieverState,
    data: Option<RetrievedData>,
}

/// Composes one tile from a [`RasterServer`].
///
/// Goes through the same lifecycle as a network fetch but never touches the
/// network, so network availability does not gate it.
pub struct LocalRasterServerRetriever {
    name: String,
    server: Arc<RasterServer>,
    sector: Sector,
    width: u32,
    height: u32,
    post_processor: Option<Arc<dyn PostProcessor>>,
    progress: Mutex<Progress>,
}

impl LocalRasterServerRetriever {
    pub fn new(server: Arc<RasterServer>, tile: &Tile) -> Self {
        Self {
            name: format!("local://{}/{}", server.dataset(), tile.path()),
            server,
            sector: *tile.sector(),
            width: tile.width(),
            height: tile.height(),
            post_processor: None,
            progress: Mutex::new(Progress::default()),
        }
    }

    pub fn with_post_processor(mut self, post_processor: Arc<dyn PostProcessor>) -> Self {
        self.post_processor = Some(post_processor);
        self
    }

    fn set_state(&self, state: RetrieverState) {
        self.progress.lock().state = state;
    }

    fn advance(&self, cancel: &CancellationToken, next: RetrieverState) -> bool {
        if cancel.is_cancelled() {
            debug!(name = %self.name, "Local retrieval interrupted");
            self.set_state(RetrieverState::Interrupted);
            return false;
        }
        self.set_state(next);
        true
    }

    fn fail(&self, error: RetrievalError) -> Result<RetrieverState, RetrievalError> {
        self.set_state(RetrieverState::Error);
        warn!(name = %self.name, error = %error, "Local retrieval failed");
        Err(error)
    }
}

impl Retriever for LocalRasterServerRetriever {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, cancel: &CancellationToken) -> Result<RetrieverState, RetrievalError> {
        if !self.advance(cancel, RetrieverState::Started) {
            return Ok(RetrieverState::Interrupted);
        }
        if !self.advance(cancel, RetrieverState::Reading) {
            return Ok(RetrieverState::Interrupted);
        }

        let bytes = match self.server.compose_bytes(self.sector, self.width, self.height) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                return self.fail(RetrievalError::Compose {
                    url: self.name.clone(),
                    message: e.to_string(),
                })
            }
        };
        if cancel.is_cancelled() {
            self.set_state(RetrieverState::Interrupted);
            return Ok(RetrieverState::Interrupted);
        }

        let data = RetrievedData {
            content_length: Some(bytes.len() as u64),
            content_type: Some(self.server.output().content_type().to_string()),
            expiration: None,
            bytes,
        };

        if let Some(post) = &self.post_processor {
            if let Err(source) = post.process(&self.name, &data) {
                return self.fail(RetrievalError::PostProcess {
                    url: self.name.clone(),
                    source,
                });
            }
        }

        let mut progress = self.progress.lock();
        progress.data = Some(data);
        progress.state = RetrieverState::Successful;
        Ok(RetrieverState::Successful)
    }

    fn state(&self) -> RetrieverState {
        self.progress.lock().state
    }

    fn data(&self) -> Option<RetrievedData> {
        self.progress.lock().data.clone()
    }

    fn requires_network(&self) -> bool {
        false
    }
}

impl std::fmt::Debug for LocalRasterServerRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalRasterServerRetriever")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Produces [`LocalRasterServerRetriever`]s for a model's tiles.
pub struct LocalRasterServerRetrieverFactory {
    server: Arc<RasterServer>,
}

impl LocalRasterServerRetrieverFactory {
    pub fn new(server: Arc<RasterServer>) -> Self {
        Self { server }
    }

    pub fn server(&self) -> &Arc<RasterServer> {
        &self.server
    }
}

impl RetrieverFactory for LocalRasterServerRetrieverFactory {
    fn create_retriever(
        &self,
        tile: &Tile,
        post_processor: Arc<dyn PostProcessor>,
    ) -> Result<Arc<dyn Retriever>, RetrievalError> {
        if !self
            .server
            .coverage()
            .is_some_and(|coverage| coverage.intersects(tile.sector()))
        {
            return Err(RetrievalError::Create(format!(
                "{}: outside raster server {}",
                tile.key(),
                self.server.dataset()
            )));
        }
        let retriever =
            LocalRasterServerRetriever::new(Arc::clone(&self.server), tile).with_post_processor(post_processor);
        Ok(Arc::new(retriever))
    }
}
