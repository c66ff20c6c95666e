//! Retriever factories: how a tile becomes a fetch.

use super::error::RetrievalError;
use super::network::NetworkStatus;
use super::retriever::{HttpRetriever, PostProcessor, Retriever};
use super::transport::HttpTransport;
use crate::level::Tile;
use crate::source::TileSource;
use std::sync::Arc;

/// Builds the retriever that fetches one tile.
pub trait RetrieverFactory: Send + Sync {
    fn create_retriever(
        &self,
        tile: &Tile,
        post_processor: Arc<dyn PostProcessor>,
    ) -> Result<Arc<dyn Retriever>, RetrievalError>;
}

/// Fetches tiles over HTTP using a tile source's URL builder.
pub struct HttpRetrieverFactory {
    source: Arc<dyn TileSource>,
    transport: Arc<dyn HttpTransport>,
    network: Option<Arc<NetworkStatus>>,
}

impl HttpRetrieverFactory {
    pub fn new(source: Arc<dyn TileSource>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            source,
            transport,
            network: None,
        }
    }

    /// Report host failures to a shared network status.
    pub fn with_network_status(mut self, network: Arc<NetworkStatus>) -> Self {
        self.network = Some(network);
        self
    }

    pub fn source(&self) -> &Arc<dyn TileSource> {
        &self.source
    }
}

impl RetrieverFactory for HttpRetrieverFactory {
    fn create_retriever(
        &self,
        tile: &Tile,
        post_processor: Arc<dyn PostProcessor>,
    ) -> Result<Arc<dyn Retriever>, RetrievalError> {
        let url = self
            .source
            .tile_url(tile)
            .map_err(|e| RetrievalError::Create(format!("{}: {}", tile.key(), e)))?;

        let mut retriever = HttpRetriever::new(url, Arc::clone(&self.transport))
            .with_post_processor(post_processor)
            .with_unzip(self.source.unzip());
        if let Some(network) = &self.network {
            retriever = retriever.with_network_status(Arc::clone(network));
        }
        Ok(Arc::new(retriever))
    }
}
