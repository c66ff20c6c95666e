//! Shared setup for commands that query the elevation model.

use std::path::Path;
use std::sync::Arc;

use globetiles::cache::RasterServerCache;
use globetiles::config::ConfigFile;
use globetiles::filestore::FileStore;
use globetiles::logging::{init_logging, LoggingGuard};
use globetiles::model::{ElevationModel, ModelResources, TileCache};
use globetiles::rasterserver::{
    LocalRasterServerRetrieverFactory, RasterServer, RasterServerError,
};
use globetiles::retrieve::{ReqwestTransport, RetrievalService};
use tracing::{info, warn};

use crate::error::CliError;

/// Load the configuration from `path`, or from the default location.
///
/// A missing default file yields the built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    match path {
        Some(path) => Ok(ConfigFile::load_from(path)?),
        None => Ok(ConfigFile::load()?),
    }
}

/// Install file and stderr logging. Failure only costs the log file.
pub fn start_logging(config: &ConfigFile) -> Option<LoggingGuard> {
    match init_logging(&config.logging) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {}", e);
            None
        }
    }
}

/// Elevation model plus the shared services it runs on.
pub struct ElevationSession {
    pub model: ElevationModel,
    pub resources: ModelResources,
}

/// Build the elevation model described by `config`.
///
/// A configured `service_url` selects network retrieval; otherwise the
/// dataset must be described by a local raster server file.
pub fn open_elevation_model(config: &ConfigFile) -> Result<ElevationSession, CliError> {
    let memory_cache = TileCache::from_config(&config.memory_cache_config())
        .map_err(|e| CliError::Startup(e.to_string()))?;
    let file_store = FileStore::new(&config.file_store_config());
    let retrieval = RetrievalService::new(&config.retrieval_config())
        .map_err(|e| CliError::Startup(e.to_string()))?;
    let resources = ModelResources::new(
        Arc::new(memory_cache),
        Arc::new(file_store),
        Arc::new(retrieval),
    );
    let model_config = config.elevation_model_config();

    if let Some(source) = config.elevation_source()? {
        let retrieval = config.retrieval_config();
        let transport = ReqwestTransport::new(retrieval.connect_timeout, retrieval.read_timeout)
            .map_err(|e| CliError::Startup(e.to_string()))?;
        info!(url = %config.elevation.service_url, "Using network elevation source");
        let model =
            ElevationModel::from_source(model_config, &resources, source, Arc::new(transport))?;
        return Ok(ElevationSession { model, resources });
    }

    let dataset = config.elevation.dataset_name.clone();
    let buffers = RasterServerCache::new(config.raster_server_cache_config())
        .map_err(|e| CliError::Startup(e.to_string()))?;
    let server = match RasterServer::from_file_store(
        &resources.file_store,
        &dataset,
        Arc::new(buffers),
    ) {
        Ok(server) => server,
        Err(RasterServerError::NotFound(name)) => {
            warn!(file = %name, "No raster server description found");
            return Err(CliError::NoElevationSource(dataset));
        }
        Err(e) => return Err(CliError::RasterServer(e)),
    };
    info!(dataset = %dataset, "Using local raster server");

    let factory = LocalRasterServerRetrieverFactory::new(Arc::new(server));
    let model = ElevationModel::new(model_config, &resources, Arc::new(factory))?;
    Ok(ElevationSession { model, resources })
}
