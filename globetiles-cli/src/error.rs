//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use globetiles::config::ConfigFileError;
use globetiles::filestore::FileStoreError;
use globetiles::model::ModelError;
use globetiles::rasterserver::RasterServerError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded or written
    Config(ConfigFileError),
    /// Invalid command-line argument
    InvalidArgument(String),
    /// No elevation service and no local raster server is configured
    NoElevationSource(String),
    /// Failed to start shared services
    Startup(String),
    /// Failed to build the elevation model
    Model(ModelError),
    /// Failed to load the local raster server
    RasterServer(RasterServerError),
    /// File store operation failed
    FileStore(FileStoreError),
    /// Failed to write output file
    FileWrite { path: String, error: std::io::Error },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::NoElevationSource(_) = self {
            eprintln!();
            eprintln!("Configure one of:");
            eprintln!("  1. service_url in the [elevation] section of config.ini");
            eprintln!("  2. A <dataset>.RasterServer.ini in a file store location");
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::NoElevationSource(dataset) => {
                write!(f, "No elevation source available for '{}'", dataset)
            }
            CliError::Startup(msg) => write!(f, "Failed to start services: {}", msg),
            CliError::Model(e) => write!(f, "Elevation model error: {}", e),
            CliError::RasterServer(e) => write!(f, "Raster server error: {}", e),
            CliError::FileStore(e) => write!(f, "File store error: {}", e),
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path, error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Model(e) => Some(e),
            CliError::RasterServer(e) => Some(e),
            CliError::FileStore(e) => Some(e),
            CliError::FileWrite { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<ModelError> for CliError {
    fn from(e: ModelError) -> Self {
        CliError::Model(e)
    }
}

impl From<FileStoreError> for CliError {
    fn from(e: FileStoreError) -> Self {
        CliError::FileStore(e)
    }
}
