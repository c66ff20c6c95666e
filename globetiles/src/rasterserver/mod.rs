//! Local raster server.
//!
//! Serves a dataset from raster files on disk, described by a
//! `<dataset>.RasterServer.ini` found through the file store. Plugging a
//! [`LocalRasterServerRetrieverFactory`] into a model replaces network
//! retrieval with composition from those files.

mod config;
mod error;
mod retriever;
mod server;

pub use config::{OutputFormat, RasterServerConfig, RasterSourceConfig};
pub use error::RasterServerError;
pub use retriever::{LocalRasterServerRetriever, LocalRasterServerRetrieverFactory};
pub use server::RasterServer;
