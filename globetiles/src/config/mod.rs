//! Application configuration.
//!
//! The INI file at `~/.globetiles/config.ini` is loaded into a [`ConfigFile`],
//! which converts into the configuration of each component.
//!
//! # Example
//!
//! ```
//! use globetiles::config::ConfigFile;
//!
//! let config = ConfigFile::default();
//! let retrieval = config.retrieval_config();
//! assert_eq!(retrieval.worker_threads, 8);
//! ```

mod defaults;
mod file;
mod parser;
mod runtime;
mod settings;
mod size;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    CacheSettings, ConfigFile, ElevationSettings, FileStoreSettings, LoggingSettings,
    RetrievalSettings, ServiceKind,
};
pub use size::{format_size, parse_size, Size, SizeParseError};
