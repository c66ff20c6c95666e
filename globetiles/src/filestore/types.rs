//! File store types and configuration.

use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// File store errors.
#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("File store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File store has no writable location")]
    NoWriteLocation,

    #[error("Invalid file store name '{0}': must be relative without '..'")]
    InvalidName(String),
}

/// A directory searched by the file store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLocation {
    pub path: PathBuf,
    /// Read-only content shipped with the installation
    pub is_install: bool,
    /// Touch file modification times when files here are found
    pub mark_when_used: bool,
}

impl StoreLocation {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_install: false,
            mark_when_used: false,
        }
    }

    pub fn install(mut self) -> Self {
        self.is_install = true;
        self
    }

    pub fn mark_when_used(mut self) -> Self {
        self.mark_when_used = true;
        self
    }
}

/// Base directory a [`LocationSpec`] is resolved against.
///
/// Well-known names resolve through the platform directories; any other name
/// is looked up as an environment variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationBase {
    Home,
    Cache,
    Data,
    Temp,
    CurrentDir,
    Env(String),
    Absolute(PathBuf),
}

impl LocationBase {
    /// Parse a property name as written in configuration.
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "home" | "user.home" => Self::Home,
            "cache" => Self::Cache,
            "data" => Self::Data,
            "temp" | "tmp" => Self::Temp,
            "cwd" | "user.dir" | "." => Self::CurrentDir,
            other if Path::new(other).is_absolute() => Self::Absolute(PathBuf::from(other)),
            other => Self::Env(other.to_string()),
        }
    }

    fn resolve(&self) -> Option<PathBuf> {
        match self {
            Self::Home => dirs::home_dir(),
            Self::Cache => dirs::cache_dir(),
            Self::Data => dirs::data_dir(),
            Self::Temp => Some(env::temp_dir()),
            Self::CurrentDir => env::current_dir().ok(),
            Self::Env(var) => env::var_os(var)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            Self::Absolute(path) => Some(path.clone()),
        }
    }
}

/// Configured store location: a base property plus a relative sub-path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationSpec {
    pub base: LocationBase,
    pub sub_path: PathBuf,
    pub is_write: bool,
    pub is_install: bool,
    pub mark_when_used: bool,
}

impl LocationSpec {
    pub fn read(base: LocationBase, sub_path: impl Into<PathBuf>) -> Self {
        Self {
            base,
            sub_path: sub_path.into(),
            is_write: false,
            is_install: false,
            mark_when_used: false,
        }
    }

    pub fn write(base: LocationBase, sub_path: impl Into<PathBuf>) -> Self {
        Self {
            is_write: true,
            ..Self::read(base, sub_path)
        }
    }

    pub fn install(mut self) -> Self {
        self.is_install = true;
        self
    }

    pub fn mark_when_used(mut self) -> Self {
        self.mark_when_used = true;
        self
    }

    /// Resolve to a concrete location, or `None` (with a warning) when the
    /// base property is not available.
    pub fn resolve(&self) -> Option<StoreLocation> {
        let Some(base) = self.base.resolve() else {
            warn!(
                base = ?self.base,
                sub_path = %self.sub_path.display(),
                "File store location property unresolved, skipping"
            );
            return None;
        };
        Some(StoreLocation {
            path: base.join(&self.sub_path),
            is_install: self.is_install,
            mark_when_used: self.mark_when_used,
        })
    }
}

/// File store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStoreConfig {
    /// Candidate locations; the first resolvable writable one becomes the
    /// write location, the rest are searched in order
    pub locations: Vec<LocationSpec>,
    /// Root of bundled resources searched by `find_file(_, true)`
    pub bundled_root: Option<PathBuf>,
    /// Size limit for the write location used by pruning (default: 4 GB)
    pub max_write_bytes: u64,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            locations: vec![
                LocationSpec::write(LocationBase::Cache, "globetiles").mark_when_used(),
                LocationSpec::write(LocationBase::Home, ".globetiles/cache").mark_when_used(),
                LocationSpec::read(LocationBase::Env("GLOBETILES_DATA".to_string()), "")
                    .install(),
            ],
            bundled_root: None,
            max_write_bytes: 4 * 1024 * 1024 * 1024,
        }
    }
}

impl FileStoreConfig {
    /// Single writable directory, no read locations.
    pub fn with_write_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            locations: vec![LocationSpec::write(
                LocationBase::Absolute(dir.into()),
                "",
            )
            .mark_when_used()],
            ..Default::default()
        }
    }
}

/// Result of a write-location prune.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub files_deleted: usize,
    pub bytes_freed: u64,
    pub size_before: u64,
    pub size_after: u64,
}
