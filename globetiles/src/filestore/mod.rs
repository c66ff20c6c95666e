//! File store: ordered data directories with one writable cache location.
//!
//! Tiles retrieved from the network are written under the write location
//! using the relative layout `<cache>/<level>/<row>/<row>_<col><suffix>` and
//! found again with [`FileStore::find_file`]. Read-only install locations and
//! an optional bundled resource root are searched after it.

mod prune;
mod store;
mod types;

pub use store::FileStore;
pub use types::{
    FileStoreConfig, FileStoreError, LocationBase, LocationSpec, PruneReport, StoreLocation,
};
