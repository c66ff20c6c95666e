//! Multi-location file store.

use super::prune;
use super::types::{FileStoreConfig, FileStoreError, PruneReport, StoreLocation};
use filetime::FileTime;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Ordered set of directories holding cached and installed data files.
///
/// The writable location, when present, is always searched first. Relative
/// names use `/` separators and must not escape their location.
#[derive(Debug)]
pub struct FileStore {
    write_location: Option<StoreLocation>,
    read_locations: Vec<StoreLocation>,
    bundled_root: Option<PathBuf>,
    /// Serializes file creation and deletion
    lock: Mutex<()>,
}

impl FileStore {
    /// Build a store from configuration.
    ///
    /// The first writable location that resolves and can be created becomes
    /// the write location. Locations that cannot be resolved are skipped.
    pub fn new(config: &FileStoreConfig) -> Self {
        let mut write_location = None;
        let mut read_locations = Vec::new();

        for spec in &config.locations {
            let Some(location) = spec.resolve() else {
                continue;
            };
            if spec.is_write {
                if write_location.is_some() {
                    continue;
                }
                match fs::create_dir_all(&location.path) {
                    Ok(()) => write_location = Some(location),
                    Err(e) => warn!(
                        path = %location.path.display(),
                        error = %e,
                        "Cannot create file store write location"
                    ),
                }
            } else {
                read_locations.push(location);
            }
        }

        match &write_location {
            Some(w) => info!(
                write_location = %w.path.display(),
                read_locations = read_locations.len(),
                "File store initialized"
            ),
            None => warn!("File store has no writable location"),
        }

        Self {
            write_location,
            read_locations,
            bundled_root: config.bundled_root.clone(),
            lock: Mutex::new(()),
        }
    }

    /// Build a store from already resolved locations.
    pub fn with_locations(
        write_location: Option<StoreLocation>,
        read_locations: Vec<StoreLocation>,
    ) -> Result<Self, FileStoreError> {
        if let Some(w) = &write_location {
            fs::create_dir_all(&w.path)?;
        }
        Ok(Self {
            write_location,
            read_locations,
            bundled_root: None,
            lock: Mutex::new(()),
        })
    }

    pub fn with_bundled_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.bundled_root = Some(root.into());
        self
    }

    pub fn write_location(&self) -> Option<&StoreLocation> {
        self.write_location.as_ref()
    }

    /// All locations in search order.
    pub fn locations(&self) -> Vec<&StoreLocation> {
        self.write_location
            .iter()
            .chain(self.read_locations.iter())
            .collect()
    }

    /// Find the first existing file with the given relative name.
    ///
    /// With `check_bundled`, the bundled resource root is searched last.
    pub fn find_file(&self, name: &str, check_bundled: bool) -> Option<PathBuf> {
        let relative = validate_name(name).ok()?;

        for location in self.locations() {
            let candidate = location.path.join(&relative);
            if candidate.is_file() {
                if location.mark_when_used {
                    touch(&candidate);
                }
                return Some(candidate);
            }
        }

        if check_bundled {
            if let Some(root) = &self.bundled_root {
                let candidate = root.join(&relative);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// Whether any location holds the named file.
    pub fn contains_file(&self, name: &str) -> bool {
        let Ok(relative) = validate_name(name) else {
            return false;
        };
        self.locations()
            .iter()
            .any(|l| l.path.join(&relative).is_file())
    }

    /// Path for a new file under the write location, creating parent
    /// directories.
    pub fn new_file(&self, name: &str) -> Result<PathBuf, FileStoreError> {
        let relative = validate_name(name)?;
        let write = self
            .write_location
            .as_ref()
            .ok_or(FileStoreError::NoWriteLocation)?;

        let _guard = self.lock.lock();
        let path = write.path.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    /// Write `data` to the named file under the write location.
    pub fn write_file(&self, name: &str, data: &[u8]) -> Result<PathBuf, FileStoreError> {
        let path = self.new_file(name)?;
        let _guard = self.lock.lock();
        fs::write(&path, data)?;
        debug!(path = %path.display(), bytes = data.len(), "Wrote file store entry");
        Ok(path)
    }

    /// Delete a file, but only under the write location or the system temp
    /// directory. Returns `false` for any other path or a missing file.
    pub fn remove_file(&self, path: &Path) -> bool {
        if has_parent_component(path) || !self.is_deletable(path) {
            debug!(path = %path.display(), "Refusing to delete file outside write location");
            return false;
        }

        let _guard = self.lock.lock();
        if !path.is_file() {
            return false;
        }
        match fs::remove_file(path) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to delete file store entry");
                false
            }
        }
    }

    fn is_deletable(&self, path: &Path) -> bool {
        let under_write = self
            .write_location
            .as_ref()
            .is_some_and(|w| path.starts_with(&w.path));
        under_write || path.starts_with(std::env::temp_dir())
    }

    /// Whether the path lies under an install location.
    pub fn is_install_location(&self, path: &Path) -> bool {
        self.locations()
            .iter()
            .any(|l| l.is_install && path.starts_with(&l.path))
    }

    /// Names of entries directly inside `dir` accepted by `filter`, merged
    /// across locations.
    pub fn list_file_names<F>(&self, dir: &str, filter: F) -> Vec<String>
    where
        F: Fn(&Path) -> bool,
    {
        self.collect_names(dir, |root, out| list_level(root, root, &filter, out))
    }

    /// Names of all entries below `dir` accepted by `filter`.
    pub fn list_all_file_names<F>(&self, dir: &str, filter: F) -> Vec<String>
    where
        F: Fn(&Path) -> bool,
    {
        self.collect_names(dir, |root, out| list_recursive(root, root, &filter, false, out))
    }

    /// Like [`list_all_file_names`](Self::list_all_file_names) but stops
    /// descending a branch once an entry in it matches.
    pub fn list_top_file_names<F>(&self, dir: &str, filter: F) -> Vec<String>
    where
        F: Fn(&Path) -> bool,
    {
        self.collect_names(dir, |root, out| list_recursive(root, root, &filter, true, out))
    }

    fn collect_names<L>(&self, dir: &str, lister: L) -> Vec<String>
    where
        L: Fn(&Path, &mut BTreeSet<String>),
    {
        let Ok(relative) = validate_name(dir) else {
            return Vec::new();
        };
        let mut names = BTreeSet::new();
        for location in self.locations() {
            let root = location.path.join(&relative);
            if root.is_dir() {
                lister(&root, &mut names);
            }
        }
        names.into_iter().collect()
    }

    /// Number of files and bytes held by the write location.
    pub fn write_location_usage(&self) -> (usize, u64) {
        match &self.write_location {
            Some(w) => {
                let files = prune::collect_files(&w.path);
                let bytes = files.iter().map(|f| f.size).sum();
                (files.len(), bytes)
            }
            None => (0, 0),
        }
    }

    /// Delete least-recently-used files until the write location holds at
    /// most 90% of `max_bytes`.
    pub fn prune_write_location(&self, max_bytes: u64) -> Result<PruneReport, FileStoreError> {
        let write = self
            .write_location
            .as_ref()
            .ok_or(FileStoreError::NoWriteLocation)?;
        let _guard = self.lock.lock();
        Ok(prune::prune_to_limit(&write.path, max_bytes))
    }

    /// Delete everything under the write location.
    pub fn clear_write_location(&self) -> Result<PruneReport, FileStoreError> {
        let write = self
            .write_location
            .as_ref()
            .ok_or(FileStoreError::NoWriteLocation)?;
        let _guard = self.lock.lock();
        Ok(prune::prune_to_target(&write.path, 0))
    }
}

fn validate_name(name: &str) -> Result<PathBuf, FileStoreError> {
    let path = Path::new(name);
    if path.is_absolute() || has_parent_component(path) {
        return Err(FileStoreError::InvalidName(name.to_string()));
    }
    Ok(path.to_path_buf())
}

fn has_parent_component(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

fn touch(path: &Path) {
    if let Err(e) = filetime::set_file_mtime(path, FileTime::now()) {
        debug!(path = %path.display(), error = %e, "Failed to update file modification time");
    }
}

fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

fn list_level<F>(root: &Path, dir: &Path, filter: &F, out: &mut BTreeSet<String>)
where
    F: Fn(&Path) -> bool,
{
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if filter(&path) {
            if let Some(name) = relative_name(root, &path) {
                out.insert(name);
            }
        }
    }
}

fn list_recursive<F>(root: &Path, dir: &Path, filter: &F, stop_at_match: bool, out: &mut BTreeSet<String>)
where
    F: Fn(&Path) -> bool,
{
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let matched = filter(&path);
        if matched {
            if let Some(name) = relative_name(root, &path) {
                out.insert(name);
            }
        }
        if path.is_dir() && !(matched && stop_at_match) {
            list_recursive(root, &path, filter, stop_at_match, out);
        }
    }
}
