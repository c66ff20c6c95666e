//! Least-recently-used pruning of the write location.
//!
//! Recency is approximated by modification time, which `find_file` refreshes
//! for locations flagged `mark_when_used`.

use super::types::PruneReport;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Fraction of the limit to prune down to, leaving headroom for new writes.
const PRUNE_TARGET_FRACTION: f64 = 0.9;

#[derive(Debug)]
pub(crate) struct StoredFile {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

/// Prune `root` when it exceeds `max_bytes`.
pub(crate) fn prune_to_limit(root: &Path, max_bytes: u64) -> PruneReport {
    let files = collect_files(root);
    let current: u64 = files.iter().map(|f| f.size).sum();

    if current <= max_bytes {
        debug!(
            size_bytes = current,
            limit_bytes = max_bytes,
            "Write location under limit, nothing to prune"
        );
        return PruneReport {
            size_before: current,
            size_after: current,
            ..Default::default()
        };
    }

    let target = (max_bytes as f64 * PRUNE_TARGET_FRACTION) as u64;
    info!(
        size_bytes = current,
        limit_bytes = max_bytes,
        target_bytes = target,
        files = files.len(),
        "Write location over limit, pruning"
    );
    delete_oldest(root, files, current, target)
}

/// Prune `root` down to `target` bytes unconditionally.
pub(crate) fn prune_to_target(root: &Path, target: u64) -> PruneReport {
    let files = collect_files(root);
    let current = files.iter().map(|f| f.size).sum();
    delete_oldest(root, files, current, target)
}

fn delete_oldest(root: &Path, mut files: Vec<StoredFile>, current: u64, target: u64) -> PruneReport {
    files.sort_by_key(|f| f.modified);

    let mut report = PruneReport {
        size_before: current,
        size_after: current,
        ..Default::default()
    };

    for file in files {
        if report.size_after <= target {
            break;
        }
        match fs::remove_file(&file.path) {
            Ok(()) => {
                report.files_deleted += 1;
                report.bytes_freed += file.size;
                report.size_after = report.size_after.saturating_sub(file.size);
            }
            Err(e) => debug!(
                path = %file.path.display(),
                error = %e,
                "Failed to delete file during prune"
            ),
        }
    }

    if report.size_after > target {
        warn!(
            remaining = report.size_after,
            target, "Prune could not reach target size"
        );
    }

    remove_empty_dirs(root);

    info!(
        files_deleted = report.files_deleted,
        bytes_freed = report.bytes_freed,
        size_after = report.size_after,
        "Write location prune complete"
    );
    report
}

pub(crate) fn collect_files(root: &Path) -> Vec<StoredFile> {
    let mut files = Vec::new();
    collect_recursive(root, &mut files);
    files
}

fn collect_recursive(dir: &Path, files: &mut Vec<StoredFile>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Failed to read directory");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(&path, files);
        } else if let Ok(metadata) = entry.metadata() {
            files.push(StoredFile {
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                size: metadata.len(),
                path,
            });
        }
    }
}

fn remove_empty_dirs(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            remove_empty_dirs(&path);
            // Fails harmlessly when not empty
            let _ = fs::remove_dir(&path);
        }
    }
}
