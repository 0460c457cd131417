//! Render cache maintenance.

use std::fs;
use std::io;
use std::path::Path;

/// Outcome of a cache purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub files_removed: usize,
    pub dirs_removed: usize,
    pub bytes_freed: u64,
    /// Entries that could not be removed.
    pub failures: usize,
}

/// Total size in bytes of all files under `dir` (recursive).
///
/// A missing folder counts as empty.
pub fn folder_size(dir: &Path) -> io::Result<u64> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut total = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            total += folder_size(&entry.path())?;
        } else if meta.is_file() {
            total += meta.len();
        }
    }
    Ok(total)
}

/// Human-readable size: `512 Bytes`, `1.5 KB`, `12.0 MB`.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes < KB {
        format!("{} Bytes", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}

/// Delete every file and subfolder in `dir`, keeping `dir` itself.
///
/// Individual failures are logged and counted; the purge continues.
pub fn purge(dir: &Path) -> io::Result<PurgeReport> {
    let mut report = PurgeReport::default();
    if !dir.exists() {
        return Ok(report);
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!("Failed to inspect {}: {}", path.display(), e);
                report.failures += 1;
                continue;
            }
        };

        if meta.is_dir() {
            let size = folder_size(&path).unwrap_or(0);
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    report.dirs_removed += 1;
                    report.bytes_freed += size;
                }
                Err(e) => {
                    tracing::warn!("Failed to delete {}: {}", path.display(), e);
                    report.failures += 1;
                }
            }
        } else {
            match fs::remove_file(&path) {
                Ok(()) => {
                    report.files_removed += 1;
                    report.bytes_freed += meta.len();
                }
                Err(e) => {
                    tracing::warn!("Failed to delete {}: {}", path.display(), e);
                    report.failures += 1;
                }
            }
        }
    }

    tracing::info!(
        "Purged render cache {}: {} files, {} folders, {}",
        dir.display(),
        report.files_removed,
        report.dirs_removed,
        format_size(report.bytes_freed)
    );
    Ok(report)
}
