//! Removing archive files once their contents have been extracted.

use crate::format::is_archive;
use crate::types::{ProgressEvent, PurgeReport, Warning, WarningKind};
use crate::ProgressCallback;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Delete every archive file under `root`.
///
/// Running it again on the same tree is a no-op. Files that disappear
/// between listing and removal are skipped quietly; other failures are
/// reported and the sweep continues.
pub fn purge_archives(root: &Path, progress_cb: &ProgressCallback) -> PurgeReport {
    let mut report = PurgeReport::default();

    let mut archives = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        match entry {
            Ok(entry) if entry.file_type().is_file() && is_archive(entry.path()) => {
                archives.push(entry.into_path());
            }
            Ok(_) => {}
            Err(e) if is_not_found(e.io_error()) => {
                debug!(error = %e, "Entry vanished during walk");
            }
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                warn!(path = %path.display(), error = %e, "Walk error");
                report
                    .warnings
                    .push(Warning::new(WarningKind::Filesystem, path, e.to_string()));
            }
        }
    }

    for path in archives {
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "Deleted archive");
                progress_cb(&ProgressEvent::ArchiveRemoved { path: &path });
                report.removed.push(path);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Archive already gone");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot delete archive");
                report
                    .warnings
                    .push(Warning::new(WarningKind::Filesystem, &path, e.to_string()));
            }
        }
    }

    info!(
        root = %root.display(),
        removed = report.removed.len(),
        "Purged archives"
    );
    report
}

fn is_not_found(error: Option<&io::Error>) -> bool {
    error.is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
}
