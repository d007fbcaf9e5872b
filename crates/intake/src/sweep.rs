//! Sweeping a directory tree for archives and extracting each of them.

use crate::error::IntakeError;
use crate::extract::extract_recursive;
use crate::format::{archive_stem, is_archive};
use crate::types::{ExtractOptions, ExtractReport, Warning, WarningKind};
use crate::ProgressCallback;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Extract every archive under `source_dir` into a parallel tree under
/// `destination_root`.
///
/// An archive at `source_dir/a/b/lot.zip` lands in `destination_root/a/b/lot/`.
/// Archives are collected before any extraction and processed in
/// lexicographic path order. A failing archive is reported and skipped.
pub fn sweep_and_extract(
    source_dir: &Path,
    destination_root: &Path,
    options: &ExtractOptions,
    progress_cb: &ProgressCallback,
) -> ExtractReport {
    let start_time = Instant::now();
    let mut report = ExtractReport::default();

    let archives = find_archives(source_dir, &mut report.warnings);
    info!(
        source = %source_dir.display(),
        count = archives.len(),
        "Sweeping archives"
    );

    for archive in archives {
        report.merge(extract_mirrored(
            source_dir,
            destination_root,
            &archive,
            options,
            progress_cb,
        ));
    }

    report.stats.duration = start_time.elapsed();
    report
}

/// Extract a single archive from `source_dir` into its mirrored place under
/// `destination_root`, as a sweep would. Failures are reported as warnings.
pub fn extract_mirrored(
    source_dir: &Path,
    destination_root: &Path,
    archive: &Path,
    options: &ExtractOptions,
    progress_cb: &ProgressCallback,
) -> ExtractReport {
    let mut report = ExtractReport::default();
    let destination = sweep_destination(source_dir, destination_root, archive);

    if let Err(e) = fs::create_dir_all(&destination) {
        let e = IntakeError::fs(&destination, e);
        warn!(archive = %archive.display(), error = %e, "Cannot create destination");
        report.warnings.push(Warning::from_error(archive, &e));
        return report;
    }

    match extract_recursive(archive, &destination, options, progress_cb) {
        Ok(extracted) => report.merge(extracted),
        Err(e) => {
            warn!(archive = %archive.display(), error = %e, "Skipping archive");
            report.warnings.push(Warning::from_error(archive, &e));
        }
    }
    report
}

/// `destination_root/<archive parent relative to source_dir>/<archive stem>`.
fn sweep_destination(source_dir: &Path, destination_root: &Path, archive: &Path) -> PathBuf {
    let relative_parent = archive
        .parent()
        .and_then(|parent| parent.strip_prefix(source_dir).ok())
        .unwrap_or(Path::new(""));
    destination_root
        .join(relative_parent)
        .join(archive_stem(archive))
}

/// Snapshot of archive files under `root`, sorted.
fn find_archives(root: &Path, warnings: &mut Vec<Warning>) -> Vec<PathBuf> {
    let mut archives = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        match entry {
            Ok(entry) if entry.file_type().is_file() && is_archive(entry.path()) => {
                archives.push(entry.into_path());
            }
            Ok(_) => {}
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                warn!(path = %path.display(), error = %e, "Walk error");
                warnings.push(Warning::new(WarningKind::Filesystem, path, e.to_string()));
            }
        }
    }

    archives
}
