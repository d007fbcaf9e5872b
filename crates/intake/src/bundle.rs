//! Packing a result directory into a ZIP for download.

use crate::error::IntakeError;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A written bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleSummary {
    /// Path of the ZIP file
    pub archive: PathBuf,

    /// Number of files packed
    pub files: u64,

    /// Uncompressed bytes packed
    pub bytes: u64,
}

/// Write every file under `dir` into a deflated ZIP at `out_zip`, named by
/// its path relative to `dir` with `/` separators.
///
/// Files are added in sorted walk order. An existing `out_zip` is replaced,
/// and `out_zip` itself is skipped when it lies inside `dir`. Directories
/// only appear through the files they contain.
///
/// # Errors
///
/// Fails if `dir` is missing, or if any file cannot be read or written; a
/// partial bundle is removed.
pub fn bundle_dir(dir: &Path, out_zip: &Path) -> Result<BundleSummary, IntakeError> {
    if !dir.is_dir() {
        return Err(IntakeError::NotFound(dir.to_path_buf()));
    }
    if let Some(parent) = out_zip.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| IntakeError::fs(parent, e))?;
    }

    let file = File::create(out_zip).map_err(|e| IntakeError::fs(out_zip, e))?;
    match write_bundle(dir, out_zip, ZipWriter::new(file)) {
        Ok((files, bytes)) => {
            info!(dir = %dir.display(), archive = %out_zip.display(), files, "Bundled directory");
            Ok(BundleSummary {
                archive: out_zip.to_path_buf(),
                files,
                bytes,
            })
        }
        Err(e) => {
            warn!(archive = %out_zip.display(), error = %e, "Removing partial bundle");
            let _ = fs::remove_file(out_zip);
            Err(e)
        }
    }
}

fn write_bundle(
    dir: &Path,
    out_zip: &Path,
    mut zip: ZipWriter<File>,
) -> Result<(u64, u64), IntakeError> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let (mut files, mut bytes) = (0u64, 0u64);

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            IntakeError::fs(&path, io::Error::other(e.to_string()))
        })?;
        if !entry.file_type().is_file() || entry.path() == out_zip {
            continue;
        }

        let name = entry_name(dir, entry.path());
        zip.start_file(name, options)
            .map_err(|e| IntakeError::fs(out_zip, io::Error::other(e)))?;
        let source = File::open(entry.path()).map_err(|e| IntakeError::fs(entry.path(), e))?;
        bytes += io::copy(&mut BufReader::new(source), &mut zip)
            .map_err(|e| IntakeError::fs(entry.path(), e))?;
        files += 1;
    }

    zip.finish()
        .map_err(|e| IntakeError::fs(out_zip, io::Error::other(e)))?;
    Ok((files, bytes))
}

/// `a/b/c.pdf` for `dir/a/b/c.pdf`, whatever the platform separator.
fn entry_name(dir: &Path, path: &Path) -> String {
    path.strip_prefix(dir)
        .unwrap_or(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
