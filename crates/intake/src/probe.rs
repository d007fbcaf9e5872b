//! Archive probing: reading entry metadata without extracting.
//!
//! The extractor probes every archive before writing anything, so a
//! malformed container is rejected as a whole instead of half-extracted.

use crate::error::IntakeError;
use crate::format::ArchiveFormat;
use crate::types::{ArchiveEntry, ArchiveInfo};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Probe an archive to retrieve metadata without extracting.
///
/// # Errors
///
/// Returns an error if:
/// - The archive file doesn't exist
/// - The extension is not a recognized archive format
/// - The container is malformed (`CorruptArchive`)
pub fn probe_archive(path: &Path) -> Result<ArchiveInfo, IntakeError> {
    if !path.exists() {
        return Err(IntakeError::NotFound(path.to_path_buf()));
    }

    let format = ArchiveFormat::detect(path).ok_or_else(|| {
        IntakeError::UnsupportedFormat(format!("Unknown archive type: {}", path.display()))
    })?;

    let compressed_bytes = Some(std::fs::metadata(path)?.len());
    let entry_list = list_entries(path, format)?;

    let entries = entry_list.len() as u64;
    let uncompressed_estimate = if entry_list.is_empty() {
        None
    } else {
        Some(entry_list.iter().map(|e| e.size).sum())
    };

    Ok(ArchiveInfo {
        format: format.to_string(),
        entries,
        compressed_bytes,
        uncompressed_estimate,
        entry_list,
    })
}

/// List entries of an archive whose format is already known.
pub fn list_entries(path: &Path, format: ArchiveFormat) -> Result<Vec<ArchiveEntry>, IntakeError> {
    match format {
        ArchiveFormat::Zip => list_zip_entries(path),
        ArchiveFormat::Tar | ArchiveFormat::TarGz | ArchiveFormat::TarBz2 => {
            list_tar_entries(path, format)
        }
    }
}

/// Opens a TAR archive, wrapping the file in the matching decompressor.
pub(crate) fn open_tar(
    path: &Path,
    format: ArchiveFormat,
) -> Result<tar::Archive<Box<dyn Read>>, IntakeError> {
    use bzip2::read::BzDecoder;
    use flate2::read::GzDecoder;

    let file = BufReader::new(File::open(path)?);
    let reader: Box<dyn Read> = match format {
        ArchiveFormat::TarGz => Box::new(GzDecoder::new(file)),
        ArchiveFormat::TarBz2 => Box::new(BzDecoder::new(file)),
        _ => Box::new(file),
    };
    Ok(tar::Archive::new(reader))
}

pub(crate) fn corrupt(path: &Path, reason: impl ToString) -> IntakeError {
    IntakeError::CorruptArchive {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn list_zip_entries(path: &Path) -> Result<Vec<ArchiveEntry>, IntakeError> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(|e| corrupt(path, e))?;
    let mut entries = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        // Raw access skips decryption, so encrypted entries are still listed.
        let entry = archive.by_index_raw(i).map_err(|e| corrupt(path, e))?;
        entries.push(ArchiveEntry {
            path: entry.name().to_string(),
            is_directory: entry.is_dir(),
            size: entry.size(),
            compressed_size: Some(entry.compressed_size()),
        });
    }

    Ok(entries)
}

fn list_tar_entries(path: &Path, format: ArchiveFormat) -> Result<Vec<ArchiveEntry>, IntakeError> {
    let mut archive = open_tar(path, format)?;
    let mut entries = Vec::new();

    for entry_result in archive.entries().map_err(|e| corrupt(path, e))? {
        let entry = entry_result.map_err(|e| corrupt(path, e))?;
        let header = entry.header();
        let entry_path = entry.path().map_err(|e| corrupt(path, e))?;

        entries.push(ArchiveEntry {
            path: entry_path.to_string_lossy().to_string(),
            is_directory: header.entry_type().is_dir(),
            size: header.size().map_err(|e| corrupt(path, e))?,
            compressed_size: None,
        });
    }

    Ok(entries)
}
