//! Archive extraction with path safety and bounded nesting.

use crate::error::{IntakeError, SecurityError};
use crate::format::{archive_stem, is_archive, ArchiveFormat};
use crate::probe::{corrupt, list_entries, open_tar};
use crate::safety::{
    check_size_limits, is_extractable, resolve, unique_destination, unique_directory, EntryType,
};
use crate::types::{
    ExtractOptions, ExtractReport, ExtractionJob, ProgressEvent, Warning, WarningKind,
};
use crate::ProgressCallback;
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Unix file-type bits of a ZIP entry's external attributes.
const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// What a single-level extraction produced.
#[derive(Debug, Clone, Default)]
pub struct ArchiveOutcome {
    /// Files written, sorted
    pub files: Vec<PathBuf>,

    /// Bytes written for those files
    pub bytes_written: u64,

    /// Entries that were skipped
    pub warnings: Vec<Warning>,
}

/// Extract one archive into `output_dir` without expanding nested archives.
///
/// The container is probed first; a malformed one fails as `CorruptArchive`
/// before anything is written. Entries that cannot be written safely are
/// skipped and reported as warnings while the remaining entries are extracted.
pub fn extract_archive(
    archive_path: &Path,
    output_dir: &Path,
    options: &ExtractOptions,
    progress_cb: &ProgressCallback,
) -> Result<ArchiveOutcome, IntakeError> {
    extract_level(archive_path, output_dir, options.size_limit_bytes, 0, progress_cb)
}

/// Extract an archive and every archive nested inside it, up to
/// `options.depth_budget` levels in total.
pub fn extract_recursive(
    archive_path: &Path,
    output_dir: &Path,
    options: &ExtractOptions,
    progress_cb: &ProgressCallback,
) -> Result<ExtractReport, IntakeError> {
    extract_nested(
        archive_path,
        output_dir,
        options.depth_budget.saturating_sub(1),
        options,
        progress_cb,
    )
}

/// Extract an archive, then expand nested archives from a worklist.
///
/// `depth_budget` is the number of nesting levels allowed below the outer
/// archive. A nested archive found when its parent's budget is 0 is left in
/// place and reported as `DepthExceeded`. Each nested archive expands into a
/// fresh directory named after its stem, directly under the destination of
/// the job that produced it, wherever the archive sat inside that job.
///
/// Only a failure of the outer archive is returned as an error; failures of
/// nested archives become warnings and stop recursion into that archive alone.
pub fn extract_nested(
    archive_path: &Path,
    output_dir: &Path,
    depth_budget: u32,
    options: &ExtractOptions,
    progress_cb: &ProgressCallback,
) -> Result<ExtractReport, IntakeError> {
    let start_time = Instant::now();
    let mut report = ExtractReport::default();
    let mut worklist = VecDeque::from([ExtractionJob {
        archive: archive_path.to_path_buf(),
        destination: output_dir.to_path_buf(),
        depth_budget,
    }]);
    let mut outer = true;

    while let Some(job) = worklist.pop_front() {
        let is_outer = std::mem::replace(&mut outer, false);

        info!(
            archive = %job.archive.display(),
            destination = %job.destination.display(),
            depth_budget = job.depth_budget,
            "Extracting archive"
        );
        progress_cb(&ProgressEvent::ArchiveStarted {
            archive: &job.archive,
            destination: &job.destination,
            depth_budget: job.depth_budget,
        });

        let outcome = match extract_level(
            &job.archive,
            &job.destination,
            options.size_limit_bytes,
            report.stats.bytes_written,
            progress_cb,
        ) {
            Ok(outcome) => outcome,
            Err(e) if is_outer => return Err(e),
            Err(e) => {
                warn!(archive = %job.archive.display(), error = %e, "Skipping nested archive");
                report.warnings.push(Warning::from_error(&job.archive, &e));
                // Only succeeds while the reserved directory is still empty.
                let _ = fs::remove_dir(&job.destination);
                continue;
            }
        };

        report.stats.archives_extracted += 1;
        report.stats.files_extracted += outcome.files.len() as u64;
        report.stats.bytes_written += outcome.bytes_written;
        report.warnings.extend(outcome.warnings);

        for nested in outcome.files.iter().filter(|p| is_archive(p)) {
            if job.depth_budget == 0 {
                let e = IntakeError::DepthExceeded {
                    path: nested.clone(),
                };
                warn!(archive = %nested.display(), "Depth budget exhausted");
                report.warnings.push(Warning::from_error(nested, &e));
                continue;
            }

            match reserve_nested_dir(nested, &job.destination) {
                Ok(destination) => worklist.push_back(ExtractionJob {
                    archive: nested.clone(),
                    destination,
                    depth_budget: job.depth_budget - 1,
                }),
                Err(e) => {
                    warn!(archive = %nested.display(), error = %e, "Cannot create nested directory");
                    report.warnings.push(Warning::from_error(nested, &e));
                }
            }
        }
    }

    report.stats.duration = start_time.elapsed();
    Ok(report)
}

/// Creates `<destination>/<nested stem>`, suffixed when taken, so archives
/// sharing a stem get distinct directories.
fn reserve_nested_dir(nested: &Path, destination: &Path) -> Result<PathBuf, IntakeError> {
    let dir = unique_directory(destination, &archive_stem(nested))
        .map_err(|e| IntakeError::fs(destination, e))?;
    fs::create_dir(&dir).map_err(|e| IntakeError::fs(&dir, e))?;
    Ok(dir)
}

fn extract_level(
    archive_path: &Path,
    output_dir: &Path,
    size_limit: Option<u64>,
    written_before: u64,
    progress_cb: &ProgressCallback,
) -> Result<ArchiveOutcome, IntakeError> {
    if !archive_path.exists() {
        return Err(IntakeError::NotFound(archive_path.to_path_buf()));
    }

    let format = ArchiveFormat::detect(archive_path).ok_or_else(|| {
        IntakeError::UnsupportedFormat(format!("Unknown archive type: {}", archive_path.display()))
    })?;

    // Validate the whole container before touching the destination.
    list_entries(archive_path, format)?;

    fs::create_dir_all(output_dir).map_err(|e| IntakeError::fs(output_dir, e))?;

    let mut writer = EntryWriter {
        archive: archive_path,
        root: output_dir,
        size_limit,
        written_before,
        outcome: ArchiveOutcome::default(),
        progress_cb,
    };

    match format {
        ArchiveFormat::Zip => extract_zip(archive_path, &mut writer)?,
        ArchiveFormat::Tar | ArchiveFormat::TarGz | ArchiveFormat::TarBz2 => {
            extract_tar(archive_path, format, &mut writer)?
        }
    }

    let mut outcome = writer.outcome;
    outcome.files.sort();
    Ok(outcome)
}

fn extract_zip(archive_path: &Path, writer: &mut EntryWriter<'_>) -> Result<(), IntakeError> {
    let file = File::open(archive_path)?;
    let mut archive =
        zip::ZipArchive::new(BufReader::new(file)).map_err(|e| corrupt(archive_path, e))?;

    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(entry) => entry,
            Err(e) => {
                // Encrypted or unsupported entries; the rest of the archive is still usable.
                writer.skip(WarningKind::CorruptArchive, format!("entry #{}: {}", i, e));
                continue;
            }
        };

        let name = entry.name().to_string();
        let entry_type = if entry.is_dir() {
            EntryType::Directory
        } else if entry.unix_mode().is_some_and(|mode| mode & S_IFMT == S_IFLNK) {
            EntryType::Symlink
        } else {
            EntryType::File
        };
        let size = entry.size();

        writer.write_entry(&name, entry_type, size, &mut entry)?;
    }

    Ok(())
}

fn extract_tar(
    archive_path: &Path,
    format: ArchiveFormat,
    writer: &mut EntryWriter<'_>,
) -> Result<(), IntakeError> {
    let mut archive = open_tar(archive_path, format)?;

    for entry_result in archive.entries().map_err(|e| corrupt(archive_path, e))? {
        let mut entry = entry_result.map_err(|e| corrupt(archive_path, e))?;

        let entry_type = match entry.header().entry_type() {
            tar::EntryType::Regular | tar::EntryType::Continuous => EntryType::File,
            tar::EntryType::Directory => EntryType::Directory,
            tar::EntryType::Symlink => EntryType::Symlink,
            tar::EntryType::Link => EntryType::Hardlink,
            tar::EntryType::XGlobalHeader
            | tar::EntryType::XHeader
            | tar::EntryType::GNULongName
            | tar::EntryType::GNULongLink => continue,
            _ => EntryType::Other,
        };
        let name = entry
            .path()
            .map_err(|e| corrupt(archive_path, e))?
            .to_string_lossy()
            .into_owned();
        let size = entry.header().size().unwrap_or(0);

        writer.write_entry(&name, entry_type, size, &mut entry)?;
    }

    Ok(())
}

/// Writes the entries of one archive under a single root.
struct EntryWriter<'a> {
    archive: &'a Path,
    root: &'a Path,
    size_limit: Option<u64>,
    written_before: u64,
    outcome: ArchiveOutcome,
    progress_cb: &'a ProgressCallback,
}

impl EntryWriter<'_> {
    /// Writes one entry. Per-entry problems become warnings; only a size
    /// limit breach aborts the archive.
    fn write_entry<R: Read>(
        &mut self,
        name: &str,
        entry_type: EntryType,
        declared_size: u64,
        reader: &mut R,
    ) -> Result<(), IntakeError> {
        if !is_extractable(entry_type) {
            let e = SecurityError::UnsafeEntryType(format!("{} ({:?})", name, entry_type));
            self.skip(WarningKind::UnsafeEntry, e.to_string());
            return Ok(());
        }

        let target = match resolve(self.root, Path::new(name)) {
            Ok(target) => target,
            Err(e) => {
                warn!(archive = %self.archive.display(), entry = name, error = %e, "Rejected entry");
                let e = IntakeError::Security(e);
                self.outcome.warnings.push(Warning::from_error(self.archive, &e));
                return Ok(());
            }
        };

        if entry_type == EntryType::Directory {
            if let Err(e) = fs::create_dir_all(&target) {
                self.skip(WarningKind::Filesystem, format!("{}: {}", name, e));
            }
            return Ok(());
        }

        self.check_limit(declared_size)?;

        match write_file(&target, reader) {
            Ok((path, bytes)) => {
                if let Err(e) = self.check_limit(bytes) {
                    let _ = fs::remove_file(&path);
                    return Err(e);
                }
                debug!(entry = name, path = %path.display(), bytes, "Extracted entry");
                (self.progress_cb)(&ProgressEvent::EntryExtracted { path: &path, bytes });
                self.outcome.bytes_written += bytes;
                self.outcome.files.push(path);
            }
            Err(e) => self.skip(WarningKind::Filesystem, format!("{}: {}", name, e)),
        }

        Ok(())
    }

    fn check_limit(&self, incoming: u64) -> Result<(), IntakeError> {
        let current = self.written_before + self.outcome.bytes_written + incoming;
        check_size_limits(current, self.size_limit)
            .map_err(|limit| IntakeError::SizeLimitExceeded { current, limit })
    }

    fn skip(&mut self, kind: WarningKind, detail: String) {
        warn!(archive = %self.archive.display(), detail = %detail, "Skipped entry");
        self.outcome
            .warnings
            .push(Warning::new(kind, self.archive, detail));
    }
}

/// Writes `reader` to `target`, or to a suffixed sibling if `target` is taken.
fn write_file<R: Read>(target: &Path, reader: &mut R) -> io::Result<(PathBuf, u64)> {
    let parent = target
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "entry has no parent"))?;
    let file_name = target
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "entry has no file name"))?
        .to_string_lossy()
        .into_owned();

    fs::create_dir_all(parent)?;
    let path = unique_destination(parent, &file_name)?;
    let mut out = OpenOptions::new().write(true).create_new(true).open(&path)?;

    match io::copy(reader, &mut out) {
        Ok(bytes) => Ok((path, bytes)),
        Err(e) => {
            drop(out);
            let _ = fs::remove_file(&path);
            Err(e)
        }
    }
}
