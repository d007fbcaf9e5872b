//! Type definitions for the intake pipeline.

use crate::error::{IntakeError, SecurityError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Individual entry within an archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Path of the entry within the archive
    pub path: String,

    /// Whether this entry is a directory
    pub is_directory: bool,

    /// Uncompressed size in bytes
    pub size: u64,

    /// Compressed size in bytes (if available)
    pub compressed_size: Option<u64>,
}

/// Metadata information about an archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveInfo {
    /// Archive format (e.g., "ZIP", "TAR.GZ")
    pub format: String,

    /// Number of entries in the archive
    pub entries: u64,

    /// Size of the archive file in bytes
    pub compressed_bytes: Option<u64>,

    /// Estimated uncompressed size in bytes (if available)
    pub uncompressed_estimate: Option<u64>,

    /// List of all entries in the archive
    pub entry_list: Vec<ArchiveEntry>,
}

/// Options for extracting archives.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Maximum number of archive levels expanded, the outermost archive included (default: 10)
    pub depth_budget: u32,

    /// Maximum total extracted size in bytes for one recursive extraction (default: none)
    pub size_limit_bytes: Option<u64>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            depth_budget: 10,
            size_limit_bytes: None,
        }
    }
}

/// A pending extraction on the extractor's worklist.
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    /// Archive to expand
    pub archive: PathBuf,

    /// Directory receiving its entries
    pub destination: PathBuf,

    /// Nesting levels this job may still expand below itself
    pub depth_budget: u32,
}

/// A file seen during a tree walk.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Full path of the file
    pub path: PathBuf,

    /// Final path component, lossily decoded
    pub file_name: String,

    /// Directory containing the file
    pub parent: PathBuf,
}

impl FileRecord {
    /// Builds a record from a walked path; `None` for paths without a file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_string_lossy().into_owned();
        let parent = path.parent().unwrap_or(Path::new("")).to_path_buf();
        Some(Self {
            path: path.to_path_buf(),
            file_name,
            parent,
        })
    }
}

/// Result of copying one matched file into the target collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyOutcome {
    /// File that matched
    pub source: PathBuf,

    /// Where it was copied to
    pub destination: PathBuf,

    /// Whether the destination name was suffixed to avoid a collision
    pub renamed: bool,
}

/// Category of a skipped unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Archive unreadable, malformed or of an unknown type
    CorruptArchive,
    /// Entry path was absolute or escaped the destination
    PathTraversal,
    /// Link or special entry that is never written
    UnsafeEntry,
    /// Nested archive beyond the depth budget, left unexpanded
    DepthExceeded,
    /// Extraction stopped at the configured size limit
    SizeLimit,
    /// Any other I/O failure
    Filesystem,
}

/// One item the pipeline could not process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    /// What went wrong
    pub kind: WarningKind,

    /// Archive, entry source or file that was skipped
    pub path: PathBuf,

    /// Human-readable reason
    pub detail: String,
}

impl Warning {
    pub fn new(kind: WarningKind, path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Classifies an error that caused `path` to be skipped.
    pub fn from_error(path: impl Into<PathBuf>, error: &IntakeError) -> Self {
        let kind = match error {
            IntakeError::CorruptArchive { .. } | IntakeError::UnsupportedFormat(_) => {
                WarningKind::CorruptArchive
            }
            IntakeError::Security(SecurityError::UnsafeEntryType(_)) => WarningKind::UnsafeEntry,
            IntakeError::Security(_) => WarningKind::PathTraversal,
            IntakeError::DepthExceeded { .. } => WarningKind::DepthExceeded,
            IntakeError::SizeLimitExceeded { .. } => WarningKind::SizeLimit,
            _ => WarningKind::Filesystem,
        };
        Self::new(kind, path, error.to_string())
    }
}

/// Statistics about a completed extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractStats {
    /// Number of archives expanded, nested ones included
    pub archives_extracted: u64,

    /// Number of files successfully extracted
    pub files_extracted: u64,

    /// Total bytes written to disk
    pub bytes_written: u64,

    /// Duration of the extraction (in seconds)
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl ExtractStats {
    pub fn absorb(&mut self, other: &ExtractStats) {
        self.archives_extracted += other.archives_extracted;
        self.files_extracted += other.files_extracted;
        self.bytes_written += other.bytes_written;
        self.duration += other.duration;
    }
}

/// Outcome of a recursive extraction or a sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractReport {
    /// Totals over every archive expanded
    pub stats: ExtractStats,

    /// Entries and archives that were skipped
    pub warnings: Vec<Warning>,
}

impl ExtractReport {
    pub fn merge(&mut self, other: ExtractReport) {
        self.stats.absorb(&other.stats);
        self.warnings.extend(other.warnings);
    }
}

/// Outcome of an archive purge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurgeReport {
    /// Archive files deleted, in walk order
    pub removed: Vec<PathBuf>,

    /// Files that could not be deleted
    pub warnings: Vec<Warning>,
}

/// Outcome of a classification walk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifyReport {
    /// One entry per copied match, in walk order
    pub outcomes: Vec<CopyOutcome>,

    /// Walk errors and failed copies
    pub warnings: Vec<Warning>,
}

/// Progress notifications emitted while the pipeline runs.
#[derive(Debug, Clone, Copy)]
pub enum ProgressEvent<'a> {
    /// An archive is about to be expanded.
    ArchiveStarted {
        archive: &'a Path,
        destination: &'a Path,
        depth_budget: u32,
    },
    /// A file entry was written.
    EntryExtracted { path: &'a Path, bytes: u64 },
    /// An archive file was deleted by the purge step.
    ArchiveRemoved { path: &'a Path },
    /// A matching file was copied into the target collection.
    FileMatched {
        source: &'a Path,
        destination: &'a Path,
    },
}

// Helper module for Duration serialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
