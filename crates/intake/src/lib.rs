//! # Intake
//!
//! Recursive archive intake and classification of "règlement de consultation"
//! (RC) documents.
//!
//! An uploaded archive is expanded into a working tree (nested archives
//! included, up to a depth budget), archives are purged from that tree, and
//! files whose names look like RC documents are copied into a collection for
//! downstream analysis. Entry paths are validated against the destination
//! root, and no stage ever overwrites an existing file.
//!
//! ## Supported Formats
//!
//! - ZIP
//! - TAR (plain, gzip, bzip2)
//!
//! ## Example
//!
//! ```rust,no_run
//! use intake::{Pipeline, PipelineConfig, ProgressEvent};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = Pipeline::new(PipelineConfig::under(Path::new("work")));
//! let progress_cb = |event: &ProgressEvent<'_>| println!("{:?}", event);
//!
//! let report = pipeline.run(Path::new("dce.zip"), &progress_cb)?;
//! println!(
//!     "Extracted {} files, collected {} documents",
//!     report.extraction.files_extracted,
//!     report.matches.len()
//! );
//! for warning in &report.warnings {
//!     println!("skipped {}: {}", warning.path.display(), warning.detail);
//! }
//! # Ok(())
//! # }
//! ```

pub mod analyze;
pub mod bundle;
pub mod classify;
pub mod error;
pub mod extract;
pub mod format;
pub mod pipeline;
pub mod probe;
pub mod purge;
pub mod safety;
pub mod sweep;
pub mod types;

// Re-export main types
pub use bundle::{bundle_dir, BundleSummary};
pub use classify::{collect_matches, MatchRule, RuleSet};
pub use error::{IntakeError, SecurityError};
pub use extract::{extract_archive, extract_nested, extract_recursive, ArchiveOutcome};
pub use format::{is_archive, ArchiveFormat};
pub use pipeline::{new_upload_id, Pipeline, PipelineConfig, RunReport};
pub use purge::purge_archives;
pub use sweep::{extract_mirrored, sweep_and_extract};
pub use types::{
    ArchiveEntry, ArchiveInfo, ClassifyReport, CopyOutcome, ExtractOptions, ExtractReport,
    ExtractStats, ExtractionJob, ProgressEvent, PurgeReport, Warning, WarningKind,
};

use std::path::Path;

/// Type alias for progress observers.
///
/// Called synchronously for every [`ProgressEvent`]; extraction results never
/// depend on what the observer does.
pub type ProgressCallback = dyn Fn(&ProgressEvent<'_>) + Send + Sync;

/// Probe an archive to retrieve metadata without extracting.
///
/// # Errors
///
/// Returns an error if:
/// - The archive file doesn't exist
/// - The format is unsupported or corrupted
pub fn probe(path: &Path) -> Result<ArchiveInfo, IntakeError> {
    probe::probe_archive(path)
}
