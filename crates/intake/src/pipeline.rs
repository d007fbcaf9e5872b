//! The full intake run: ingest an upload, expand it, purge archives and
//! collect RC documents.

use crate::bundle::{bundle_dir, BundleSummary};
use crate::classify::{collect_matches, RuleSet};
use crate::error::IntakeError;
use crate::purge::purge_archives;
use crate::sweep::extract_mirrored;
use crate::types::{CopyOutcome, ExtractOptions, ExtractStats, Warning};
use crate::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// File name of the extracted-tree bundle.
pub const UNZIPPED_BUNDLE: &str = "unzipped_files.zip";

/// File name of the collected-documents bundle.
pub const MATCHES_BUNDLE: &str = "rc_files.zip";

/// Directories and options for one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Where uploaded archives are stored
    pub upload_dir: PathBuf,

    /// Root of the extracted tree, rebuilt on every run
    pub unzipped_dir: PathBuf,

    /// Collection of matched documents, rebuilt on every run
    pub matches_dir: PathBuf,

    /// Depth budget and size limit for extraction
    pub extract: ExtractOptions,

    /// Keywords for the keyword rule; empty means the built-in list
    pub keywords: Vec<String>,
}

impl PipelineConfig {
    /// `root/uploads`, `root/unzipped`, `root/matches`.
    pub fn under(root: &Path) -> Self {
        Self {
            upload_dir: root.join("uploads"),
            unzipped_dir: root.join("unzipped"),
            matches_dir: root.join("matches"),
            extract: ExtractOptions::default(),
            keywords: Vec::new(),
        }
    }

    /// Same layout under `root/<upload_id>`, isolating concurrent uploads.
    pub fn for_upload(root: &Path, upload_id: &str) -> Self {
        Self::under(&root.join(upload_id))
    }
}

pub fn new_upload_id() -> String {
    Uuid::new_v4().to_string()
}

/// Everything one run did, including what it had to skip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Stored copy of the upload
    pub upload: PathBuf,

    /// Totals of the extraction stage
    pub extraction: ExtractStats,

    /// Archive files deleted from the extracted tree
    pub purged: Vec<PathBuf>,

    /// Documents copied into the collection
    pub matches: Vec<CopyOutcome>,

    /// Everything skipped, across all stages
    pub warnings: Vec<Warning>,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage for one uploaded archive.
    ///
    /// The upload is stored in `upload_dir`, then `unzipped_dir` and
    /// `matches_dir` are emptied and rebuilt from that upload alone, so the
    /// report and both directories describe this upload only. Earlier
    /// uploads stay in `upload_dir`; use [`PipelineConfig::for_upload`] to
    /// keep the results of several uploads side by side.
    ///
    /// # Errors
    ///
    /// Fails only when the upload is missing, the output directories overlap
    /// the upload directory, the working directories cannot be prepared, or
    /// the upload cannot be stored. Everything else is itemized in
    /// [`RunReport::warnings`].
    pub fn run(&self, upload: &Path, progress_cb: &ProgressCallback) -> Result<RunReport, IntakeError> {
        let config = &self.config;
        if !upload.is_file() {
            return Err(IntakeError::NotFound(upload.to_path_buf()));
        }
        self.check_layout(upload)?;

        fs::create_dir_all(&config.upload_dir)
            .map_err(|e| IntakeError::fs(&config.upload_dir, e))?;
        let stored = self.ingest(upload)?;
        info!(upload = %stored.display(), "Stored upload");

        for dir in [&config.unzipped_dir, &config.matches_dir] {
            reset_dir(dir).map_err(|e| IntakeError::fs(dir, e))?;
        }

        let extraction = extract_mirrored(
            &config.upload_dir,
            &config.unzipped_dir,
            &stored,
            &config.extract,
            progress_cb,
        );
        let purge = purge_archives(&config.unzipped_dir, progress_cb);

        let rules = RuleSet::rc_documents(&config.keywords)?;
        let classify = collect_matches(
            &config.unzipped_dir,
            &config.matches_dir,
            &rules,
            progress_cb,
        )?;

        let mut warnings = extraction.warnings;
        warnings.extend(purge.warnings);
        warnings.extend(classify.warnings);

        info!(
            archives = extraction.stats.archives_extracted,
            files = extraction.stats.files_extracted,
            matches = classify.outcomes.len(),
            warnings = warnings.len(),
            "Intake run complete"
        );

        Ok(RunReport {
            upload: stored,
            extraction: extraction.stats,
            purged: purge.removed,
            matches: classify.outcomes,
            warnings,
        })
    }

    /// Pack the extracted tree and the collected documents into
    /// `out_dir/unzipped_files.zip` and `out_dir/rc_files.zip`.
    pub fn bundle(&self, out_dir: &Path) -> Result<Vec<BundleSummary>, IntakeError> {
        let unzipped = bundle_dir(&self.config.unzipped_dir, &out_dir.join(UNZIPPED_BUNDLE))?;
        let matches = bundle_dir(&self.config.matches_dir, &out_dir.join(MATCHES_BUNDLE))?;
        Ok(vec![unzipped, matches])
    }

    /// The output directories are cleared on every run, so neither may hold
    /// the uploads or the upload being run.
    fn check_layout(&self, upload: &Path) -> Result<(), IntakeError> {
        let config = &self.config;
        for dir in [&config.unzipped_dir, &config.matches_dir] {
            if config.upload_dir.starts_with(dir) || upload.starts_with(dir) {
                return Err(IntakeError::InvalidConfig(format!(
                    "output directory {} would contain the upload",
                    dir.display()
                )));
            }
        }
        Ok(())
    }

    /// Copy the upload into the upload directory, replacing a previous
    /// upload of the same name.
    fn ingest(&self, upload: &Path) -> Result<PathBuf, IntakeError> {
        let file_name = upload
            .file_name()
            .ok_or_else(|| IntakeError::NotFound(upload.to_path_buf()))?;
        let stored = self.config.upload_dir.join(file_name);
        if stored != upload {
            fs::copy(upload, &stored).map_err(|e| IntakeError::fs(&stored, e))?;
        }
        Ok(stored)
    }
}

/// Removes `dir` and everything in it, then recreates it empty.
fn reset_dir(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => debug!(dir = %dir.display(), "Cleared previous output"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::create_dir_all(dir)
}
