//! Filename classification of consultation-rules (RC) documents.
//!
//! A [`RuleSet`] is a list of [`MatchRule`]s evaluated uniformly against each
//! file name; a file matching any rule is copied once into the target
//! collection.

use crate::error::IntakeError;
use crate::safety::unique_destination;
use crate::types::{ClassifyReport, CopyOutcome, FileRecord, ProgressEvent, Warning, WarningKind};
use crate::ProgressCallback;
use regex::Regex;
use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// `rc` as a standalone token of a file stem.
pub const RC_TOKEN_PATTERN: &str = r"(?i)(^|[_.\s])rc([_.\s]|$)";

/// Keywords naming a consultation-rules document.
///
/// Accented and unaccented spellings are enumerated; names are not
/// diacritic-folded.
pub const DEFAULT_KEYWORDS: &[&str] = &["Règlement de la consultation", "Reglement de consultation"];

/// A filename test.
#[derive(Debug, Clone)]
pub enum MatchRule {
    /// Case-insensitive substring match on the whole file name.
    Keywords(Vec<String>),
    /// Regex match on the file stem.
    Pattern(Regex),
}

impl MatchRule {
    pub fn keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        MatchRule::Keywords(
            keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        )
    }

    pub fn pattern(pattern: &str) -> Result<Self, IntakeError> {
        Ok(MatchRule::Pattern(Regex::new(pattern)?))
    }

    /// The `rc` word-boundary rule: matches `rc_report`, `2024.rc.final`,
    /// `RC`; rejects `arc`, `marc_notes`, `rcv`.
    pub fn rc_token() -> Result<Self, IntakeError> {
        Self::pattern(RC_TOKEN_PATTERN)
    }

    pub fn matches(&self, file_name: &str) -> bool {
        match self {
            MatchRule::Keywords(keywords) => {
                let name = file_name.to_lowercase();
                keywords.iter().any(|k| name.contains(k.as_str()))
            }
            MatchRule::Pattern(regex) => regex.is_match(file_stem(file_name)),
        }
    }
}

/// Rules combined with "any".
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<MatchRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<MatchRule>) -> Self {
        Self { rules }
    }

    /// Keyword rule over `keywords` (or [`DEFAULT_KEYWORDS`] when empty) plus the `rc` token rule.
    pub fn rc_documents<S: AsRef<str>>(keywords: &[S]) -> Result<Self, IntakeError> {
        let keyword_rule = if keywords.is_empty() {
            MatchRule::keywords(DEFAULT_KEYWORDS)
        } else {
            MatchRule::keywords(keywords)
        };
        Ok(Self::new(vec![keyword_rule, MatchRule::rc_token()?]))
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(file_name))
    }
}

/// Copy every file under `source_dir` whose name matches `rules` into `target_dir`.
///
/// Each source file is copied at most once. Existing names in `target_dir`
/// are never overwritten: the copy gets a `_N` suffix instead. Anything
/// already under `target_dir` is ignored, and the source tree is left untouched.
///
/// # Errors
///
/// Only fails if `target_dir` cannot be created; per-file copy failures are
/// reported as warnings.
pub fn collect_matches(
    source_dir: &Path,
    target_dir: &Path,
    rules: &RuleSet,
    progress_cb: &ProgressCallback,
) -> Result<ClassifyReport, IntakeError> {
    fs::create_dir_all(target_dir).map_err(|e| IntakeError::fs(target_dir, e))?;
    let mut report = ClassifyReport::default();

    let mut candidates = Vec::new();
    for entry in WalkDir::new(source_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.path() != target_dir)
    {
        match entry {
            Ok(entry) if entry.file_type().is_file() => {
                if let Some(record) = FileRecord::from_path(entry.path()) {
                    if rules.matches(&record.file_name) {
                        candidates.push(record);
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                let path = e.path().unwrap_or(source_dir).to_path_buf();
                warn!(path = %path.display(), error = %e, "Walk error");
                report
                    .warnings
                    .push(Warning::new(WarningKind::Filesystem, path, e.to_string()));
            }
        }
    }

    for record in candidates {
        match copy_into(&record, target_dir) {
            Ok(outcome) => {
                debug!(
                    source = %outcome.source.display(),
                    destination = %outcome.destination.display(),
                    renamed = outcome.renamed,
                    "Copied match"
                );
                progress_cb(&ProgressEvent::FileMatched {
                    source: &outcome.source,
                    destination: &outcome.destination,
                });
                report.outcomes.push(outcome);
            }
            Err(e) => {
                warn!(path = %record.path.display(), error = %e, "Cannot copy match");
                report
                    .warnings
                    .push(Warning::new(WarningKind::Filesystem, &record.path, e.to_string()));
            }
        }
    }

    info!(
        source = %source_dir.display(),
        target = %target_dir.display(),
        matches = report.outcomes.len(),
        "Collected matches"
    );
    Ok(report)
}

fn copy_into(record: &FileRecord, target_dir: &Path) -> std::io::Result<CopyOutcome> {
    let destination = unique_destination(target_dir, &record.file_name)?;
    fs::copy(&record.path, &destination)?;
    let renamed = destination.file_name() != Some(OsStr::new(&record.file_name));
    Ok(CopyOutcome {
        source: record.path.clone(),
        destination,
        renamed,
    })
}

/// Text before the last dot; leading-dot names are all stem.
fn file_stem(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(idx) if !file_name[..idx].trim_start_matches('.').is_empty() => &file_name[..idx],
        _ => file_name,
    }
}
