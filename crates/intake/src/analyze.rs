//! Downstream analysis of collected RC documents.
//!
//! Text comes out of a [`TextExtractor`], goes into a [`LanguageModel`] with
//! one of the prompts below, and the answers are parsed into labeled records
//! and a numbered to-do list stored next to the PDF.

use crate::error::IntakeError;
use crate::types::{Warning, WarningKind};
use serde::{Deserialize, Serialize};
use serde_json::ser::{PrettyFormatter, Serializer};
use std::collections::BTreeMap;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Fields extracted from a document, by label.
pub type LabeledRecord = BTreeMap<String, String>;

/// Reads the text of a document.
pub trait TextExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, IntakeError>;
}

/// Completes a prompt.
pub trait LanguageModel {
    fn generate(&self, prompt: &str) -> Result<String, IntakeError>;
}

/// [`TextExtractor`] for PDFs backed by `pdf-extract`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, IntakeError> {
        let bytes = fs::read(path).map_err(|e| IntakeError::fs(path, e))?;

        // pdf-extract can panic on malformed fonts.
        match catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(&bytes))) {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(IntakeError::TextExtraction {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
            Err(_) => Err(IntakeError::TextExtraction {
                path: path.to_path_buf(),
                reason: "PDF reader panicked, likely malformed fonts".to_string(),
            }),
        }
    }
}

const RC_FIELDS: &[&str] = &[
    "Nom du projet",
    "Numéro du RC",
    "Description",
    "Date limite de soumission",
    "Adresse",
    "Visites obligatoires",
    "Objet de la consultation",
    "Votre lot",
    "Durée des marchés",
    "Contact de l'acheteur (Nom, Titre, Téléphone, Courriel)",
    "Acheteur",
];

pub fn rc_details_prompt(text: &str) -> String {
    let mut prompt = String::from("Extract the following detailed information from the text:\n");
    for (i, field) in RC_FIELDS.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, field));
    }
    prompt.push_str(&format!("\nText:\n{}", text));
    prompt
}

pub fn cr_synthesis_prompt(text: &str) -> String {
    format!(
        "Extract following detailed information from the text:\n\
         1. Synthèse des éléments pertinents :\n\
         2. Actions à prendre par SEF (Stores et Fermetures) :\n\
         Text:\n{}",
        text
    )
}

pub fn todo_prompt(text: &str) -> String {
    format!(
        "From the following text, generate a numbered list of To-Do items:\n\nText:\n{}\n\nTo-Do List:\n1. ",
        text
    )
}

/// Parses `label: value` lines; other lines are ignored.
pub fn parse_labeled_record(response: &str) -> LabeledRecord {
    response
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Non-blank lines, renumbered from 1.
pub fn parse_todo_list(response: &str) -> Vec<String> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item))
        .collect()
}

/// `<dir>/<pdf stem><suffix>`.
fn sibling_path(pdf: &Path, suffix: &str) -> PathBuf {
    let stem = pdf
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    pdf.with_file_name(format!("{}{}", stem, suffix))
}

/// Pretty JSON indented by four spaces, non-ASCII kept as is.
fn record_json(record: &LabeledRecord) -> Result<Vec<u8>, IntakeError> {
    let mut out = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = Serializer::with_formatter(&mut out, formatter);
    record.serialize(&mut serializer)?;
    Ok(out)
}

/// Writes `record` as pretty JSON to `<stem><suffix>` next to `pdf`.
pub fn write_record_json(
    record: &LabeledRecord,
    pdf: &Path,
    suffix: &str,
) -> Result<PathBuf, IntakeError> {
    let path = sibling_path(pdf, suffix);
    fs::write(&path, record_json(record)?).map_err(|e| IntakeError::fs(&path, e))?;
    Ok(path)
}

/// Writes the to-do list as a one-column CSV next to `pdf`.
pub fn write_todo_csv(items: &[String], pdf: &Path) -> Result<PathBuf, IntakeError> {
    let path = sibling_path(pdf, "_pdf_todo_list.csv");
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(["To-Do List"])?;
    for item in items {
        writer.write_record([item])?;
    }
    writer.flush().map_err(|e| IntakeError::fs(&path, e))?;
    Ok(path)
}

/// Files written for one analyzed document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedDocument {
    pub pdf: PathBuf,
    pub rc_details: PathBuf,
    pub cr_synthesis: PathBuf,
    pub todo_list: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub documents: Vec<AnalyzedDocument>,
    pub warnings: Vec<Warning>,
}

/// Analyze one PDF and write its three result files.
pub fn analyze_document(
    pdf: &Path,
    extractor: &dyn TextExtractor,
    model: &dyn LanguageModel,
) -> Result<AnalyzedDocument, IntakeError> {
    let text = extractor.extract_text(pdf)?;

    let rc = parse_labeled_record(&model.generate(&rc_details_prompt(&text))?);
    let rc_details = write_record_json(&rc, pdf, "_pdf_rc_analyzer.json")?;

    let cr = parse_labeled_record(&model.generate(&cr_synthesis_prompt(&text))?);
    let cr_synthesis = write_record_json(&cr, pdf, "_pdf_cr_synthes.json")?;

    let todo = parse_todo_list(&model.generate(&todo_prompt(&text))?);
    let todo_list = write_todo_csv(&todo, pdf)?;

    Ok(AnalyzedDocument {
        pdf: pdf.to_path_buf(),
        rc_details,
        cr_synthesis,
        todo_list,
    })
}

/// Analyze every PDF directly inside `matches_dir`, in name order.
pub fn analyze_matches(
    matches_dir: &Path,
    extractor: &dyn TextExtractor,
    model: &dyn LanguageModel,
) -> Result<AnalysisReport, IntakeError> {
    let mut pdfs: Vec<PathBuf> = fs::read_dir(matches_dir)
        .map_err(|e| IntakeError::fs(matches_dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_pdf(path))
        .collect();
    pdfs.sort();

    let mut report = AnalysisReport::default();
    for pdf in pdfs {
        match analyze_document(&pdf, extractor, model) {
            Ok(document) => {
                info!(pdf = %pdf.display(), "Analyzed document");
                report.documents.push(document);
            }
            Err(e) => {
                warn!(pdf = %pdf.display(), error = %e, "Cannot analyze document");
                report
                    .warnings
                    .push(Warning::new(WarningKind::Filesystem, &pdf, e.to_string()));
            }
        }
    }
    Ok(report)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::TempDir;

    struct FixedText(&'static str);

    impl TextExtractor for FixedText {
        fn extract_text(&self, path: &Path) -> Result<String, IntakeError> {
            if path.to_string_lossy().contains("broken") {
                return Err(IntakeError::TextExtraction {
                    path: path.to_path_buf(),
                    reason: "unreadable".to_string(),
                });
            }
            Ok(self.0.to_string())
        }
    }

    /// Answers by prompt kind and records every prompt.
    #[derive(Default)]
    struct ScriptedModel {
        prompts: RefCell<Vec<String>>,
    }

    impl LanguageModel for ScriptedModel {
        fn generate(&self, prompt: &str) -> Result<String, IntakeError> {
            self.prompts.borrow_mut().push(prompt.to_string());
            let answer = if prompt.starts_with("From the following text") {
                "Visiter le site\n\n  Déposer l'offre  \n"
            } else if prompt.contains("Nom du projet") {
                "Nom du projet: École Jules Ferry\nNuméro du RC: 2024-017\nbruit sans deux-points"
            } else {
                "Synthèse: volets roulants\nActions: chiffrer le lot 3"
            };
            Ok(answer.to_string())
        }
    }

    #[test]
    fn test_parse_labeled_record_splits_on_first_colon() {
        let record = parse_labeled_record("Adresse : 1 rue de Paris\nContact: Mme X: 06 00\nignored");
        assert_eq!(record.len(), 2);
        assert_eq!(record["Adresse"], "1 rue de Paris");
        assert_eq!(record["Contact"], "Mme X: 06 00");
    }

    #[test]
    fn test_record_json_four_space_indent() {
        let temp_dir = TempDir::new().unwrap();
        let pdf = temp_dir.path().join("RC.pdf");
        let record: LabeledRecord = [
            ("Acheteur".to_string(), "Mairie".to_string()),
            ("Durée des marchés".to_string(), "12 mois".to_string()),
        ]
        .into_iter()
        .collect();

        let path = write_record_json(&record, &pdf, "_pdf_rc_analyzer.json").unwrap();
        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "{\n    \"Acheteur\": \"Mairie\",\n    \"Durée des marchés\": \"12 mois\"\n}"
        );
    }

    #[test]
    fn test_parse_todo_list_renumbers() {
        let items = parse_todo_list("Lire le RC\n\n  Visiter le site \n");
        assert_eq!(items, vec!["1. Lire le RC", "2. Visiter le site"]);
    }

    #[test]
    fn test_rc_prompt_lists_fields() {
        let prompt = rc_details_prompt("TEXTE");
        assert!(prompt.contains("1. Nom du projet\n"));
        assert!(prompt.contains("11. Acheteur\n"));
        assert!(prompt.ends_with("Text:\nTEXTE"));
    }

    #[test]
    fn test_analyze_matches_writes_outputs() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("RC.pdf"), b"%PDF").unwrap();
        fs::write(dir.join("broken.PDF"), b"%PDF").unwrap();
        fs::write(dir.join("notes.txt"), b"skip").unwrap();

        let model = ScriptedModel::default();
        let report = analyze_matches(dir, &FixedText("contenu"), &model).unwrap();

        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(model.prompts.borrow().len(), 3);

        let doc = &report.documents[0];
        assert_eq!(doc.rc_details, dir.join("RC_pdf_rc_analyzer.json"));
        let rc: LabeledRecord =
            serde_json::from_str(&fs::read_to_string(&doc.rc_details).unwrap()).unwrap();
        assert_eq!(rc["Nom du projet"], "École Jules Ferry");
        assert_eq!(rc["Numéro du RC"], "2024-017");

        let cr: LabeledRecord =
            serde_json::from_str(&fs::read_to_string(&doc.cr_synthesis).unwrap()).unwrap();
        assert_eq!(cr["Actions"], "chiffrer le lot 3");

        let csv = fs::read_to_string(&doc.todo_list).unwrap();
        assert_eq!(csv, "To-Do List\n1. Visiter le site\n2. Déposer l'offre\n");
    }

    #[test]
    fn test_pdf_extractor_rejects_non_pdf() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fake.pdf");
        fs::write(&path, b"not a pdf at all").unwrap();
        assert!(matches!(
            PdfTextExtractor.extract_text(&path),
            Err(IntakeError::TextExtraction { .. })
        ));
    }
}
