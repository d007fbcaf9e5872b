//! Command-line interface for the RC intake pipeline.
//!
//! Runs the full intake on an uploaded archive, or any single stage of it,
//! from the command line.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use intake::analyze::{PdfTextExtractor, TextExtractor};
use intake::{
    bundle_dir, collect_matches, extract_recursive, new_upload_id, probe, purge_archives,
    BundleSummary, ExtractOptions, ExtractReport, Pipeline, PipelineConfig, ProgressEvent, RuleSet,
    Warning,
};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rc-intake")]
#[command(version, about = "Unpack tender archives and collect RC documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole intake on an uploaded archive
    Run {
        /// Uploaded archive
        upload: PathBuf,

        /// Working directory holding uploads/, unzipped/ and matches/
        #[arg(short, long)]
        workspace: PathBuf,

        /// Use a fresh subdirectory of the workspace for this upload
        #[arg(long)]
        per_upload: bool,

        /// Maximum number of archive levels to expand
        #[arg(long, default_value = "10")]
        depth_budget: u32,

        /// Size limit in bytes per top-level archive
        #[arg(long)]
        size_limit: Option<u64>,

        /// Filename keyword (repeatable); defaults to the built-in list
        #[arg(long = "keyword")]
        keywords: Vec<String>,

        /// Also write unzipped_files.zip and rc_files.zip into this directory
        #[arg(long)]
        bundle: Option<PathBuf>,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract one or more archives, nested archives included
    Extract {
        /// Archive files to extract
        #[arg(required = true)]
        archives: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        out: PathBuf,

        /// Maximum number of archive levels to expand
        #[arg(long, default_value = "10")]
        depth_budget: u32,

        /// Size limit in bytes per archive
        #[arg(long)]
        size_limit: Option<u64>,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Probe archive metadata
    Probe {
        /// Archive file to probe
        archive: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Copy RC documents from a tree into a collection directory
    Classify {
        /// Tree to search
        source: PathBuf,

        /// Collection directory
        #[arg(short, long)]
        out: PathBuf,

        /// Filename keyword (repeatable); defaults to the built-in list
        #[arg(long = "keyword")]
        keywords: Vec<String>,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete archive files from a tree
    Purge {
        /// Tree to clean
        dir: PathBuf,
    },

    /// Pack a directory into a ZIP file
    Bundle {
        /// Directory to pack
        dir: PathBuf,

        /// ZIP file to write
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Print the text of a PDF
    Text {
        /// PDF file
        pdf: PathBuf,
    },
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            upload,
            workspace,
            per_upload,
            depth_budget,
            size_limit,
            keywords,
            bundle,
            json,
        } => handle_run(
            &upload,
            &workspace,
            per_upload,
            extract_options(depth_budget, size_limit),
            keywords,
            bundle.as_deref(),
            json,
        ),
        Commands::Extract {
            archives,
            out,
            depth_budget,
            size_limit,
            json,
        } => handle_extract(&archives, &out, &extract_options(depth_budget, size_limit), json),
        Commands::Probe { archive, json } => handle_probe(&archive, json),
        Commands::Classify {
            source,
            out,
            keywords,
            json,
        } => handle_classify(&source, &out, &keywords, json),
        Commands::Purge { dir } => handle_purge(&dir),
        Commands::Bundle { dir, out } => handle_bundle(&dir, &out),
        Commands::Text { pdf } => handle_text(&pdf),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn extract_options(depth_budget: u32, size_limit: Option<u64>) -> ExtractOptions {
    ExtractOptions {
        depth_budget,
        size_limit_bytes: size_limit,
    }
}

fn spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Progress observer drawing on a spinner.
fn observer(bar: ProgressBar) -> impl Fn(&ProgressEvent<'_>) + Send + Sync + 'static {
    move |event: &ProgressEvent<'_>| match event {
        ProgressEvent::ArchiveStarted { archive, .. } => {
            bar.set_message(format!("Extracting {}", archive.display()))
        }
        ProgressEvent::EntryExtracted { path, .. } => {
            bar.set_message(format!("{}", path.display()))
        }
        ProgressEvent::ArchiveRemoved { path } => {
            bar.set_message(format!("Deleted {}", path.display()))
        }
        ProgressEvent::FileMatched { destination, .. } => {
            bar.println(format!("Collected {}", destination.display()))
        }
    }
}

fn print_warnings(warnings: &[Warning]) {
    if warnings.is_empty() {
        return;
    }
    println!("Could not process {} item(s):", warnings.len());
    for warning in warnings {
        println!(
            "  [{:?}] {}: {}",
            warning.kind,
            warning.path.display(),
            warning.detail
        );
    }
}

fn handle_run(
    upload: &Path,
    workspace: &Path,
    per_upload: bool,
    options: ExtractOptions,
    keywords: Vec<String>,
    bundle: Option<&Path>,
    json: bool,
) -> CliResult {
    let mut config = if per_upload {
        PipelineConfig::for_upload(workspace, &new_upload_id())
    } else {
        PipelineConfig::under(workspace)
    };
    config.extract = options;
    config.keywords = keywords;

    let pipeline = Pipeline::new(config);
    tracing::debug!(config = ?pipeline.config(), "Pipeline configured");
    let bar = spinner();
    let report = pipeline.run(upload, &observer(bar.clone()));
    bar.finish_and_clear();
    let report = report?;
    let bundles = match bundle {
        Some(out_dir) => pipeline.bundle(out_dir)?,
        None => Vec::new(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Extracted {} archive(s), {} file(s), {} bytes",
        report.extraction.archives_extracted,
        report.extraction.files_extracted,
        report.extraction.bytes_written
    );
    println!("Deleted {} archive file(s)", report.purged.len());
    println!(
        "Collected {} document(s) into {}",
        report.matches.len(),
        pipeline.config().matches_dir.display()
    );
    for summary in &bundles {
        print_bundle(summary);
    }
    print_warnings(&report.warnings);
    Ok(())
}

fn handle_extract(
    archives: &[PathBuf],
    out: &Path,
    options: &ExtractOptions,
    json: bool,
) -> CliResult {
    let bar = spinner();
    let progress_cb = observer(bar.clone());
    let mut report = ExtractReport::default();

    for archive in archives {
        let stem = intake::format::archive_stem(archive);
        match extract_recursive(archive, &out.join(stem), options, &progress_cb) {
            Ok(extracted) => report.merge(extracted),
            Err(e) => report.warnings.push(Warning::from_error(archive, &e)),
        }
    }
    bar.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Extracted {} archive(s), {} file(s), {} bytes in {:.2?}",
        report.stats.archives_extracted,
        report.stats.files_extracted,
        report.stats.bytes_written,
        report.stats.duration
    );
    print_warnings(&report.warnings);
    Ok(())
}

fn handle_probe(archive: &Path, json: bool) -> CliResult {
    let info = probe(archive)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Format:  {}", info.format);
    println!("Entries: {}", info.entries);
    if let Some(bytes) = info.uncompressed_estimate {
        println!("Size:    {} bytes uncompressed", bytes);
    }
    for entry in &info.entry_list {
        let marker = if entry.is_directory { "d" } else { "-" };
        println!("  {} {:>12} {}", marker, entry.size, entry.path);
    }
    Ok(())
}

fn handle_classify(source: &Path, out: &Path, keywords: &[String], json: bool) -> CliResult {
    let rules = RuleSet::rc_documents(keywords)?;
    let bar = spinner();
    let report = collect_matches(source, out, &rules, &observer(bar.clone()));
    bar.finish_and_clear();
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for outcome in &report.outcomes {
        let note = if outcome.renamed { " (renamed)" } else { "" };
        println!(
            "{} -> {}{}",
            outcome.source.display(),
            outcome.destination.display(),
            note
        );
    }
    print_warnings(&report.warnings);
    Ok(())
}

fn handle_purge(dir: &Path) -> CliResult {
    let bar = spinner();
    let report = purge_archives(dir, &observer(bar.clone()));
    bar.finish_and_clear();

    println!("Deleted {} archive file(s)", report.removed.len());
    print_warnings(&report.warnings);
    Ok(())
}

fn print_bundle(summary: &BundleSummary) {
    println!(
        "Bundled {} file(s), {} bytes into {}",
        summary.files,
        summary.bytes,
        summary.archive.display()
    );
}

fn handle_bundle(dir: &Path, out: &Path) -> CliResult {
    let summary = bundle_dir(dir, out)?;
    print_bundle(&summary);
    Ok(())
}

fn handle_text(pdf: &Path) -> CliResult {
    let text = PdfTextExtractor.extract_text(pdf)?;
    println!("{}", text);
    Ok(())
}
