use intake::{
    extract_archive, extract_nested, extract_recursive, ExtractOptions, IntakeError,
    ProgressEvent, WarningKind,
};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use walkdir::WalkDir;
use zip::write::{SimpleFileOptions, ZipWriter};

/// Helper to build a ZIP archive in memory
fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in files {
        if name.ends_with('/') {
            zip.add_directory(*name, SimpleFileOptions::default())
                .unwrap();
        } else {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content).unwrap();
        }
    }
    zip.finish().unwrap().into_inner()
}

/// Helper to write a TAR.GZ archive
fn create_tar_gz(path: &Path, files: &[(&str, &[u8])]) {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    let mut tar = tar::Builder::new(encoder);
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar.append_data(&mut header, name, &content[..]).unwrap();
    }
    tar.into_inner().unwrap().finish().unwrap();
}

/// Relative path -> contents of every file under `root`
fn tree(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
            (rel, fs::read(e.path()).unwrap())
        })
        .collect()
}

fn no_progress(_: &ProgressEvent<'_>) {}

/// `levels` archives nested in one another, the innermost holding `deep.txt`.
fn nested_chain(dir: &Path, levels: u32) -> PathBuf {
    let mut bytes = zip_bytes(&[("deep.txt", b"bottom")]);
    for level in (2..levels).rev() {
        let name = format!("level{}.zip", level + 1);
        bytes = zip_bytes(&[(name.as_str(), bytes.as_slice())]);
    }
    let name = "level2.zip";
    let outer = zip_bytes(&[(name, bytes.as_slice())]);
    let path = dir.join("level1.zip");
    fs::write(&path, outer).unwrap();
    path
}

/// `level2/level3/.../level{n}` under `root`.
fn chain_dir(root: &Path, last_level: u32) -> PathBuf {
    (2..=last_level).fold(root.to_path_buf(), |dir, level| {
        dir.join(format!("level{}", level))
    })
}

#[test]
fn test_extract_zip_byte_identical() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("dce.zip");
    let output_dir = temp_dir.path().join("output");

    let binary: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    fs::write(
        &archive_path,
        zip_bytes(&[
            ("RC.pdf", b"%PDF-1.4 consultation"),
            ("Lot 1/", b""),
            ("Lot 1/CCTP.pdf", binary.as_slice()),
            ("empty/", b""),
            ("Pièces/annexe é.txt", "données".as_bytes()),
        ]),
    )
    .unwrap();

    let outcome = extract_archive(
        &archive_path,
        &output_dir,
        &ExtractOptions::default(),
        &no_progress,
    )
    .unwrap();

    let expected: BTreeMap<PathBuf, Vec<u8>> = [
        ("RC.pdf", b"%PDF-1.4 consultation".to_vec()),
        ("Lot 1/CCTP.pdf", binary.clone()),
        ("Pièces/annexe é.txt", "données".as_bytes().to_vec()),
    ]
    .into_iter()
    .map(|(p, c)| (PathBuf::from(p), c))
    .collect();

    assert_eq!(tree(&output_dir), expected);
    assert_eq!(outcome.files.len(), 3);
    assert!(outcome.warnings.is_empty());
    assert!(output_dir.join("empty").is_dir());
    assert_eq!(
        outcome.bytes_written,
        expected.values().map(|c| c.len() as u64).sum::<u64>()
    );
}

#[test]
fn test_extract_tar_gz_basic() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("dce.tar.gz");
    let output_dir = temp_dir.path().join("output");

    create_tar_gz(
        &archive_path,
        &[("RC.pdf", b"Hello from TAR!"), ("sub/notes.txt", b"Nested in TAR")],
    );

    let report = extract_recursive(
        &archive_path,
        &output_dir,
        &ExtractOptions::default(),
        &no_progress,
    )
    .unwrap();

    assert_eq!(report.stats.archives_extracted, 1);
    assert_eq!(report.stats.files_extracted, 2);
    assert_eq!(
        fs::read_to_string(output_dir.join("RC.pdf")).unwrap(),
        "Hello from TAR!"
    );
    assert_eq!(
        fs::read_to_string(output_dir.join("sub/notes.txt")).unwrap(),
        "Nested in TAR"
    );
}

#[test]
fn test_extract_rejects_path_traversal_entry() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("evil.zip");
    let output_dir = temp_dir.path().join("output");

    fs::write(
        &archive_path,
        zip_bytes(&[
            ("../evil.txt", b"escaped"),
            ("safe/../../evil2.txt", b"escaped"),
            ("ok.txt", b"fine"),
        ]),
    )
    .unwrap();

    let outcome = extract_archive(
        &archive_path,
        &output_dir,
        &ExtractOptions::default(),
        &no_progress,
    )
    .unwrap();

    // Remaining entries are still extracted
    assert_eq!(fs::read_to_string(output_dir.join("ok.txt")).unwrap(), "fine");
    assert_eq!(outcome.files, vec![output_dir.join("ok.txt")]);

    // Nothing was written outside the root
    assert!(!temp_dir.path().join("evil.txt").exists());
    assert!(!temp_dir.path().join("evil2.txt").exists());

    let traversals = outcome
        .warnings
        .iter()
        .filter(|w| w.kind == WarningKind::PathTraversal)
        .count();
    assert_eq!(traversals, 2);
}

#[test]
fn test_extract_skips_symlink_entries() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("links.tar");
    let output_dir = temp_dir.path().join("output");

    let mut tar = tar::Builder::new(File::create(&archive_path).unwrap());
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Symlink);
    header.set_size(0);
    header.set_mode(0o777);
    header.set_link_name("../outside.txt").unwrap();
    header.set_cksum();
    tar.append_data(&mut header, "passwd", std::io::empty())
        .unwrap();

    let mut header = tar::Header::new_gnu();
    header.set_size(4);
    header.set_mode(0o644);
    header.set_cksum();
    tar.append_data(&mut header, "RC.pdf", &b"%PDF"[..]).unwrap();
    tar.finish().unwrap();
    drop(tar);

    let outcome = extract_archive(
        &archive_path,
        &output_dir,
        &ExtractOptions::default(),
        &no_progress,
    )
    .unwrap();

    assert!(output_dir.join("RC.pdf").exists());
    assert!(output_dir.join("passwd").symlink_metadata().is_err());
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].kind, WarningKind::UnsafeEntry);
}

#[test]
fn test_extract_duplicate_entries_are_renamed() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("dup.tar.gz");
    let output_dir = temp_dir.path().join("output");

    create_tar_gz(&archive_path, &[("RC.pdf", b"first"), ("RC.pdf", b"second")]);

    extract_archive(
        &archive_path,
        &output_dir,
        &ExtractOptions::default(),
        &no_progress,
    )
    .unwrap();

    assert_eq!(fs::read_to_string(output_dir.join("RC.pdf")).unwrap(), "first");
    assert_eq!(
        fs::read_to_string(output_dir.join("RC_2.pdf")).unwrap(),
        "second"
    );
}

#[test]
fn test_extract_corrupt_archive() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("bad.zip");
    let output_dir = temp_dir.path().join("output");
    fs::write(&archive_path, b"PK but not really a zip").unwrap();

    let result = extract_recursive(
        &archive_path,
        &output_dir,
        &ExtractOptions::default(),
        &no_progress,
    );

    assert!(matches!(result, Err(IntakeError::CorruptArchive { .. })));
    assert!(!output_dir.exists());
}

#[test]
fn test_extract_nonexistent_archive() {
    let temp_dir = TempDir::new().unwrap();
    let result = extract_recursive(
        &temp_dir.path().join("nonexistent.zip"),
        &temp_dir.path().join("output"),
        &ExtractOptions::default(),
        &no_progress,
    );

    match result.unwrap_err() {
        IntakeError::NotFound(_) => {}
        e => panic!("Expected NotFound error, got: {:?}", e),
    }
}

#[test]
fn test_extract_nested_archives_into_stem_directories() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("dce.zip");
    let output_dir = temp_dir.path().join("output");

    let inner = zip_bytes(&[("Reglement de consultation.pdf", b"rc")]);
    let mut tgz = Vec::new();
    {
        let staging = TempDir::new().unwrap();
        let path = staging.path().join("plans.tar.gz");
        create_tar_gz(&path, &[("plan.dwg", b"dwg")]);
        tgz.extend(fs::read(&path).unwrap());
    }

    fs::write(
        &archive_path,
        zip_bytes(&[
            ("pieces.zip", inner.as_slice()),
            ("Lot 2/plans.tar.gz", tgz.as_slice()),
            ("pieces/existing.txt", b"already here"),
        ]),
    )
    .unwrap();

    let report = extract_recursive(
        &archive_path,
        &output_dir,
        &ExtractOptions::default(),
        &no_progress,
    )
    .unwrap();

    assert_eq!(report.stats.archives_extracted, 3);
    assert!(report.warnings.is_empty());

    // `pieces/` was taken by an entry, so the nested archive got a suffixed directory
    assert!(output_dir.join("pieces/existing.txt").exists());
    assert_eq!(
        fs::read_to_string(output_dir.join("pieces_2/Reglement de consultation.pdf")).unwrap(),
        "rc"
    );
    // Expanded under the outer destination, not next to the archive
    assert_eq!(
        fs::read_to_string(output_dir.join("plans/plan.dwg")).unwrap(),
        "dwg"
    );
    assert!(output_dir.join("Lot 2/plans.tar.gz").is_file());
    assert!(!output_dir.join("Lot 2/plans").exists());

    // Nested archive files stay in place until purged
    assert!(output_dir.join("pieces.zip").exists());
}

#[test]
fn test_extract_nested_archive_in_subdirectory_lands_at_job_root() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("dce.zip");
    let output_dir = temp_dir.path().join("dce");

    let inner = zip_bytes(&[("RC.pdf", b"rc")]);
    fs::write(
        &archive_path,
        zip_bytes(&[("docs/inner.zip", inner.as_slice())]),
    )
    .unwrap();

    extract_recursive(
        &archive_path,
        &output_dir,
        &ExtractOptions::default(),
        &no_progress,
    )
    .unwrap();

    let files: Vec<PathBuf> = tree(&output_dir).into_keys().collect();
    assert_eq!(
        files,
        vec![PathBuf::from("docs/inner.zip"), PathBuf::from("inner/RC.pdf")]
    );
}

#[test]
fn test_extract_depth_budget_exceeded() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = nested_chain(temp_dir.path(), 11);
    let output_dir = temp_dir.path().join("output");

    let options = ExtractOptions {
        depth_budget: 10,
        ..Default::default()
    };
    let report = extract_recursive(&archive_path, &output_dir, &options, &no_progress).unwrap();

    assert_eq!(report.stats.archives_extracted, 10);

    let tenth = chain_dir(&output_dir, 10);
    assert!(tenth.join("level11.zip").is_file());
    assert!(!tenth.join("level11").exists());
    assert!(!tree(&output_dir).keys().any(|p| p.ends_with("deep.txt")));

    let exceeded: Vec<_> = report
        .warnings
        .iter()
        .filter(|w| w.kind == WarningKind::DepthExceeded)
        .collect();
    assert_eq!(exceeded.len(), 1);
    assert_eq!(exceeded[0].path, tenth.join("level11.zip"));
}

#[test]
fn test_extract_depth_budget_sufficient() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = nested_chain(temp_dir.path(), 11);
    let output_dir = temp_dir.path().join("output");

    let options = ExtractOptions {
        depth_budget: 11,
        ..Default::default()
    };
    let report = extract_recursive(&archive_path, &output_dir, &options, &no_progress).unwrap();

    assert_eq!(report.stats.archives_extracted, 11);
    assert!(report.warnings.is_empty());
    assert_eq!(
        fs::read_to_string(chain_dir(&output_dir, 11).join("deep.txt")).unwrap(),
        "bottom"
    );
}

#[test]
fn test_extract_nested_with_zero_budget_keeps_nested_archive() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = nested_chain(temp_dir.path(), 3);
    let output_dir = temp_dir.path().join("output");

    let report = extract_nested(
        &archive_path,
        &output_dir,
        0,
        &ExtractOptions::default(),
        &no_progress,
    )
    .unwrap();

    assert_eq!(report.stats.archives_extracted, 1);
    assert!(output_dir.join("level2.zip").is_file());
    assert!(!output_dir.join("level2").exists());
    assert_eq!(report.warnings[0].kind, WarningKind::DepthExceeded);
}

#[test]
fn test_extract_corrupt_nested_archive_is_isolated() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("dce.zip");
    let output_dir = temp_dir.path().join("output");

    let good = zip_bytes(&[("RC.pdf", b"rc")]);
    fs::write(
        &archive_path,
        zip_bytes(&[
            ("bad.zip", b"garbage"),
            ("good.zip", good.as_slice()),
            ("notes.txt", b"notes"),
        ]),
    )
    .unwrap();

    let report = extract_recursive(
        &archive_path,
        &output_dir,
        &ExtractOptions::default(),
        &no_progress,
    )
    .unwrap();

    assert_eq!(report.stats.archives_extracted, 2);
    assert!(output_dir.join("good/RC.pdf").exists());
    assert!(output_dir.join("notes.txt").exists());
    assert!(output_dir.join("bad.zip").exists());
    assert!(!output_dir.join("bad").exists());

    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].kind, WarningKind::CorruptArchive);
    assert_eq!(report.warnings[0].path, output_dir.join("bad.zip"));
}

#[test]
fn test_extract_with_size_limit() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("big.zip");
    let output_dir = temp_dir.path().join("output");
    fs::write(
        &archive_path,
        zip_bytes(&[("a.txt", b"0123456789"), ("b.txt", b"0123456789")]),
    )
    .unwrap();

    let options = ExtractOptions {
        size_limit_bytes: Some(15),
        ..Default::default()
    };
    let result = extract_recursive(&archive_path, &output_dir, &options, &no_progress);

    match result.unwrap_err() {
        IntakeError::SizeLimitExceeded { limit, .. } => assert_eq!(limit, 15),
        e => panic!("Expected SizeLimitExceeded error, got: {:?}", e),
    }
}

#[test]
fn test_extract_progress_callback() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("dce.zip");
    let output_dir = temp_dir.path().join("output");
    fs::write(
        &archive_path,
        zip_bytes(&[("a.txt", b"a"), ("b.txt", b"b")]),
    )
    .unwrap();

    let started = Arc::new(AtomicUsize::new(0));
    let entries = Arc::new(AtomicUsize::new(0));
    let (started_clone, entries_clone) = (started.clone(), entries.clone());
    let progress_cb = move |event: &ProgressEvent<'_>| match event {
        ProgressEvent::ArchiveStarted { .. } => {
            started_clone.fetch_add(1, Ordering::Relaxed);
        }
        ProgressEvent::EntryExtracted { .. } => {
            entries_clone.fetch_add(1, Ordering::Relaxed);
        }
        _ => {}
    };

    extract_recursive(
        &archive_path,
        &output_dir,
        &ExtractOptions::default(),
        &progress_cb,
    )
    .unwrap();

    assert_eq!(started.load(Ordering::Relaxed), 1);
    assert_eq!(entries.load(Ordering::Relaxed), 2);
}
