//! Archive recognition by file name.

use std::fmt;
use std::path::Path;

/// Containers the extractor can expand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
    TarBz2,
}

/// Lowercase suffixes and the format they denote; longest first.
const SUFFIXES: &[(&str, ArchiveFormat)] = &[
    (".tar.bz2", ArchiveFormat::TarBz2),
    (".tar.gz", ArchiveFormat::TarGz),
    (".tbz2", ArchiveFormat::TarBz2),
    (".tbz", ArchiveFormat::TarBz2),
    (".tgz", ArchiveFormat::TarGz),
    (".tar", ArchiveFormat::Tar),
    (".zip", ArchiveFormat::Zip),
];

impl ArchiveFormat {
    /// Detects the format from the file name, case-insensitively.
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_lowercase();
        SUFFIXES
            .iter()
            .find(|(suffix, _)| name.len() > suffix.len() && name.ends_with(suffix))
            .map(|(_, format)| *format)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "ZIP",
            ArchiveFormat::Tar => "TAR",
            ArchiveFormat::TarGz => "TAR.GZ",
            ArchiveFormat::TarBz2 => "TAR.BZ2",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether `path` names an archive this crate expands.
pub fn is_archive(path: &Path) -> bool {
    ArchiveFormat::detect(path).is_some()
}

/// File name with the archive suffix removed (`lot1.tar.gz` → `lot1`).
///
/// Falls back to the plain file stem for unrecognized names.
pub fn archive_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let lower = name.to_lowercase();

    for (suffix, _) in SUFFIXES {
        if lower.len() > suffix.len() && lower.ends_with(suffix) {
            // Suffixes are ASCII, so byte lengths agree between `name` and `lower`.
            if let Some(stem) = name.get(..name.len() - suffix.len()) {
                return stem.to_string();
            }
        }
    }

    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_detect_format() {
        assert_eq!(ArchiveFormat::detect(Path::new("a.zip")), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::detect(Path::new("A.ZIP")), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::detect(Path::new("a.tar")), Some(ArchiveFormat::Tar));
        assert_eq!(
            ArchiveFormat::detect(Path::new("dir/a.tar.gz")),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(ArchiveFormat::detect(Path::new("a.tgz")), Some(ArchiveFormat::TarGz));
        assert_eq!(
            ArchiveFormat::detect(Path::new("a.tar.bz2")),
            Some(ArchiveFormat::TarBz2)
        );
    }

    #[test]
    fn test_detect_format_unsupported() {
        assert_eq!(ArchiveFormat::detect(Path::new("a.pdf")), None);
        assert_eq!(ArchiveFormat::detect(Path::new("a.gz")), None);
        assert_eq!(ArchiveFormat::detect(Path::new("a.7z")), None);
        assert_eq!(ArchiveFormat::detect(Path::new(".zip")), None);
        assert!(!is_archive(&PathBuf::from("zipcode.txt")));
    }

    #[test]
    fn test_archive_stem() {
        assert_eq!(archive_stem(Path::new("dce/lot1.zip")), "lot1");
        assert_eq!(archive_stem(Path::new("Lot 2.TAR.GZ")), "Lot 2");
        assert_eq!(archive_stem(Path::new("pièces.v2.zip")), "pièces.v2");
        assert_eq!(archive_stem(Path::new("notes.txt")), "notes");
    }
}
