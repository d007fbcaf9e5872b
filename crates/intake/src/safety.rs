//! Path safety for extraction and collection.
//!
//! Archive entry names are untrusted input: they are validated and resolved
//! lexically against the destination root before anything is written (zip-slip
//! protection). Destination names that already exist are never overwritten;
//! a numeric suffix is chosen instead.

use crate::error::SecurityError;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Upper bound on suffix probing before giving up on a name.
const MAX_SUFFIX: u32 = 10_000;

/// Entry type for filtering special file types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
    /// Hard link
    Hardlink,
    /// Other special file types (device, fifo, etc.)
    Other,
}

/// Only regular files and directories are ever materialized.
pub fn is_extractable(entry_type: EntryType) -> bool {
    matches!(entry_type, EntryType::File | EntryType::Directory)
}

/// Validates and normalizes an archive entry path.
///
/// Rejects absolute paths, drive prefixes, any `..` component and invalid
/// UTF-8; drops `.` components and redundant separators.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use intake::safety::validate_entry_path;
///
/// let safe_path = validate_entry_path(Path::new("./dir/RC.pdf")).unwrap();
/// assert_eq!(safe_path, Path::new("dir/RC.pdf"));
///
/// assert!(validate_entry_path(Path::new("../../etc/passwd")).is_err());
/// assert!(validate_entry_path(Path::new("/etc/passwd")).is_err());
/// ```
pub fn validate_entry_path(path: &Path) -> Result<PathBuf, SecurityError> {
    if path.is_absolute() || path.has_root() {
        return Err(SecurityError::AbsolutePath(path.display().to_string()));
    }

    let path_str = path.to_str().ok_or_else(|| {
        SecurityError::PathTraversal("Path contains invalid UTF-8 characters".to_string())
    })?;

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => continue,
            Component::ParentDir => {
                return Err(SecurityError::PathTraversal(format!(
                    "Path contains '..' component: {}",
                    path_str
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(SecurityError::AbsolutePath(path_str.to_string()));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(SecurityError::PathTraversal(
            "Path normalizes to empty".to_string(),
        ));
    }

    Ok(normalized)
}

/// Resolves an archive entry path under `root`.
///
/// The result is guaranteed to be lexically contained in `root`.
pub fn resolve(root: &Path, entry_path: &Path) -> Result<PathBuf, SecurityError> {
    let relative = validate_entry_path(entry_path)?;
    let resolved = root.join(relative);
    if !resolved.starts_with(root) {
        return Err(SecurityError::PathTraversal(format!(
            "{} escapes {}",
            entry_path.display(),
            root.display()
        )));
    }
    Ok(resolved)
}

/// Returns a path in `dir` named `file_name` that does not exist yet.
///
/// On collision the stem is suffixed (`report.pdf` → `report_2.pdf`,
/// `report_3.pdf`, …). The filesystem is consulted on every call.
pub fn unique_destination(dir: &Path, file_name: &str) -> io::Result<PathBuf> {
    let candidate = dir.join(file_name);
    if !exists(&candidate) {
        return Ok(candidate);
    }

    let (stem, extension) = split_extension(file_name);
    first_free(|n| match extension {
        Some(ext) => dir.join(format!("{}_{}.{}", stem, n, ext)),
        None => dir.join(format!("{}_{}", stem, n)),
    })
}

/// Returns a path in `parent` named `name` that does not exist yet,
/// suffixing the whole name (`bundle` → `bundle_2`).
pub fn unique_directory(parent: &Path, name: &str) -> io::Result<PathBuf> {
    let candidate = parent.join(name);
    if !exists(&candidate) {
        return Ok(candidate);
    }
    first_free(|n| parent.join(format!("{}_{}", name, n)))
}

/// Checks if the current extracted size exceeds the configured limit.
///
/// ```
/// use intake::safety::check_size_limits;
///
/// assert!(check_size_limits(1000, Some(2000)).is_ok());
/// assert!(check_size_limits(3000, Some(2000)).is_err());
/// assert!(check_size_limits(999_999_999, None).is_ok());
/// ```
pub fn check_size_limits(current_bytes: u64, limit: Option<u64>) -> Result<(), u64> {
    match limit {
        Some(max_bytes) if current_bytes > max_bytes => Err(max_bytes),
        _ => Ok(()),
    }
}

fn first_free(candidate: impl Fn(u32) -> PathBuf) -> io::Result<PathBuf> {
    (2..=MAX_SUFFIX)
        .map(candidate)
        .find(|path| !exists(path))
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AlreadyExists,
                "Could not find unique filename",
            )
        })
}

// Broken symlinks count as taken.
fn exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Splits at the last dot, leaving leading-dot names whole (`.env` has no extension).
fn split_extension(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rfind('.') {
        Some(idx) if file_name[..idx].trim_start_matches('.').is_empty() => (file_name, None),
        Some(idx) => (&file_name[..idx], Some(&file_name[idx + 1..])),
        None => (file_name, None),
    }
}
