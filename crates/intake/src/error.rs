//! Error types for intake operations.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for intake operations.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// File not found at the specified path.
    #[error("Not found: {0}")]
    NotFound(PathBuf),

    /// The archive format is not supported.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The archive container is unreadable or malformed.
    #[error("Corrupt archive {path}: {reason}")]
    CorruptArchive {
        /// Archive that could not be read
        path: PathBuf,
        /// Reason reported by the decoder
        reason: String,
    },

    /// A security violation was detected during extraction.
    #[error("Security violation: {0}")]
    Security(#[from] SecurityError),

    /// A nested archive lies beyond the configured depth budget.
    #[error("Depth budget exhausted, not expanding {path}")]
    DepthExceeded {
        /// Nested archive left in place
        path: PathBuf,
    },

    /// The extraction size limit was exceeded.
    #[error("Size limit exceeded: {current} bytes > {limit} bytes")]
    SizeLimitExceeded {
        /// Current extracted size in bytes
        current: u64,
        /// Configured size limit in bytes
        limit: u64,
    },

    /// An I/O failure tied to a specific file.
    #[error("Filesystem error on {path}: {source}")]
    Filesystem {
        /// File or directory the operation failed on
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The pipeline's directories are laid out unsafely.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A filename pattern failed to compile.
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Text could not be extracted from a document.
    #[error("Text extraction failed for {path}: {reason}")]
    TextExtraction {
        /// Document being read
        path: PathBuf,
        /// Reason reported by the reader
        reason: String,
    },

    /// The language model collaborator failed.
    #[error("Language model error: {0}")]
    Model(String),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl IntakeError {
    /// Wraps an I/O error with the path it occurred on.
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Security-related errors during extraction.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Path traversal attempt detected (e.g., "../../../etc/passwd").
    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    /// Absolute path not allowed in archive entries.
    #[error("Absolute path not allowed: {0}")]
    AbsolutePath(String),

    /// Unsafe entry type detected (e.g., symlink).
    #[error("Unsafe entry type: {0}")]
    UnsafeEntryType(String),
}
