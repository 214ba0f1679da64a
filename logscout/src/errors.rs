/// Error types for logscout.
///
/// Errors fall into two families. Fatal errors (`Configuration`, `DuplicateName`, `Pattern`,
/// `ConfigLoad`, `ThreadPool`) are raised before any file is dispatched and propagate to the
/// caller as `Err`. Per-file errors (`RemoteFetch`, `CorruptArchive`, `Decode`, `FileNotFound`,
/// `PermissionDenied`, `Io`, `Cancelled`) are caught by the scheduler and recorded as a
/// [`FileFailure`](crate::results::FileFailure) on that file's stats, so a scan with unreachable
/// sources still returns `Ok` with partial data.
///
/// ```rust,ignore
/// match scanner.scan() {
///     Ok(report) if report.failures.is_empty() => // every file scanned,
///     Ok(report) => // partial data, inspect report.failures,
///     Err(e) => // misconfigured, nothing was scanned
/// }
/// ```
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for scan operations
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors that can occur while configuring or running a scan
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(#[from] config::ConfigError),
    #[error("Duplicate regex name: {0}")]
    DuplicateName(String),
    #[error("Invalid pattern for regex '{name}': {reason}")]
    Pattern { name: String, reason: String },
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Remote fetch of {host}:{path} failed after {attempts} attempt(s): {reason}")]
    RemoteFetch {
        host: String,
        path: PathBuf,
        attempts: u32,
        reason: String,
    },
    #[error("Corrupt gzip stream in {path}: {reason}")]
    CorruptArchive { path: PathBuf, reason: String },
    #[error("Invalid UTF-8 on line {line_number}")]
    Decode { line_number: usize },
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Scan cancelled")]
    Cancelled,
}

/// Coarse classification of a [`ScanError`], carried in scan reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    DuplicateName,
    Pattern,
    RemoteFetch,
    CorruptArchive,
    Decode,
    Io,
    Cancelled,
}

impl ErrorKind {
    /// Fatal kinds abort a run before dispatch; the rest are recorded per file
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::Configuration | ErrorKind::DuplicateName | ErrorKind::Pattern
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::DuplicateName => "duplicate name",
            ErrorKind::Pattern => "pattern",
            ErrorKind::RemoteFetch => "remote fetch",
            ErrorKind::CorruptArchive => "corrupt archive",
            ErrorKind::Decode => "decode",
            ErrorKind::Io => "io",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

impl ScanError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName(name.into())
    }

    pub fn invalid_pattern(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::Pattern {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn corrupt_archive(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::CorruptArchive {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn remote_fetch(
        host: impl Into<String>,
        path: impl Into<PathBuf>,
        attempts: u32,
        reason: impl ToString,
    ) -> Self {
        Self::RemoteFetch {
            host: host.into(),
            path: path.into(),
            attempts,
            reason: reason.to_string(),
        }
    }

    /// Maps an open/read failure on a local path to the matching variant
    pub fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound(path.into()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.into()),
            _ => Self::Io(err),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::Configuration(_) | ScanError::ConfigLoad(_) | ScanError::ThreadPool(_) => {
                ErrorKind::Configuration
            }
            ScanError::DuplicateName(_) => ErrorKind::DuplicateName,
            ScanError::Pattern { .. } => ErrorKind::Pattern,
            ScanError::RemoteFetch { .. } => ErrorKind::RemoteFetch,
            ScanError::CorruptArchive { .. } => ErrorKind::CorruptArchive,
            ScanError::Decode { .. } => ErrorKind::Decode,
            ScanError::FileNotFound(_) | ScanError::PermissionDenied(_) | ScanError::Io(_) => {
                ErrorKind::Io
            }
            ScanError::Cancelled => ErrorKind::Cancelled,
        }
    }
}
