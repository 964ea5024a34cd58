//! Error type shared by the change detector, loader and reconciler.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by docsync components.
///
/// CLI and configuration glue wrap these in `anyhow`; component APIs return
/// them directly so callers can match on the policy each variant implies.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A file could not be read. Hashing treats this as "unchanged";
    /// loading aborts only the one file.
    #[error("cannot read {path}: {source}")]
    TransientIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No loader handles the file's extension.
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(PathBuf),

    /// Known extension, unreadable contents.
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// The hash map could not be read or written.
    #[error("hash store persistence failed for {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The index store is unreachable or a query failed.
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),

    /// The embedding backend failed or returned a malformed batch.
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("invalid scan type '{0}' (expected full, modify, remove or reset)")]
    InvalidScanType(String),

    #[error("config error: {0}")]
    Config(String),

    /// The OS notification backend could not be set up.
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
}

impl SyncError {
    /// Wrap an index store failure, keeping the full error chain in the
    /// message.
    pub fn index(err: anyhow::Error) -> Self {
        SyncError::IndexUnavailable(format!("{:#}", err))
    }

    pub fn embedding(err: anyhow::Error) -> Self {
        SyncError::Embedding(format!("{:#}", err))
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        SyncError::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// True for per-file loader failures that a folder-wide scan skips.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            SyncError::TransientIo { .. }
                | SyncError::UnsupportedFormat(_)
                | SyncError::Parse { .. }
        )
    }
}
