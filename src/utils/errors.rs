//! Custom error types for the backup engine.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Paths overlap: {from_path} and {destination}")]
    PathOverlap {
        from_path: PathBuf,
        destination: PathBuf,
    },

    #[error("Source directory not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackupError {
    /// True for the cancellation variant; the CLI maps this to exit 130.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BackupError::Cancelled)
    }
}

/// A worker that panicked or was aborted surfaces as an IO failure
impl From<tokio::task::JoinError> for BackupError {
    fn from(e: tokio::task::JoinError) -> Self {
        BackupError::Io(std::io::Error::other(e))
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

/// Record the first meaningful error from a pool of workers. A real
/// failure beats the `Cancelled` results it caused in its peers.
pub(crate) fn keep_first(slot: &mut Option<BackupError>, err: BackupError) {
    match slot {
        None => *slot = Some(err),
        Some(BackupError::Cancelled) if !err.is_cancelled() => *slot = Some(err),
        Some(_) => {}
    }
}
