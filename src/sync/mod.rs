//! Snapshot capture, plan construction and overwrite detection.

pub mod detect;
pub mod plan;
pub mod snapshot;

use crate::utils::errors::BackupError;
use std::fmt;
use std::str::FromStr;

/// Reconciliation policy for a backup run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupMode {
    /// Make the destination mirror the source exactly
    Sync,
    /// Copy what is missing, never touch what the destination already has
    Add,
    /// Delete destination entries that the source no longer has
    Remove,
}

impl BackupMode {
    /// Modes that create directories and copy files
    pub fn writes(self) -> bool {
        matches!(self, BackupMode::Sync | BackupMode::Add)
    }

    /// Modes that delete extra files and directories
    pub fn deletes(self) -> bool {
        matches!(self, BackupMode::Sync | BackupMode::Remove)
    }
}

impl fmt::Display for BackupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupMode::Sync => f.write_str("sync"),
            BackupMode::Add => f.write_str("add"),
            BackupMode::Remove => f.write_str("remove"),
        }
    }
}

impl FromStr for BackupMode {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" => Ok(BackupMode::Sync),
            "add" => Ok(BackupMode::Add),
            "remove" => Ok(BackupMode::Remove),
            other => Err(BackupError::InvalidArgument(format!(
                "unknown mode '{other}', expected sync, add or remove"
            ))),
        }
    }
}
