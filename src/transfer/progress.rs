//! Progress reporting for backup operations.
//!
//! The executor posts one sample per completed operation onto an unbounded
//! channel; consumers may coalesce samples and must tolerate updates that
//! arrive after the final result is delivered on its own channel.

use std::fmt;
use tokio::sync::mpsc;

/// Execution phase a progress sample belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupPhase {
    Preparing,
    CreatingDirectories,
    CopyingFiles,
    OverwritingFiles,
    DeletingFiles,
    DeletingDirectories,
}

impl fmt::Display for BackupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BackupPhase::Preparing => "Preparing",
            BackupPhase::CreatingDirectories => "Creating directories",
            BackupPhase::CopyingFiles => "Copying files",
            BackupPhase::OverwritingFiles => "Overwriting files",
            BackupPhase::DeletingFiles => "Deleting files",
            BackupPhase::DeletingDirectories => "Deleting directories",
        };
        f.write_str(label)
    }
}

/// One progress sample: phase plus cumulative operation counts
#[derive(Debug, Clone, Copy)]
pub struct BackupProgress {
    pub phase: BackupPhase,
    pub processed: u32,
    pub total: u32,
}

impl BackupProgress {
    /// Percentage complete (0-100)
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.processed as f64 / self.total as f64) * 100.0
        }
    }
}

/// One-way, back-pressure-less progress stream
pub type ProgressSender = mpsc::UnboundedSender<BackupProgress>;

/// Post a sample to an optional reporter. A closed or absent receiver is
/// not an error; progress is advisory.
pub fn report(sender: Option<&ProgressSender>, progress: BackupProgress) {
    if let Some(tx) = sender {
        let _ = tx.send(progress);
    }
}

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
