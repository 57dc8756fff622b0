//! Directory-Tree Backup Engine
//!
//! Reconciles a destination tree against a source tree under one of three
//! policies (sync, add, remove), executing the resulting plan concurrently
//! with progress reporting and cooperative cancellation.

pub mod config;
pub mod executor;
pub mod fs;
pub mod sync;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::{BackupOptions, Config};
pub use executor::{BackupEngine, BackupRequest, BackupResult};
pub use fs::path::{CasePolicy, RelativePath};
pub use sync::plan::BackupPlan;
pub use sync::snapshot::{FileEntry, Snapshot};
pub use sync::BackupMode;
pub use transfer::progress::{BackupPhase, BackupProgress, ProgressSender};
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
