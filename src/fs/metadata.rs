//! File metadata capture for snapshot construction.

use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Size and last-write time of a file
#[derive(Debug, Clone, Copy)]
pub struct FileMetadata {
    /// File size in bytes
    pub len: u64,

    /// Last modified time (UTC)
    pub modified: SystemTime,
}

impl FileMetadata {
    /// Stat a file. Symlinks are followed, so a link reports its target.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        Ok(Self {
            len: metadata.len(),
            modified: metadata.modified()?,
        })
    }
}
