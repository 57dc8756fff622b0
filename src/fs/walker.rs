//! Recursive directory enumeration.
//!
//! Wraps `walkdir` with the enumeration policy the engine needs: symlinks
//! are surfaced as regular files (by resolving the target), and entries
//! that cannot be read are either skipped or fail the walk depending on
//! `WalkOptions`.

use crate::utils::errors::Result;
use std::path::Path;
use walkdir::WalkDir;

/// Options for directory walking
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Skip entries that cannot be read instead of failing the walk
    pub skip_inaccessible: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            skip_inaccessible: true,
        }
    }
}

/// Visit every directory strictly below `root` (the root itself is not
/// reported). Symlinks to directories are not followed.
pub fn enumerate_directories<F>(root: &Path, options: &WalkOptions, mut visit: F) -> Result<()>
where
    F: FnMut(&Path) -> Result<()>,
{
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if options.skip_inaccessible => {
                tracing::debug!("Skipping inaccessible entry: {}", e);
                continue;
            }
            Err(e) => return Err(std::io::Error::from(e).into()),
        };

        if entry.depth() == 0 || !entry.file_type().is_dir() {
            continue;
        }

        visit(entry.path())?;
    }

    Ok(())
}

/// Visit every file below `root`. A symlink counts as a regular file when
/// its target resolves to one; broken links and symlinked directories are
/// skipped.
pub fn enumerate_files<F>(root: &Path, options: &WalkOptions, mut visit: F) -> Result<()>
where
    F: FnMut(&Path) -> Result<()>,
{
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if options.skip_inaccessible => {
                tracing::debug!("Skipping inaccessible entry: {}", e);
                continue;
            }
            Err(e) => return Err(std::io::Error::from(e).into()),
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }

        if file_type.is_symlink() {
            // Resolve the target; treat a file target as a regular file.
            match std::fs::metadata(entry.path()) {
                Ok(resolved) if resolved.is_file() => {}
                Ok(_) => continue,
                Err(e) if options.skip_inaccessible => {
                    tracing::debug!(
                        "Skipping broken symlink {}: {}",
                        entry.path().display(),
                        e
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        visit(entry.path())?;
    }

    Ok(())
}
