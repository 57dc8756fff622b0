//! Point-in-time inventory of a directory tree.
//!
//! A snapshot is captured once per run per root and is immutable
//! afterwards; every later pipeline stage works off these in-memory maps
//! rather than re-stating the filesystem.

use crate::fs::metadata::FileMetadata;
use crate::fs::path::{CasePolicy, RelativePath};
use crate::fs::walker::{self, WalkOptions};
use crate::utils::errors::{BackupError, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Cancellation is polled once per this many enumerated items
const CANCEL_POLL_MASK: usize = 0xFF;

/// One file in a snapshot
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: RelativePath,
    /// Size in bytes; zero when metadata capture was off
    pub len: u64,
    /// Last-write time (UTC); epoch when metadata capture was off
    pub modified: SystemTime,
}

/// Inventory of one tree: file metadata keyed by relative path, plus the
/// set of directories below the root
#[derive(Debug)]
pub struct Snapshot {
    policy: CasePolicy,
    files: HashMap<RelativePath, FileEntry>,
    dirs: HashSet<RelativePath>,
}

impl Snapshot {
    /// Snapshot of a tree that does not exist
    pub fn empty(policy: CasePolicy) -> Self {
        Self {
            policy,
            files: HashMap::new(),
            dirs: HashSet::new(),
        }
    }

    /// Assemble a snapshot from pre-built containers. Useful for in-memory
    /// trees in tests; `capture` is the production path.
    pub fn from_parts(
        policy: CasePolicy,
        files: HashMap<RelativePath, FileEntry>,
        dirs: HashSet<RelativePath>,
    ) -> Self {
        Self {
            policy,
            files,
            dirs,
        }
    }

    pub fn files(&self) -> &HashMap<RelativePath, FileEntry> {
        &self.files
    }

    pub fn dirs(&self) -> &HashSet<RelativePath> {
        &self.dirs
    }

    pub fn policy(&self) -> CasePolicy {
        self.policy
    }
}

struct CancelPoll<'a> {
    seen: usize,
    cancel: &'a CancellationToken,
}

impl CancelPoll<'_> {
    fn tick(&mut self) -> Result<()> {
        self.seen += 1;
        if self.seen & CANCEL_POLL_MASK == 0 && self.cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }
        Ok(())
    }
}

/// Capture the inventory beneath `root`.
///
/// With `include_metadata` off every entry carries zero size and an epoch
/// mtime; that is the read-only side of a run where only keys matter.
pub fn capture(
    root: &Path,
    include_metadata: bool,
    policy: CasePolicy,
    options: &WalkOptions,
    cancel: &CancellationToken,
) -> Result<Snapshot> {
    if cancel.is_cancelled() {
        return Err(BackupError::Cancelled);
    }

    let mut dirs = HashSet::new();
    let mut files = HashMap::new();
    let mut poll = CancelPoll { seen: 0, cancel };

    walker::enumerate_directories(root, options, |abs| {
        poll.tick()?;
        let rel = relative_of(root, abs, policy)?;
        if !rel.is_empty() {
            dirs.insert(rel);
        }
        Ok(())
    })?;

    walker::enumerate_files(root, options, |abs| {
        poll.tick()?;
        let rel = relative_of(root, abs, policy)?;
        if rel.is_empty() {
            return Ok(());
        }
        let entry = if include_metadata {
            match FileMetadata::from_path(abs) {
                Ok(metadata) => FileEntry {
                    path: rel.clone(),
                    len: metadata.len,
                    modified: metadata.modified,
                },
                Err(e) if options.skip_inaccessible => {
                    debug!("Skipping unreadable file {}: {}", abs.display(), e);
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            FileEntry {
                path: rel.clone(),
                len: 0,
                modified: UNIX_EPOCH,
            }
        };
        files.insert(rel, entry);
        Ok(())
    })?;

    debug!(
        "Captured snapshot of {}: {} files, {} directories",
        root.display(),
        files.len(),
        dirs.len()
    );

    Ok(Snapshot {
        policy,
        files,
        dirs,
    })
}

fn relative_of(root: &Path, absolute: &Path, policy: CasePolicy) -> Result<RelativePath> {
    let stripped = absolute.strip_prefix(root).map_err(|_| {
        BackupError::InvalidArgument(format!(
            "path {} is not under {}",
            absolute.display(),
            root.display()
        ))
    })?;
    RelativePath::from_path(stripped, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn rel(s: &str) -> RelativePath {
        RelativePath::new(s, CasePolicy::Sensitive).unwrap()
    }

    fn capture_plain(root: &Path, include_metadata: bool) -> Snapshot {
        capture(
            root,
            include_metadata,
            CasePolicy::Sensitive,
            &WalkOptions::default(),
            &CancellationToken::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = Snapshot::empty(CasePolicy::Sensitive);
        assert!(snapshot.files().is_empty());
        assert!(snapshot.dirs().is_empty());
    }

    #[test]
    fn test_capture_tree() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("a/b")).unwrap();
        fs::write(temp_dir.path().join("top.txt"), b"top").unwrap();
        fs::write(temp_dir.path().join("a/b/deep.txt"), b"deep!").unwrap();

        let snapshot = capture_plain(temp_dir.path(), true);

        assert_eq!(snapshot.dirs().len(), 2);
        assert!(snapshot.dirs().contains(&rel("a")));
        assert!(snapshot.dirs().contains(&rel("a/b")));

        assert_eq!(snapshot.files().len(), 2);
        let deep = snapshot.files().get(&rel("a/b/deep.txt")).unwrap();
        assert_eq!(deep.len, 5);
        assert!(deep.modified > UNIX_EPOCH);
    }

    #[test]
    fn test_capture_without_metadata() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("f.txt"), b"content").unwrap();

        let snapshot = capture_plain(temp_dir.path(), false);
        let entry = snapshot.files().get(&rel("f.txt")).unwrap();
        assert_eq!(entry.len, 0);
        assert_eq!(entry.modified, UNIX_EPOCH);
    }

    #[test]
    fn test_capture_cancelled_up_front() {
        let temp_dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = capture(
            temp_dir.path(),
            true,
            CasePolicy::Sensitive,
            &WalkOptions::default(),
            &cancel,
        );
        assert!(matches!(result, Err(BackupError::Cancelled)));
    }

    #[test]
    fn test_capture_polls_cancellation() {
        let temp_dir = TempDir::new().unwrap();
        // Enough entries to cross the poll mask at least once
        for i in 0..600 {
            fs::write(temp_dir.path().join(format!("f{i}.txt")), b"x").unwrap();
        }

        let cancel = CancellationToken::new();
        let snapshot = capture_plain(temp_dir.path(), false);
        assert_eq!(snapshot.files().len(), 600);

        // The same tree aborts when the token trips before the walk
        let probe = {
            cancel.cancel();
            capture(
                temp_dir.path(),
                false,
                CasePolicy::Sensitive,
                &WalkOptions::default(),
                &cancel,
            )
        };
        assert!(matches!(probe, Err(BackupError::Cancelled)));
    }
}
