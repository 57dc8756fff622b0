//! File-system primitives the executor is built on.
//!
//! Creation and deletion are idempotent ("create if absent" / "delete if
//! exists"), so a caller may retry a failed run without special casing.
//! The copy primitive streams through a large buffer, honors cancellation
//! between buffers and restores the source mtime on the destination.

use crate::fs::path::{CasePolicy, RelativePath};
use crate::sync::BackupMode;
use crate::utils::errors::{BackupError, Result};
use filetime::FileTime;
use std::io;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::time::SystemTime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Sequential-IO buffer size for copy and hash streams
pub const IO_BUFFER_SIZE: usize = 1024 * 1024;

/// Resolve a relative path against a tree root
pub fn combine(root: &Path, relative: &RelativePath) -> PathBuf {
    root.join(relative.to_native())
}

/// Validate both request paths and normalize them to absolute,
/// trailing-separator-stripped form.
pub fn validate_and_normalize(source: &str, destination: &str) -> Result<(PathBuf, PathBuf)> {
    let source = normalize_root(source, "source")?;
    let destination = normalize_root(destination, "destination")?;
    Ok((source, destination))
}

fn normalize_root(raw: &str, which: &str) -> Result<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(BackupError::InvalidArgument(format!(
            "{which} path must not be empty"
        )));
    }

    let mut cleaned = trimmed.to_string();
    while cleaned.len() > 1 && (cleaned.ends_with('/') || cleaned.ends_with('\\')) {
        cleaned.pop();
    }

    Ok(std::path::absolute(&cleaned)?)
}

/// Reject requests where one root contains the other. Both paths get a
/// trailing separator appended so that `/a/bc` is not treated as a prefix
/// of `/a/b`.
pub fn validate_no_overlap(source: &Path, destination: &Path, policy: CasePolicy) -> Result<()> {
    let mut src = source.to_string_lossy().into_owned();
    let mut dst = destination.to_string_lossy().into_owned();
    if !src.ends_with(MAIN_SEPARATOR) {
        src.push(MAIN_SEPARATOR);
    }
    if !dst.ends_with(MAIN_SEPARATOR) {
        dst.push(MAIN_SEPARATOR);
    }

    if policy.folds() {
        src = src.to_ascii_lowercase();
        dst = dst.to_ascii_lowercase();
    }

    if src.starts_with(&dst) || dst.starts_with(&src) {
        return Err(BackupError::PathOverlap {
            from_path: source.to_path_buf(),
            destination: destination.to_path_buf(),
        });
    }

    Ok(())
}

/// Fail early when the source tree is missing
pub fn ensure_source_exists(source: &Path) -> Result<()> {
    if !source.is_dir() {
        return Err(BackupError::SourceNotFound(source.to_path_buf()));
    }
    Ok(())
}

/// Create the destination root for writing modes. Returns `true` when the
/// directory was newly created; remove mode never creates anything.
pub fn prepare_destination(mode: BackupMode, destination: &Path) -> Result<bool> {
    if destination.is_dir() {
        return Ok(false);
    }
    match mode {
        BackupMode::Sync | BackupMode::Add => {
            std::fs::create_dir_all(destination)?;
            Ok(true)
        }
        BackupMode::Remove => Ok(false),
    }
}

/// Idempotent directory creation (parents included)
pub fn create_dir(path: &Path) -> io::Result<()> {
    std::fs::create_dir_all(path)
}

/// Delete a file, treating "already gone" as success
pub fn delete_file_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Recursively delete a directory, treating "already gone" as success
pub fn delete_dir_recursive_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Copy `source` to `destination` through a buffered stream.
///
/// With `overwrite` unset the destination must not already exist. When
/// `mtime` is given it is applied to the destination after the copy so the
/// file keeps the source's last-write time. Cancellation is observed
/// before every buffer.
pub async fn copy_file(
    source: &Path,
    destination: &Path,
    overwrite: bool,
    mtime: Option<SystemTime>,
    cancel: &CancellationToken,
) -> Result<u64> {
    if cancel.is_cancelled() {
        return Err(BackupError::Cancelled);
    }

    let mut reader = tokio::fs::File::open(source).await?;

    let mut open_options = tokio::fs::OpenOptions::new();
    open_options.write(true);
    if overwrite {
        open_options.create(true).truncate(true);
    } else {
        open_options.create_new(true);
    }
    let mut writer = open_options.open(destination).await?;

    let mut buffer = vec![0u8; IO_BUFFER_SIZE];
    let mut written = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buffer[..n]).await?;
        written += n as u64;
    }
    writer.flush().await?;
    drop(writer);

    if let Some(mtime) = mtime {
        filetime::set_file_mtime(destination, FileTime::from_system_time(mtime))?;
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_rejects_empty() {
        assert!(validate_and_normalize("", "/tmp/b").is_err());
        assert!(validate_and_normalize("/tmp/a", "   ").is_err());
    }

    #[test]
    fn test_normalize_strips_trailing_separators() {
        let (src, dst) = validate_and_normalize("/tmp/a///", "/tmp/b/").unwrap();
        assert_eq!(src, PathBuf::from("/tmp/a"));
        assert_eq!(dst, PathBuf::from("/tmp/b"));
    }

    #[test]
    fn test_overlap_detection() {
        let policy = CasePolicy::Sensitive;
        assert!(validate_no_overlap(Path::new("/a"), Path::new("/a/b"), policy).is_err());
        assert!(validate_no_overlap(Path::new("/a/b"), Path::new("/a"), policy).is_err());
        assert!(validate_no_overlap(Path::new("/a"), Path::new("/a"), policy).is_err());
        assert!(validate_no_overlap(Path::new("/a"), Path::new("/ab"), policy).is_ok());
        assert!(validate_no_overlap(Path::new("/a/b"), Path::new("/a/c"), policy).is_ok());
    }

    #[test]
    fn test_overlap_respects_case_policy() {
        assert!(
            validate_no_overlap(Path::new("/Data"), Path::new("/data/sub"), CasePolicy::Insensitive)
                .is_err()
        );
        assert!(
            validate_no_overlap(Path::new("/Data"), Path::new("/data/sub"), CasePolicy::Sensitive)
                .is_ok()
        );
    }

    #[test]
    fn test_prepare_destination_modes() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("new");

        assert!(!prepare_destination(BackupMode::Remove, &missing).unwrap());
        assert!(!missing.exists());

        assert!(prepare_destination(BackupMode::Sync, &missing).unwrap());
        assert!(missing.is_dir());

        // Second call is a no-op
        assert!(!prepare_destination(BackupMode::Sync, &missing).unwrap());
    }

    #[test]
    fn test_delete_primitives_are_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("f.txt");
        let dir = temp_dir.path().join("d");

        fs::write(&file, b"x").unwrap();
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("inner.txt"), b"y").unwrap();

        delete_file_if_exists(&file).unwrap();
        delete_file_if_exists(&file).unwrap();
        delete_dir_recursive_if_exists(&dir).unwrap();
        delete_dir_recursive_if_exists(&dir).unwrap();

        assert!(!file.exists());
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_copy_restores_mtime() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src.txt");
        let dst = temp_dir.path().join("dst.txt");
        fs::write(&src, b"hello world").unwrap();

        let mtime = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_600_000_000);
        let cancel = CancellationToken::new();
        let written = copy_file(&src, &dst, false, Some(mtime), &cancel)
            .await
            .unwrap();

        assert_eq!(written, 11);
        assert_eq!(fs::read(&dst).unwrap(), b"hello world");
        assert_eq!(fs::metadata(&dst).unwrap().modified().unwrap(), mtime);
    }

    #[tokio::test]
    async fn test_copy_without_overwrite_refuses_existing() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src.txt");
        let dst = temp_dir.path().join("dst.txt");
        fs::write(&src, b"new").unwrap();
        fs::write(&dst, b"old").unwrap();

        let cancel = CancellationToken::new();
        let result = copy_file(&src, &dst, false, None, &cancel).await;
        assert!(result.is_err());
        assert_eq!(fs::read(&dst).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_copy_with_overwrite_truncates() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src.txt");
        let dst = temp_dir.path().join("dst.txt");
        fs::write(&src, b"ab").unwrap();
        fs::write(&dst, b"a much longer previous content").unwrap();

        let cancel = CancellationToken::new();
        copy_file(&src, &dst, true, None, &cancel).await.unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"ab");
    }

    #[tokio::test]
    async fn test_copy_observes_cancellation() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src.txt");
        fs::write(&src, b"data").unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = copy_file(&src, &temp_dir.path().join("dst.txt"), false, None, &cancel).await;
        assert!(matches!(result, Err(BackupError::Cancelled)));
    }
}
