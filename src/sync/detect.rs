//! Overwrite detection for files present in both trees.
//!
//! Three-level equivalence ladder, applied per path: a size mismatch is an
//! immediate overwrite, matching size and mtime is presumed identical, and
//! matching size with a differing mtime falls back to comparing streamed
//! SHA-256 digests of both sides.

use crate::config::BackupOptions;
use crate::fs::ops::{self, IO_BUFFER_SIZE};
use crate::fs::path::RelativePath;
use crate::sync::snapshot::Snapshot;
use crate::utils::errors::{keep_first, BackupError, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Compute the SHA-256 digest of a file over buffered sequential reads.
/// Cancellation is observed between buffers.
pub async fn sha256_file(path: &Path, cancel: &CancellationToken) -> Result<[u8; 32]> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; IO_BUFFER_SIZE];

    loop {
        if cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize().into())
}

/// Branch-free digest comparison
fn digests_equal(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Classify which of the shared files must be rewritten.
///
/// Hash work runs under `max_hash_concurrency`; the first IO error cancels
/// the remaining workers and aborts the whole step. The order of the
/// returned list carries no meaning.
pub async fn classify(
    common: &[RelativePath],
    source: &Snapshot,
    destination: &Snapshot,
    source_root: &Path,
    destination_root: &Path,
    options: &BackupOptions,
    cancel: &CancellationToken,
) -> Result<Vec<RelativePath>> {
    let mut to_overwrite = Vec::new();
    let semaphore = Arc::new(Semaphore::new(options.max_hash_concurrency.max(1)));
    let step_cancel = cancel.child_token();
    let mut handles = Vec::new();

    for path in common {
        if step_cancel.is_cancelled() {
            break;
        }
        let (Some(src_entry), Some(dst_entry)) =
            (source.files().get(path), destination.files().get(path))
        else {
            continue;
        };

        if src_entry.len != dst_entry.len {
            trace!("{path}: size differs, overwrite");
            to_overwrite.push(path.clone());
            continue;
        }
        if src_entry.modified == dst_entry.modified {
            // Same size, same last-write time: presumed identical
            continue;
        }

        // Same size, different mtime: settle it by content
        let src_abs = ops::combine(source_root, path);
        let dst_abs = ops::combine(destination_root, path);
        let semaphore = Arc::clone(&semaphore);
        let task_cancel = step_cancel.clone();
        let path = path.clone();

        handles.push(tokio::spawn(async move {
            let verdict = async {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| BackupError::Cancelled)?;
                if task_cancel.is_cancelled() {
                    return Err(BackupError::Cancelled);
                }

                let src_digest = sha256_file(&src_abs, &task_cancel).await?;
                let dst_digest = sha256_file(&dst_abs, &task_cancel).await?;

                if digests_equal(&src_digest, &dst_digest) {
                    trace!("{path}: content identical ({})", hex::encode(src_digest));
                    Ok::<Option<RelativePath>, BackupError>(None)
                } else {
                    trace!("{path}: content differs");
                    Ok(Some(path))
                }
            }
            .await;

            // First failure trips the step token so peers stop promptly
            if verdict.is_err() {
                task_cancel.cancel();
            }
            verdict
        }));
    }

    let mut first_error: Option<BackupError> = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(Some(path))) => to_overwrite.push(path),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => {
                step_cancel.cancel();
                keep_first(&mut first_error, e);
            }
            Err(e) => {
                step_cancel.cancel();
                keep_first(&mut first_error, e.into());
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }
    if cancel.is_cancelled() {
        return Err(BackupError::Cancelled);
    }

    debug!(
        "Overwrite detection: {} of {} shared files need rewrite",
        to_overwrite.len(),
        common.len()
    );

    Ok(to_overwrite)
}
