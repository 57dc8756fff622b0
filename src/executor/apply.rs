//! Plan application: the phase pipeline that touches the filesystem.
//!
//! Phases run strictly in sequence (directories must exist before files
//! land in them, files must be gone before their parent is removed);
//! items inside a phase fan out across a bounded worker pool. The first
//! failing worker cancels its peers and aborts the run; nothing already
//! applied is rolled back.

use crate::config::BackupOptions;
use crate::fs::ops;
use crate::fs::path::RelativePath;
use crate::fs::volume;
use crate::sync::plan::BackupPlan;
use crate::sync::snapshot::Snapshot;
use crate::sync::BackupMode;
use crate::transfer::progress::{report, BackupPhase, BackupProgress, ProgressSender};
use crate::utils::errors::{keep_first, BackupError, Result};
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Counts of the operations a run performed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackupResult {
    pub dirs_created: u64,
    pub files_copied: u64,
    pub files_overwritten: u64,
    pub files_deleted: u64,
    pub dirs_deleted: u64,
}

/// Apply `plan` to the destination tree and tally what was done
#[allow(clippy::too_many_arguments)]
pub async fn apply(
    mode: BackupMode,
    plan: &BackupPlan,
    source: &Snapshot,
    source_root: &Path,
    destination_root: &Path,
    overwrite: &[RelativePath],
    options: &BackupOptions,
    progress: Option<&ProgressSender>,
    cancel: &CancellationToken,
) -> Result<BackupResult> {
    let io_limit = effective_io_concurrency(destination_root, options);
    let total = total_operations(mode, plan, overwrite);
    let processed = Arc::new(AtomicU32::new(0));
    let mut result = BackupResult::default();

    report(
        progress,
        BackupProgress {
            phase: BackupPhase::Preparing,
            processed: 0,
            total,
        },
    );

    if mode.writes() {
        // Source mtimes are restored onto every copied file
        let mtimes: Arc<HashMap<RelativePath, SystemTime>> = Arc::new(
            source
                .files()
                .iter()
                .map(|(path, entry)| (path.clone(), entry.modified))
                .collect(),
        );

        // Creation is idempotent, so a child racing ahead of its parent in
        // the pool implicitly creates the parent chain; list order still
        // puts parents first.
        let dst_root = destination_root.to_path_buf();
        result.dirs_created = run_phase(
            plan.dirs_to_create.clone(),
            io_limit,
            BackupPhase::CreatingDirectories,
            progress,
            &processed,
            total,
            cancel,
            move |path, _cancel| {
                let abs = ops::combine(&dst_root, &path);
                async move {
                    tokio::task::spawn_blocking(move || ops::create_dir(&abs))
                        .await
                        .map_err(BackupError::from)?
                        .map_err(BackupError::from)
                }
            },
        )
        .await?;

        result.files_copied = run_phase(
            plan.missing_files.clone(),
            io_limit,
            BackupPhase::CopyingFiles,
            progress,
            &processed,
            total,
            cancel,
            copy_op(source_root, destination_root, &mtimes, false),
        )
        .await?;

        if mode == BackupMode::Sync && !overwrite.is_empty() {
            result.files_overwritten = run_phase(
                overwrite.to_vec(),
                io_limit,
                BackupPhase::OverwritingFiles,
                progress,
                &processed,
                total,
                cancel,
                copy_op(source_root, destination_root, &mtimes, true),
            )
            .await?;
        }
    }

    if mode.deletes() {
        let dst_root = destination_root.to_path_buf();
        result.files_deleted = run_phase(
            plan.extra_files.clone(),
            io_limit,
            BackupPhase::DeletingFiles,
            progress,
            &processed,
            total,
            cancel,
            move |path, _cancel| {
                let abs = ops::combine(&dst_root, &path);
                async move {
                    tokio::task::spawn_blocking(move || ops::delete_file_if_exists(&abs))
                        .await
                        .map_err(BackupError::from)?
                        .map_err(BackupError::from)
                }
            },
        )
        .await?;

        // Recursive deletion already parallelizes at the tree level, and
        // parent/child ordering must not race: one at a time.
        for dir in &plan.top_level_extra_dirs {
            if cancel.is_cancelled() {
                return Err(BackupError::Cancelled);
            }
            let abs = ops::combine(destination_root, dir);
            tokio::task::spawn_blocking(move || ops::delete_dir_recursive_if_exists(&abs))
                .await??;
            result.dirs_deleted += 1;
            let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
            report(
                progress,
                BackupProgress {
                    phase: BackupPhase::DeletingDirectories,
                    processed: done,
                    total,
                },
            );
        }
    }

    info!(
        "Applied plan: {} dirs created, {} copied, {} overwritten, {} files deleted, {} dirs deleted",
        result.dirs_created,
        result.files_copied,
        result.files_overwritten,
        result.files_deleted,
        result.dirs_deleted
    );

    Ok(result)
}

/// Exact operation count for the phases `mode` will run
fn total_operations(mode: BackupMode, plan: &BackupPlan, overwrite: &[RelativePath]) -> u32 {
    let mut total = 0usize;
    if mode.writes() {
        total += plan.dirs_to_create.len() + plan.missing_files.len();
        if mode == BackupMode::Sync {
            total += overwrite.len();
        }
    }
    if mode.deletes() {
        total += plan.extra_files.len() + plan.top_level_extra_dirs.len();
    }
    total.min(u32::MAX as usize) as u32
}

/// Slow volumes get one writer at a time; everything else keeps the
/// configured limit
fn effective_io_concurrency(destination_root: &Path, options: &BackupOptions) -> usize {
    let kind = volume::classify(destination_root);
    if kind.limits_concurrency() {
        debug!(
            "Destination volume is {:?}, clamping IO concurrency to 1",
            kind
        );
        1
    } else {
        options.max_file_io_concurrency.max(1)
    }
}

type BoxedOp = std::pin::Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Shared shape of the copy and overwrite phases
fn copy_op(
    source_root: &Path,
    destination_root: &Path,
    mtimes: &Arc<HashMap<RelativePath, SystemTime>>,
    overwrite: bool,
) -> impl Fn(RelativePath, CancellationToken) -> BoxedOp + Send + Sync + 'static {
    let src_root = source_root.to_path_buf();
    let dst_root = destination_root.to_path_buf();
    let mtimes = Arc::clone(mtimes);
    move |path, cancel| {
        let src = ops::combine(&src_root, &path);
        let dst = ops::combine(&dst_root, &path);
        let mtime = mtimes.get(&path).copied();
        Box::pin(async move {
            ops::copy_file(&src, &dst, overwrite, mtime, &cancel)
                .await
                .map(|_| ())
        })
    }
}

/// Dispatch `items` to a worker pool of `limit`, counting successes and
/// posting one progress sample per completed operation. The first error
/// cancels the phase token so peers stop at their next check.
#[allow(clippy::too_many_arguments)]
async fn run_phase<F, Fut>(
    items: Vec<RelativePath>,
    limit: usize,
    phase: BackupPhase,
    progress: Option<&ProgressSender>,
    processed: &Arc<AtomicU32>,
    total: u32,
    cancel: &CancellationToken,
    op: F,
) -> Result<u64>
where
    F: Fn(RelativePath, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    if items.is_empty() {
        return Ok(0);
    }
    if cancel.is_cancelled() {
        return Err(BackupError::Cancelled);
    }

    let op = Arc::new(op);
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let phase_cancel = cancel.child_token();
    let completed = Arc::new(AtomicU64::new(0));
    let mut handles = Vec::with_capacity(items.len());

    for item in items {
        let op = Arc::clone(&op);
        let semaphore = Arc::clone(&semaphore);
        let task_cancel = phase_cancel.clone();
        let processed = Arc::clone(processed);
        let completed = Arc::clone(&completed);
        let sender = progress.cloned();

        handles.push(tokio::spawn(async move {
            if task_cancel.is_cancelled() {
                return Err(BackupError::Cancelled);
            }
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| BackupError::Cancelled)?;
            if task_cancel.is_cancelled() {
                return Err(BackupError::Cancelled);
            }

            match op(item, task_cancel.clone()).await {
                Ok(()) => {
                    completed.fetch_add(1, Ordering::Relaxed);
                    let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                    report(
                        sender.as_ref(),
                        BackupProgress {
                            phase,
                            processed: done,
                            total,
                        },
                    );
                    Ok(())
                }
                Err(e) => {
                    task_cancel.cancel();
                    Err(e)
                }
            }
        }));
    }

    let mut first_error: Option<BackupError> = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => keep_first(&mut first_error, e),
            Err(e) => keep_first(&mut first_error, e.into()),
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }
    if cancel.is_cancelled() {
        return Err(BackupError::Cancelled);
    }

    Ok(completed.load(Ordering::Relaxed))
}
