//! Backup orchestration.
//!
//! `BackupEngine` drives one run end to end: validate the request, capture
//! both snapshots, build the plan, detect overwrites, then hand everything
//! to the phase pipeline in `apply`.

pub mod apply;

pub use apply::BackupResult;

use crate::config::BackupOptions;
use crate::fs::ops;
use crate::fs::path::CasePolicy;
use crate::fs::walker::WalkOptions;
use crate::sync::snapshot::{self, Snapshot};
use crate::sync::{detect, plan, BackupMode};
use crate::transfer::progress::ProgressSender;
use crate::utils::errors::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One backup request: two roots and a policy
#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub source: String,
    pub destination: String,
    pub mode: BackupMode,
}

/// The reconciliation engine
pub struct BackupEngine {
    options: BackupOptions,
}

impl BackupEngine {
    pub fn new(options: BackupOptions) -> Self {
        Self { options }
    }

    /// Run a backup under the host case policy
    pub async fn execute(
        &self,
        request: &BackupRequest,
        progress: Option<&ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<BackupResult> {
        self.execute_with_policy(request, CasePolicy::host(), progress, cancel)
            .await
    }

    /// Run a backup under an explicit case policy
    pub async fn execute_with_policy(
        &self,
        request: &BackupRequest,
        policy: CasePolicy,
        progress: Option<&ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<BackupResult> {
        let (source_root, destination_root) =
            ops::validate_and_normalize(&request.source, &request.destination)?;
        ops::validate_no_overlap(&source_root, &destination_root, policy)?;
        ops::ensure_source_exists(&source_root)?;

        info!(
            "Starting {} backup: {} -> {}",
            request.mode,
            source_root.display(),
            destination_root.display()
        );

        let newly_created = ops::prepare_destination(request.mode, &destination_root)?;
        if newly_created {
            debug!("Created destination root {}", destination_root.display());
        }

        let walk = WalkOptions {
            skip_inaccessible: self.options.skip_inaccessible,
        };

        // Write modes need source mtimes back on the copies; only sync
        // compares destination content, so only sync stats that side.
        // The walks are blocking; keep them off the async workers.
        let source_snapshot = {
            let root = source_root.clone();
            let include_metadata = request.mode.writes();
            let walk = walk.clone();
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || {
                snapshot::capture(&root, include_metadata, policy, &walk, &cancel)
            })
            .await??
        };
        let destination_snapshot = if newly_created || !destination_root.is_dir() {
            Snapshot::empty(policy)
        } else {
            let root = destination_root.clone();
            let include_metadata = request.mode == BackupMode::Sync;
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || {
                snapshot::capture(&root, include_metadata, policy, &walk, &cancel)
            })
            .await??
        };

        let plan = plan::build(request.mode, &source_snapshot, &destination_snapshot);

        let overwrite = if request.mode == BackupMode::Sync && !plan.common_files.is_empty() {
            detect::classify(
                &plan.common_files,
                &source_snapshot,
                &destination_snapshot,
                &source_root,
                &destination_root,
                &self.options,
                cancel,
            )
            .await?
        } else {
            Vec::new()
        };

        let result = apply::apply(
            request.mode,
            &plan,
            &source_snapshot,
            &source_root,
            &destination_root,
            &overwrite,
            &self.options,
            progress,
            cancel,
        )
        .await?;

        info!(
            "Backup complete: {} copied, {} overwritten, {} deleted",
            result.files_copied, result.files_overwritten, result.files_deleted
        );

        Ok(result)
    }
}

impl Default for BackupEngine {
    fn default() -> Self {
        Self::new(BackupOptions::default())
    }
}
