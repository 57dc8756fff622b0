//! Plan construction: pure set comparison of two snapshots under a mode.
//!
//! The executor derives its entire operation set from the mode plus this
//! plan, so the mode gating here is contractual: add never populates the
//! deletion lists, remove never populates the creation lists.

use crate::fs::path::RelativePath;
use crate::sync::snapshot::Snapshot;
use crate::sync::BackupMode;
use std::collections::HashSet;
use tracing::debug;

/// The classified operations derived from two snapshots
#[derive(Debug, Default)]
pub struct BackupPlan {
    /// Present in source, absent in destination; sorted parents-first
    pub dirs_to_create: Vec<RelativePath>,
    /// In source, not in destination
    pub missing_files: Vec<RelativePath>,
    /// In both trees; candidates for content comparison (sync only)
    pub common_files: Vec<RelativePath>,
    /// In destination, not in source
    pub extra_files: Vec<RelativePath>,
    /// Destination-only directories with no destination-only ancestor;
    /// recursive deletion of these covers every extra descendant
    pub top_level_extra_dirs: Vec<RelativePath>,
}

impl BackupPlan {
    pub fn is_empty(&self) -> bool {
        self.dirs_to_create.is_empty()
            && self.missing_files.is_empty()
            && self.common_files.is_empty()
            && self.extra_files.is_empty()
            && self.top_level_extra_dirs.is_empty()
    }
}

/// Compare two snapshots under `mode`
pub fn build(mode: BackupMode, source: &Snapshot, destination: &Snapshot) -> BackupPlan {
    let mut plan = BackupPlan::default();

    if mode.writes() {
        plan.dirs_to_create = source
            .dirs()
            .iter()
            .filter(|dir| !destination.dirs().contains(*dir))
            .cloned()
            .collect();
        // Shorter strings first puts every parent ahead of its children
        plan.dirs_to_create
            .sort_by(|a, b| a.as_str().len().cmp(&b.as_str().len()).then_with(|| a.cmp(b)));

        for path in source.files().keys() {
            if destination.files().contains_key(path) {
                if mode == BackupMode::Sync {
                    plan.common_files.push(path.clone());
                }
            } else {
                plan.missing_files.push(path.clone());
            }
        }
        plan.missing_files.sort();
        plan.common_files.sort();
    }

    if mode.deletes() {
        plan.extra_files = destination
            .files()
            .keys()
            .filter(|path| !source.files().contains_key(*path))
            .cloned()
            .collect();
        plan.extra_files.sort();

        let extra_dirs: HashSet<&RelativePath> = destination
            .dirs()
            .iter()
            .filter(|dir| !source.dirs().contains(*dir))
            .collect();

        for dir in &extra_dirs {
            let mut covered = false;
            let mut cursor = (*dir).clone();
            while let Some(parent) = cursor.parent() {
                if extra_dirs.contains(&parent) {
                    covered = true;
                    break;
                }
                cursor = parent;
            }
            if !covered {
                plan.top_level_extra_dirs.push((*dir).clone());
            }
        }
        plan.top_level_extra_dirs.sort();
    }

    debug!(
        "Plan ({mode}): {} dirs to create, {} missing, {} common, {} extra files, {} extra dirs",
        plan.dirs_to_create.len(),
        plan.missing_files.len(),
        plan.common_files.len(),
        plan.extra_files.len(),
        plan.top_level_extra_dirs.len()
    );

    plan
}
