//! Normalized relative path values.
//!
//! `RelativePath` is the canonical key for every snapshot map and set
//! comparison in the engine. It is stored forward-slash-normalized and
//! carries the case policy of the host filesystem, so that equality,
//! hashing and ordering agree with how the destination volume compares
//! names.

use crate::utils::errors::{BackupError, Result};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

/// Per-host name comparison policy.
///
/// Windows-like filesystems compare names case-insensitively; everything
/// else compares byte-for-byte. Derived once per run and propagated into
/// every container; tests override it explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasePolicy {
    Sensitive,
    Insensitive,
}

impl CasePolicy {
    /// Policy of the host platform
    pub fn host() -> Self {
        if cfg!(windows) {
            CasePolicy::Insensitive
        } else {
            CasePolicy::Sensitive
        }
    }

    /// True when name comparison folds case
    pub fn folds(self) -> bool {
        matches!(self, CasePolicy::Insensitive)
    }
}

/// Immutable, validated, forward-slash-normalized relative path.
///
/// Construction rejects rooted inputs and `..` segments; empty or
/// whitespace-only input yields the empty path (the tree root).
#[derive(Debug, Clone)]
pub struct RelativePath {
    value: String,
    policy: CasePolicy,
}

impl RelativePath {
    pub fn new(input: &str, policy: CasePolicy) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self {
                value: String::new(),
                policy,
            });
        }

        let mut value = trimmed.replace('\\', "/");

        if policy.folds() {
            // Windows-like hosts: rooted forms are rejected outright.
            if value.starts_with('/') {
                return Err(BackupError::InvalidArgument(format!(
                    "rooted path not allowed: {input}"
                )));
            }
            let bytes = value.as_bytes();
            if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
                return Err(BackupError::InvalidArgument(format!(
                    "drive-qualified path not allowed: {input}"
                )));
            }
        } else if let Some(rest) = value.strip_prefix('/') {
            // Case-sensitive hosts tolerate a single leading separator.
            value = rest.to_string();
            if value.starts_with('/') {
                return Err(BackupError::InvalidArgument(format!(
                    "rooted path not allowed: {input}"
                )));
            }
        }

        while value.ends_with('/') {
            value.pop();
        }

        for segment in value.split('/') {
            if segment == ".." {
                return Err(BackupError::InvalidArgument(format!(
                    "parent-directory segment not allowed: {input}"
                )));
            }
        }

        Ok(Self { value, policy })
    }

    /// Build from a path already stripped of its root prefix
    pub fn from_path(path: &Path, policy: CasePolicy) -> Result<Self> {
        let joined = path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Self::new(&joined, policy)
    }

    /// Canonical forward-slash form
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn policy(&self) -> CasePolicy {
        self.policy
    }

    /// The empty path stands for the tree root itself
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Platform-native form (separators converted)
    pub fn to_native(&self) -> PathBuf {
        if MAIN_SEPARATOR == '/' {
            PathBuf::from(&self.value)
        } else {
            PathBuf::from(self.value.replace('/', &MAIN_SEPARATOR.to_string()))
        }
    }

    /// Strip the last segment. Returns `None` for single-segment and empty
    /// paths; the root is never a parent candidate.
    pub fn parent(&self) -> Option<RelativePath> {
        let idx = self.value.rfind('/')?;
        Some(RelativePath {
            value: self.value[..idx].to_string(),
            policy: self.policy,
        })
    }
}

impl PartialEq for RelativePath {
    fn eq(&self, other: &Self) -> bool {
        if self.policy.folds() {
            self.value.eq_ignore_ascii_case(&other.value)
        } else {
            self.value == other.value
        }
    }
}

impl Eq for RelativePath {}

impl Hash for RelativePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let fold = self.policy.folds();
        for b in self.value.bytes() {
            state.write_u8(if fold { b.to_ascii_lowercase() } else { b });
        }
        state.write_usize(self.value.len());
    }
}

impl Ord for RelativePath {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.policy.folds() {
            self.value
                .bytes()
                .map(|b| b.to_ascii_lowercase())
                .cmp(other.value.bytes().map(|b| b.to_ascii_lowercase()))
        } else {
            self.value.cmp(&other.value)
        }
    }
}

impl PartialOrd for RelativePath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for RelativePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}
