//! Values exchanged with the remote repository.

use std::fmt;

use serde::Serialize;

use super::error::{RemoteError, RemoteErrorKind};

/// A file entry from a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub name: String,
    pub path: String,
    /// Opaque revision token required to update or delete this exact version.
    pub sha: String,
}

/// A file's content together with the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteContent {
    pub content: String,
    pub sha: String,
}

/// One file to create or replace in a batch commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub path: String,
    pub content: String,
}

/// A path in a new tree: either a blob handle or a deletion tombstone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub blob_sha: Option<String>,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            blob_sha: Some(sha.into()),
        }
    }

    pub fn deletion(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            blob_sha: None,
        }
    }
}

/// The ordered steps of an atomic multi-file commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStep {
    ResolveHead,
    ResolveTree,
    CreateBlob,
    CreateTree,
    CreateCommit,
    UpdateRef,
}

impl fmt::Display for CommitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ResolveHead => "resolve_head",
            Self::ResolveTree => "resolve_tree",
            Self::CreateBlob => "create_blob",
            Self::CreateTree => "create_tree",
            Self::CreateCommit => "create_commit",
            Self::UpdateRef => "update_ref",
        })
    }
}

/// Outcome of [`batch_commit`](super::batch_commit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitResult {
    pub success: bool,
    /// New head commit when something was committed.
    pub new_remote_revision: Option<String>,
    pub error: Option<String>,
    pub error_kind: Option<RemoteErrorKind>,
    /// Step that failed; every step before it had no visible effect.
    pub failed_step: Option<CommitStep>,
}

impl CommitResult {
    /// Nothing to commit.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            success: true,
            new_remote_revision: None,
            error: None,
            error_kind: None,
            failed_step: None,
        }
    }

    #[must_use]
    pub const fn committed(revision: String) -> Self {
        Self {
            success: true,
            new_remote_revision: Some(revision),
            error: None,
            error_kind: None,
            failed_step: None,
        }
    }

    #[must_use]
    pub fn failed(step: CommitStep, error: &RemoteError) -> Self {
        Self {
            success: false,
            new_remote_revision: None,
            error: Some(format!("{step} failed: {}", error.message)),
            error_kind: Some(error.kind),
            failed_step: Some(step),
        }
    }

    /// Convert into a `Result`, keeping the error kind.
    pub fn into_result(self) -> Result<Option<String>, RemoteError> {
        if self.success {
            return Ok(self.new_remote_revision);
        }
        Err(RemoteError::new(
            self.error_kind.unwrap_or(RemoteErrorKind::Unknown),
            self.error.unwrap_or_else(|| "batch commit failed".to_string()),
        ))
    }
}

/// Access level of the authenticated user on the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessReport {
    pub login: String,
    pub permission: String,
}

impl AccessReport {
    #[must_use]
    pub fn can_write(&self) -> bool {
        matches!(self.permission.as_str(), "admin" | "maintain" | "write")
    }
}
