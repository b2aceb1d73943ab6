//! Structured results of sync operations.

use serde::Serialize;

use crate::hash_store::FileHashes;
use crate::merge::ConflictAnalysis;
use crate::models::{Expense, SyncedSettings};
use crate::remote::RemoteErrorKind;
use crate::shard::DayKey;

/// Which replica should move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    InSync,
    Push,
    Pull,
    /// Both replicas changed since the last reconciliation.
    Conflict,
}

impl SyncDirection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InSync => "in_sync",
            Self::Push => "push",
            Self::Pull => "pull",
            Self::Conflict => "conflict",
        }
    }
}

impl std::fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DirectionReport {
    pub direction: SyncDirection,
    /// Newest remote commit time (Unix ms); `None` for an empty repository.
    pub remote_time: Option<i64>,
    pub last_sync_at: Option<i64>,
    pub has_local_changes: bool,
}

/// One file that could not be written or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub kind: RemoteErrorKind,
    pub message: String,
}

/// Result of pushing local shards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub uploaded: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FileFailure>,
    /// Set when the push went out as a single commit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    pub last_sync_at: Option<i64>,
}

impl UploadReport {
    /// Some writes landed and some did not.
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        self.failed > 0 && self.uploaded + self.deleted > 0
    }

    /// Number of remote writes (uploads plus deletions) that were attempted.
    #[must_use]
    pub const fn attempted(&self) -> usize {
        self.uploaded + self.deleted + self.failed
    }
}

/// Records fetched from the remote; nothing local is touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    #[serde(skip)]
    pub records: Vec<Expense>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<SyncedSettings>,
    /// Days fetched, newest first.
    pub days: Vec<DayKey>,
    /// Older shards exist beyond the requested window.
    pub has_more: bool,
    /// Content hash of every fetched file as the remote stores it.
    #[serde(skip)]
    pub file_hashes: FileHashes,
}

impl DownloadReport {
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

/// Result of a destructive pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullReport {
    pub records: usize,
    pub files: usize,
    pub settings_applied: bool,
    pub last_sync_at: Option<i64>,
}

/// Result of a bidirectional merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub new_from_remote: usize,
    pub updated_from_remote: usize,
    pub total_records: usize,
    pub upload: UploadReport,
    pub last_sync_at: Option<i64>,
}

/// Result of the one-shot [`sync`](super::SyncEngine::sync) driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    InSync { last_sync_at: Option<i64> },
    Pushed(UploadReport),
    Merged(MergeReport),
    /// Both sides changed and the policy forbids merging unattended.
    ConflictDetected(ConflictAnalysis),
}

/// Caller's choices for [`sync`](super::SyncEngine::sync).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncPolicy {
    pub merge_on_conflict: bool,
}
