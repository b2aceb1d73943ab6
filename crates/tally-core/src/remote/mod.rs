//! Remote repository client.
//!
//! Two tiers: simple per-file operations (read, list, write, delete) that each
//! create their own commit, and the low-level object primitives that
//! [`batch_commit`] strings together into one all-or-nothing commit.

mod batch;
mod error;
#[cfg(test)]
pub(crate) mod fake;
mod github;
mod types;

use async_trait::async_trait;

pub use batch::batch_commit;
pub use error::{classify_status, RemoteError, RemoteErrorKind, RemoteResult};
pub use github::GithubClient;
pub use types::{
    AccessReport, CommitResult, CommitStep, FileUpload, RemoteContent, RemoteFile, TreeEntry,
};

/// Operations against the remote replica, scoped to one repository and branch.
///
/// Revision tokens (`sha`) are opaque and must never outlive the operation
/// that obtained them.
#[async_trait]
pub trait RemoteRepository: Send + Sync {
    /// Read a file; `Ok(None)` when it doesn't exist.
    async fn read_file(&self, path: &str) -> RemoteResult<Option<RemoteContent>>;

    /// List the files (not subdirectories) of a directory; empty when missing.
    async fn list_files(&self, dir: &str) -> RemoteResult<Vec<RemoteFile>>;

    /// Create (`sha == None`) or replace a file, returning its new revision.
    async fn write_file(
        &self,
        path: &str,
        content: &str,
        sha: Option<&str>,
        message: &str,
    ) -> RemoteResult<String>;

    async fn delete_file(&self, path: &str, sha: &str, message: &str) -> RemoteResult<()>;

    /// Time (Unix ms) of the newest commit on the branch; `None` for an empty
    /// repository.
    async fn latest_commit_timestamp(&self) -> RemoteResult<Option<i64>>;

    /// Commit the branch currently points at.
    async fn branch_head(&self) -> RemoteResult<String>;

    /// Root tree of a commit.
    async fn commit_tree(&self, commit_sha: &str) -> RemoteResult<String>;

    /// Store an immutable content object, returning its handle.
    async fn create_blob(&self, content: &str) -> RemoteResult<String>;

    /// Build a tree from `base_tree` with `entries` applied on top.
    async fn create_tree(&self, base_tree: &str, entries: &[TreeEntry]) -> RemoteResult<String>;

    async fn create_commit(
        &self,
        message: &str,
        tree_sha: &str,
        parent_sha: &str,
    ) -> RemoteResult<String>;

    /// Move the branch to `commit_sha`. Never forced: fails with
    /// [`RemoteErrorKind::Conflict`] when the branch moved meanwhile.
    async fn update_ref(&self, commit_sha: &str) -> RemoteResult<()>;

    /// Login of the authenticated user.
    async fn current_user(&self) -> RemoteResult<String>;

    /// Permission level of `login` on the repository.
    async fn collaborator_permission(&self, login: &str) -> RemoteResult<String>;

    /// Check that the credential can write to the repository.
    async fn verify_access(&self) -> RemoteResult<AccessReport> {
        let login = self.current_user().await?;
        let permission = self.collaborator_permission(&login).await?;
        let report = AccessReport { login, permission };
        if report.can_write() {
            Ok(report)
        } else {
            Err(RemoteError::new(
                RemoteErrorKind::Permission,
                format!(
                    "{} has '{}' access; write access is required",
                    report.login, report.permission
                ),
            ))
        }
    }
}
