//! Atomic multi-file commit over the object primitives.

use super::types::{CommitResult, CommitStep, FileUpload, TreeEntry};
use super::{RemoteError, RemoteRepository};

/// Commit every upload and deletion as a single new commit on the branch.
///
/// Steps run strictly in order: head → base tree → blobs → tree → commit →
/// ref update. Only the ref update is visible to other readers, so a failure
/// at any earlier step leaves the remote untouched. A `Conflict` from the ref
/// update means the branch moved; the caller must rerun the whole batch, not
/// just the last step.
pub async fn batch_commit<R: RemoteRepository + ?Sized>(
    remote: &R,
    uploads: &[FileUpload],
    deletions: &[String],
    message: &str,
) -> CommitResult {
    if uploads.is_empty() && deletions.is_empty() {
        return CommitResult::empty();
    }

    match run_steps(remote, uploads, deletions, message).await {
        Ok(commit_sha) => {
            tracing::info!(
                "Committed {} upload(s) and {} deletion(s) as {}",
                uploads.len(),
                deletions.len(),
                commit_sha
            );
            CommitResult::committed(commit_sha)
        }
        Err((step, error)) => {
            tracing::warn!("Batch commit failed at {}: {}", step, error);
            CommitResult::failed(step, &error)
        }
    }
}

async fn run_steps<R: RemoteRepository + ?Sized>(
    remote: &R,
    uploads: &[FileUpload],
    deletions: &[String],
    message: &str,
) -> Result<String, (CommitStep, RemoteError)> {
    let at = |step: CommitStep| move |error: RemoteError| (step, error);

    let head = remote
        .branch_head()
        .await
        .map_err(at(CommitStep::ResolveHead))?;
    let base_tree = remote
        .commit_tree(&head)
        .await
        .map_err(at(CommitStep::ResolveTree))?;

    let mut entries = Vec::with_capacity(uploads.len() + deletions.len());
    for upload in uploads {
        let blob_sha = remote
            .create_blob(&upload.content)
            .await
            .map_err(at(CommitStep::CreateBlob))?;
        tracing::debug!("Created blob {} for {}", blob_sha, upload.path);
        entries.push(TreeEntry::blob(&upload.path, blob_sha));
    }
    entries.extend(deletions.iter().map(TreeEntry::deletion));

    let tree = remote
        .create_tree(&base_tree, &entries)
        .await
        .map_err(at(CommitStep::CreateTree))?;
    let commit = remote
        .create_commit(message, &tree, &head)
        .await
        .map_err(at(CommitStep::CreateCommit))?;
    remote
        .update_ref(&commit)
        .await
        .map_err(at(CommitStep::UpdateRef))?;

    Ok(commit)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::remote::fake::FakeRemote;
    use crate::remote::RemoteErrorKind;

    fn upload(path: &str, content: &str) -> FileUpload {
        FileUpload {
            path: path.to_string(),
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn empty_batch_makes_no_calls() {
        let remote = FakeRemote::new();
        let result = batch_commit(&remote, &[], &[], "noop").await;
        assert_eq!(result, CommitResult::empty());
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn commits_uploads_and_deletions_together() {
        let remote = FakeRemote::new();
        remote.seed_file("expenses/old.csv", "old");
        remote.seed_file("expenses/keep.csv", "keep");

        let result = batch_commit(
            &remote,
            &[upload("expenses/new.csv", "new")],
            &["expenses/old.csv".to_string()],
            "sync",
        )
        .await;

        assert!(result.success);
        assert!(result.new_remote_revision.is_some());
        assert_eq!(
            remote.paths(),
            vec!["expenses/keep.csv".to_string(), "expenses/new.csv".to_string()]
        );
        assert_eq!(
            remote.calls(),
            vec![
                "branch_head",
                "commit_tree",
                "create_blob",
                "create_tree",
                "create_commit",
                "update_ref",
            ]
        );
    }

    #[tokio::test]
    async fn blob_failure_stops_before_any_visible_step() {
        let remote = FakeRemote::new();
        remote.seed_file("expenses/a.csv", "a");
        let before = remote.head();
        remote.fail_nth("create_blob", 2, RemoteErrorKind::RateLimit);

        let result = batch_commit(
            &remote,
            &[
                upload("expenses/b.csv", "b"),
                upload("expenses/c.csv", "c"),
                upload("expenses/d.csv", "d"),
            ],
            &[],
            "sync",
        )
        .await;

        assert!(!result.success);
        assert_eq!(result.failed_step, Some(CommitStep::CreateBlob));
        assert_eq!(result.error_kind, Some(RemoteErrorKind::RateLimit));
        let calls = remote.calls();
        assert!(!calls.contains(&"create_tree"));
        assert!(!calls.contains(&"create_commit"));
        assert!(!calls.contains(&"update_ref"));
        assert_eq!(remote.head(), before);
        assert_eq!(remote.paths(), vec!["expenses/a.csv".to_string()]);
    }

    #[tokio::test]
    async fn moved_branch_surfaces_conflict_from_update_ref() {
        let remote = FakeRemote::new();
        remote.seed_file("expenses/a.csv", "a");
        remote.advance_branch_during("create_commit");

        let result = batch_commit(&remote, &[upload("expenses/b.csv", "b")], &[], "sync").await;

        assert!(!result.success);
        assert_eq!(result.failed_step, Some(CommitStep::UpdateRef));
        assert_eq!(result.error_kind, Some(RemoteErrorKind::Conflict));
        assert!(!remote.paths().contains(&"expenses/b.csv".to_string()));
    }
}
