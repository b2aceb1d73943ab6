//! In-memory remote with git-like semantics for exercising sync flows.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{RemoteContent, RemoteError, RemoteErrorKind, RemoteFile, RemoteRepository};
use super::{RemoteResult, TreeEntry};
use crate::hash_store::content_hash;

const CLOCK_START: i64 = 1_700_000_000_000;
const CLOCK_STEP: i64 = 1_000;

struct FakeCommit {
    tree: String,
    parent: Option<String>,
    timestamp: i64,
}

struct Failure {
    method: &'static str,
    nth: Option<usize>,
    path: Option<String>,
    kind: RemoteErrorKind,
}

struct State {
    blobs: HashMap<String, String>,
    trees: HashMap<String, BTreeMap<String, String>>,
    commits: HashMap<String, FakeCommit>,
    head: Option<String>,
    clock: i64,
    next_id: usize,
    calls: Vec<&'static str>,
    call_counts: HashMap<&'static str, usize>,
    failures: Vec<Failure>,
    advance_during: Option<&'static str>,
    permission: String,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn tick(&mut self) -> i64 {
        self.clock += CLOCK_STEP;
        self.clock
    }

    fn head_tree(&self) -> BTreeMap<String, String> {
        self.head
            .as_ref()
            .and_then(|head| self.commits.get(head))
            .and_then(|commit| self.trees.get(&commit.tree))
            .cloned()
            .unwrap_or_default()
    }

    fn store_blob(&mut self, content: &str) -> String {
        let sha = content_hash(content);
        self.blobs.insert(sha.clone(), content.to_string());
        sha
    }

    /// Apply changes as one commit on top of head and move head to it.
    fn commit_changes(&mut self, changes: &[(&str, Option<&str>)]) -> String {
        let mut tree = self.head_tree();
        for (path, content) in changes {
            match content {
                Some(content) => {
                    let sha = self.store_blob(content);
                    tree.insert((*path).to_string(), sha);
                }
                None => {
                    tree.remove(*path);
                }
            }
        }
        let tree_id = self.next_id("t");
        self.trees.insert(tree_id.clone(), tree);
        let commit_id = self.next_id("c");
        let timestamp = self.tick();
        self.commits.insert(
            commit_id.clone(),
            FakeCommit {
                tree: tree_id,
                parent: self.head.clone(),
                timestamp,
            },
        );
        self.head = Some(commit_id.clone());
        commit_id
    }
}

/// Git-like fake: content-addressed blobs, snapshot trees, non-forced refs.
pub struct FakeRemote {
    state: Mutex<State>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                blobs: HashMap::new(),
                trees: HashMap::new(),
                commits: HashMap::new(),
                head: None,
                clock: CLOCK_START,
                next_id: 0,
                calls: Vec::new(),
                call_counts: HashMap::new(),
                failures: Vec::new(),
                advance_during: None,
                permission: "write".to_string(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Commit a file as if another device had pushed it.
    pub fn seed_file(&self, path: &str, content: &str) -> i64 {
        let mut state = self.lock();
        state.commit_changes(&[(path, Some(content))]);
        state.clock
    }

    /// Delete a file as if another device had removed it.
    pub fn remove_file(&self, path: &str) -> i64 {
        let mut state = self.lock();
        state.commit_changes(&[(path, None)]);
        state.clock
    }

    pub fn file(&self, path: &str) -> Option<String> {
        let state = self.lock();
        state
            .head_tree()
            .get(path)
            .and_then(|sha| state.blobs.get(sha))
            .cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock().head_tree().into_keys().collect()
    }

    pub fn head(&self) -> Option<String> {
        self.lock().head.clone()
    }

    pub fn latest_timestamp(&self) -> Option<i64> {
        let state = self.lock();
        state
            .head
            .as_ref()
            .and_then(|head| state.commits.get(head))
            .map(|commit| commit.timestamp)
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.lock().calls.clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| **call == method)
            .count()
    }

    pub fn clear_calls(&self) {
        let mut state = self.lock();
        state.calls.clear();
        state.call_counts.clear();
    }

    /// Fail only the `nth` (1-based) call of `method`.
    pub fn fail_nth(&self, method: &'static str, nth: usize, kind: RemoteErrorKind) {
        self.lock().failures.push(Failure {
            method,
            nth: Some(nth),
            path: None,
            kind,
        });
    }

    /// Fail every call of `method`.
    pub fn fail_always(&self, method: &'static str, kind: RemoteErrorKind) {
        self.lock().failures.push(Failure {
            method,
            nth: None,
            path: None,
            kind,
        });
    }

    /// Fail every call of `method` that targets `path`.
    pub fn fail_path(&self, method: &'static str, path: &str, kind: RemoteErrorKind) {
        self.lock().failures.push(Failure {
            method,
            nth: None,
            path: Some(path.to_string()),
            kind,
        });
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Have another writer move the branch while `method` runs.
    pub fn advance_branch_during(&self, method: &'static str) {
        self.lock().advance_during = Some(method);
    }

    pub fn set_permission(&self, permission: &str) {
        self.lock().permission = permission.to_string();
    }

    fn enter(&self, method: &'static str, path: Option<&str>) -> RemoteResult<MutexGuard<'_, State>> {
        let mut state = self.lock();
        state.calls.push(method);
        let count = {
            let count = state.call_counts.entry(method).or_insert(0);
            *count += 1;
            *count
        };

        if state.advance_during == Some(method) {
            state.advance_during = None;
            state.commit_changes(&[("concurrent.txt", Some("someone else"))]);
        }

        let failure = state.failures.iter().find(|failure| {
            failure.method == method
                && failure.nth.map_or(true, |nth| nth == count)
                && failure
                    .path
                    .as_deref()
                    .map_or(true, |expected| Some(expected) == path)
        });
        if let Some(failure) = failure {
            return Err(RemoteError::new(
                failure.kind,
                format!("injected {method} failure"),
            ));
        }
        Ok(state)
    }
}

fn not_found(what: &str) -> RemoteError {
    RemoteError::new(RemoteErrorKind::NotFound, format!("{what} not found"))
}

fn conflict(what: &str) -> RemoteError {
    RemoteError::new(RemoteErrorKind::Conflict, what.to_string())
}

#[async_trait]
impl RemoteRepository for FakeRemote {
    async fn read_file(&self, path: &str) -> RemoteResult<Option<RemoteContent>> {
        let state = self.enter("read_file", Some(path))?;
        Ok(state.head_tree().get(path).map(|sha| RemoteContent {
            content: state.blobs[sha].clone(),
            sha: sha.clone(),
        }))
    }

    async fn list_files(&self, dir: &str) -> RemoteResult<Vec<RemoteFile>> {
        let state = self.enter("list_files", Some(dir))?;
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };
        Ok(state
            .head_tree()
            .into_iter()
            .filter_map(|(path, sha)| {
                let name = path.strip_prefix(&prefix)?;
                if name.contains('/') {
                    return None;
                }
                Some(RemoteFile {
                    name: name.to_string(),
                    path: path.clone(),
                    sha,
                })
            })
            .collect())
    }

    async fn write_file(
        &self,
        path: &str,
        content: &str,
        sha: Option<&str>,
        _message: &str,
    ) -> RemoteResult<String> {
        let mut state = self.enter("write_file", Some(path))?;
        let current = state.head_tree().get(path).cloned();
        match (current.as_deref(), sha) {
            (None, None) => {}
            (Some(current), Some(sha)) if current == sha => {}
            (None, Some(_)) => return Err(conflict("file does not exist at that revision")),
            (Some(_), _) => return Err(conflict("sha does not match")),
        }
        state.commit_changes(&[(path, Some(content))]);
        Ok(content_hash(content))
    }

    async fn delete_file(&self, path: &str, sha: &str, _message: &str) -> RemoteResult<()> {
        let mut state = self.enter("delete_file", Some(path))?;
        match state.head_tree().get(path) {
            None => return Err(not_found(path)),
            Some(current) if current != sha => return Err(conflict("sha does not match")),
            Some(_) => {}
        }
        state.commit_changes(&[(path, None)]);
        Ok(())
    }

    async fn latest_commit_timestamp(&self) -> RemoteResult<Option<i64>> {
        let state = self.enter("latest_commit_timestamp", None)?;
        Ok(state
            .head
            .as_ref()
            .and_then(|head| state.commits.get(head))
            .map(|commit| commit.timestamp))
    }

    async fn branch_head(&self) -> RemoteResult<String> {
        let state = self.enter("branch_head", None)?;
        state
            .head
            .clone()
            .ok_or_else(|| conflict("Git Repository is empty."))
    }

    async fn commit_tree(&self, commit_sha: &str) -> RemoteResult<String> {
        let state = self.enter("commit_tree", None)?;
        state
            .commits
            .get(commit_sha)
            .map(|commit| commit.tree.clone())
            .ok_or_else(|| not_found(commit_sha))
    }

    async fn create_blob(&self, content: &str) -> RemoteResult<String> {
        let mut state = self.enter("create_blob", None)?;
        Ok(state.store_blob(content))
    }

    async fn create_tree(&self, base_tree: &str, entries: &[TreeEntry]) -> RemoteResult<String> {
        let mut state = self.enter("create_tree", None)?;
        let mut tree = state
            .trees
            .get(base_tree)
            .cloned()
            .ok_or_else(|| not_found(base_tree))?;
        for entry in entries {
            match &entry.blob_sha {
                Some(sha) if state.blobs.contains_key(sha) => {
                    tree.insert(entry.path.clone(), sha.clone());
                }
                Some(sha) => return Err(RemoteError::unknown(format!("unknown blob {sha}"))),
                None => {
                    tree.remove(&entry.path);
                }
            }
        }
        let tree_id = state.next_id("t");
        state.trees.insert(tree_id.clone(), tree);
        Ok(tree_id)
    }

    async fn create_commit(
        &self,
        _message: &str,
        tree_sha: &str,
        parent_sha: &str,
    ) -> RemoteResult<String> {
        let mut state = self.enter("create_commit", None)?;
        if !state.trees.contains_key(tree_sha) {
            return Err(not_found(tree_sha));
        }
        let commit_id = state.next_id("c");
        let timestamp = state.tick();
        state.commits.insert(
            commit_id.clone(),
            FakeCommit {
                tree: tree_sha.to_string(),
                parent: Some(parent_sha.to_string()),
                timestamp,
            },
        );
        Ok(commit_id)
    }

    async fn update_ref(&self, commit_sha: &str) -> RemoteResult<()> {
        let mut state = self.enter("update_ref", None)?;
        let parent = state
            .commits
            .get(commit_sha)
            .ok_or_else(|| not_found(commit_sha))?
            .parent
            .clone();
        if parent != state.head {
            return Err(conflict("Update is not a fast forward"));
        }
        state.head = Some(commit_sha.to_string());
        Ok(())
    }

    async fn current_user(&self) -> RemoteResult<String> {
        self.enter("current_user", None)?;
        Ok("octo".to_string())
    }

    async fn collaborator_permission(&self, _login: &str) -> RemoteResult<String> {
        let state = self.enter("collaborator_permission", None)?;
        Ok(state.permission.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simple_tier_enforces_revision_tokens() {
        let remote = FakeRemote::new();
        let sha = remote
            .write_file("expenses/a.csv", "one", None, "create")
            .await
            .unwrap();

        let stale = remote.write_file("expenses/a.csv", "two", None, "blind").await;
        assert_eq!(stale.unwrap_err().kind, RemoteErrorKind::Conflict);

        remote
            .write_file("expenses/a.csv", "two", Some(&sha), "update")
            .await
            .unwrap();
        assert_eq!(remote.file("expenses/a.csv").as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn verify_access_requires_write() {
        let remote = FakeRemote::new();
        assert_eq!(remote.verify_access().await.unwrap().login, "octo");

        remote.set_permission("read");
        let error = remote.verify_access().await.unwrap_err();
        assert_eq!(error.kind, RemoteErrorKind::Permission);
    }

    #[tokio::test]
    async fn empty_repository_has_no_timestamp() {
        let remote = FakeRemote::new();
        assert_eq!(remote.latest_commit_timestamp().await.unwrap(), None);
        let at = remote.seed_file("x", "y");
        assert_eq!(remote.latest_commit_timestamp().await.unwrap(), Some(at));
    }
}
