//! GitHub REST implementation of [`RemoteRepository`].

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::DateTime;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::{RemoteError, RemoteErrorKind, RemoteResult};
use super::types::{RemoteContent, RemoteFile, TreeEntry};
use super::RemoteRepository;
use crate::config::SyncConfig;

const API_VERSION: &str = "2022-11-28";
const CLIENT_USER_AGENT: &str = concat!("tally/", env!("CARGO_PKG_VERSION"));
const FILE_MODE: &str = "100644";

/// Client for one repository + branch on GitHub (or GitHub Enterprise).
#[derive(Clone)]
pub struct GithubClient {
    client: Client,
    api_base_url: String,
    owner: String,
    repo: String,
    branch: String,
    token: String,
}

impl std::fmt::Debug for GithubClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("GithubClient")
            .field("api_base_url", &self.api_base_url)
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl GithubClient {
    pub fn new(config: &SyncConfig) -> RemoteResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(API_VERSION),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            owner: config.repository.owner.clone(),
            repo: config.repository.name.clone(),
            branch: config.branch.clone(),
            token: config.token.clone(),
        })
    }

    fn repo_url(&self, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}/{suffix}",
            self.api_base_url, self.owner, self.repo
        )
    }

    fn contents_url(&self, path: &str) -> String {
        self.repo_url(&format!("contents/{}", encode_path(path)))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = self.authorized(request).send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(error_from_response(response).await)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> RemoteResult<T> {
        let response = self.send(request).await?;
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|error| RemoteError::unknown(format!("unexpected response payload: {error}")))
    }

    async fn read_blob(&self, sha: &str) -> RemoteResult<String> {
        let blob: BlobResponse = self
            .send_json(self.client.get(self.repo_url(&format!("git/blobs/{sha}"))))
            .await?;
        decode_base64_content(&blob.content)
    }
}

#[async_trait]
impl RemoteRepository for GithubClient {
    async fn read_file(&self, path: &str) -> RemoteResult<Option<RemoteContent>> {
        let request = self
            .client
            .get(self.contents_url(path))
            .query(&[("ref", self.branch.as_str())]);

        let file: ContentsFile = match self.send_json(request).await {
            Ok(file) => file,
            Err(error) if error.is(RemoteErrorKind::NotFound) => return Ok(None),
            Err(error) => return Err(error),
        };

        // The contents endpoint omits bodies above 1 MB; fall back to the blob.
        let content = match file.content.as_deref() {
            Some(encoded) if file.encoding.as_deref() == Some("base64") => {
                decode_base64_content(encoded)?
            }
            _ => self.read_blob(&file.sha).await?,
        };

        Ok(Some(RemoteContent {
            content,
            sha: file.sha,
        }))
    }

    async fn list_files(&self, dir: &str) -> RemoteResult<Vec<RemoteFile>> {
        let request = self
            .client
            .get(self.contents_url(dir))
            .query(&[("ref", self.branch.as_str())]);

        let entries: Vec<ContentsEntry> = match self.send_json(request).await {
            Ok(entries) => entries,
            Err(error) if error.is(RemoteErrorKind::NotFound) => return Ok(Vec::new()),
            Err(error) => return Err(error),
        };

        Ok(entries
            .into_iter()
            .filter(|entry| entry.kind == "file")
            .map(|entry| RemoteFile {
                name: entry.name,
                path: entry.path,
                sha: entry.sha,
            })
            .collect())
    }

    async fn write_file(
        &self,
        path: &str,
        content: &str,
        sha: Option<&str>,
        message: &str,
    ) -> RemoteResult<String> {
        let body = PutContentsRequest {
            message,
            content: BASE64.encode(content.as_bytes()),
            sha,
            branch: &self.branch,
        };
        let response: PutContentsResponse = self
            .send_json(self.client.put(self.contents_url(path)).json(&body))
            .await?;
        Ok(response.content.sha)
    }

    async fn delete_file(&self, path: &str, sha: &str, message: &str) -> RemoteResult<()> {
        let body = DeleteContentsRequest {
            message,
            sha,
            branch: &self.branch,
        };
        self.send(self.client.delete(self.contents_url(path)).json(&body))
            .await?;
        Ok(())
    }

    async fn latest_commit_timestamp(&self) -> RemoteResult<Option<i64>> {
        let request = self
            .client
            .get(self.repo_url("commits"))
            .query(&[("sha", self.branch.as_str()), ("per_page", "1")]);

        let commits: Vec<CommitListItem> = match self.send_json(request).await {
            Ok(commits) => commits,
            Err(error) if is_empty_repository(&error) => return Ok(None),
            Err(error) => return Err(error),
        };

        commits
            .first()
            .map(|item| parse_commit_date(&item.commit.committer.date))
            .transpose()
    }

    async fn branch_head(&self) -> RemoteResult<String> {
        let url = self.repo_url(&format!("git/ref/heads/{}", encode_path(&self.branch)));
        let reference: RefResponse = self.send_json(self.client.get(url)).await?;
        Ok(reference.object.sha)
    }

    async fn commit_tree(&self, commit_sha: &str) -> RemoteResult<String> {
        let url = self.repo_url(&format!("git/commits/{commit_sha}"));
        let commit: GitCommitResponse = self.send_json(self.client.get(url)).await?;
        Ok(commit.tree.sha)
    }

    async fn create_blob(&self, content: &str) -> RemoteResult<String> {
        let body = CreateBlobRequest {
            content: BASE64.encode(content.as_bytes()),
            encoding: "base64",
        };
        let created: ShaResponse = self
            .send_json(self.client.post(self.repo_url("git/blobs")).json(&body))
            .await?;
        Ok(created.sha)
    }

    async fn create_tree(&self, base_tree: &str, entries: &[TreeEntry]) -> RemoteResult<String> {
        let body = CreateTreeRequest {
            base_tree,
            tree: entries
                .iter()
                .map(|entry| TreeEntryRequest {
                    path: &entry.path,
                    mode: FILE_MODE,
                    kind: "blob",
                    sha: entry.blob_sha.as_deref(),
                })
                .collect(),
        };
        let created: ShaResponse = self
            .send_json(self.client.post(self.repo_url("git/trees")).json(&body))
            .await?;
        Ok(created.sha)
    }

    async fn create_commit(
        &self,
        message: &str,
        tree_sha: &str,
        parent_sha: &str,
    ) -> RemoteResult<String> {
        let body = CreateCommitRequest {
            message,
            tree: tree_sha,
            parents: vec![parent_sha],
        };
        let created: ShaResponse = self
            .send_json(self.client.post(self.repo_url("git/commits")).json(&body))
            .await?;
        Ok(created.sha)
    }

    async fn update_ref(&self, commit_sha: &str) -> RemoteResult<()> {
        let url = self.repo_url(&format!("git/refs/heads/{}", encode_path(&self.branch)));
        let body = UpdateRefRequest {
            sha: commit_sha,
            force: false,
        };
        self.send(self.client.patch(url).json(&body)).await?;
        Ok(())
    }

    async fn current_user(&self) -> RemoteResult<String> {
        let url = format!("{}/user", self.api_base_url);
        let user: UserResponse = self.send_json(self.client.get(url)).await?;
        Ok(user.login)
    }

    async fn collaborator_permission(&self, login: &str) -> RemoteResult<String> {
        let url = self.repo_url(&format!(
            "collaborators/{}/permission",
            urlencoding::encode(login)
        ));
        let permission: PermissionResponse = self.send_json(self.client.get(url)).await?;
        Ok(permission.permission)
    }
}

async fn error_from_response(response: Response) -> RemoteError {
    let status = response.status();
    let rate_limit_remaining = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    RemoteError::from_status(status, rate_limit_remaining, &body)
}

fn is_empty_repository(error: &RemoteError) -> bool {
    error.is(RemoteErrorKind::Conflict) && error.message.to_ascii_lowercase().contains("empty")
}

/// Percent-encode each segment of a repository path, keeping separators.
fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Decode base64 content as returned by the API (wrapped at 60 columns).
fn decode_base64_content(encoded: &str) -> RemoteResult<String> {
    let compact: String = encoded.chars().filter(|ch| !ch.is_whitespace()).collect();
    let bytes = BASE64
        .decode(compact)
        .map_err(|error| RemoteError::unknown(format!("invalid base64 content: {error}")))?;
    String::from_utf8(bytes)
        .map_err(|error| RemoteError::unknown(format!("file is not valid UTF-8: {error}")))
}

fn parse_commit_date(raw: &str) -> RemoteResult<i64> {
    DateTime::parse_from_rfc3339(raw)
        .map(|date| date.timestamp_millis())
        .map_err(|error| RemoteError::unknown(format!("invalid commit date '{raw}': {error}")))
}

#[derive(Debug, Deserialize)]
struct ContentsFile {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentsEntry {
    name: String,
    path: String,
    sha: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct BlobResponse {
    content: String,
}

#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    branch: &'a str,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    content: ShaResponse,
}

#[derive(Debug, Serialize)]
struct DeleteContentsRequest<'a> {
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
}

#[derive(Debug, Deserialize)]
struct CommitListItem {
    commit: CommitListDetail,
}

#[derive(Debug, Deserialize)]
struct CommitListDetail {
    committer: CommitSignature,
}

#[derive(Debug, Deserialize)]
struct CommitSignature {
    date: String,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: ShaResponse,
}

#[derive(Debug, Deserialize)]
struct GitCommitResponse {
    tree: ShaResponse,
}

#[derive(Debug, Deserialize)]
struct ShaResponse {
    sha: String,
}

#[derive(Debug, Serialize)]
struct CreateBlobRequest {
    content: String,
    encoding: &'static str,
}

#[derive(Debug, Serialize)]
struct CreateTreeRequest<'a> {
    base_tree: &'a str,
    tree: Vec<TreeEntryRequest<'a>>,
}

/// `sha: null` removes the path from the new tree.
#[derive(Debug, Serialize)]
struct TreeEntryRequest<'a> {
    path: &'a str,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    sha: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct CreateCommitRequest<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct UpdateRefRequest<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

#[derive(Debug, Deserialize)]
struct PermissionResponse {
    permission: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GithubClient {
        let config = SyncConfig::new("ghp_secret", "octo/ledger")
            .unwrap()
            .with_branch("feature/sync")
            .unwrap();
        GithubClient::new(&config).unwrap()
    }

    #[test]
    fn urls_encode_paths_and_branch() {
        let client = client();
        assert_eq!(
            client.contents_url("expenses/with space.csv"),
            "https://api.github.com/repos/octo/ledger/contents/expenses/with%20space.csv"
        );
        assert_eq!(
            client.contents_url(""),
            "https://api.github.com/repos/octo/ledger/contents/"
        );
        assert_eq!(encode_path("/a//b/"), "a/b");
    }

    #[test]
    fn debug_redacts_token() {
        let debug = format!("{:?}", client());
        assert!(!debug.contains("ghp_secret"));
    }

    #[test]
    fn decodes_wrapped_base64() {
        let encoded = "aWQsYW1vdW50\nLGNhdGVnb3J5\n";
        assert_eq!(decode_base64_content(encoded).unwrap(), "id,amount,category");
        assert!(decode_base64_content("***").is_err());
    }

    #[test]
    fn parses_commit_dates() {
        assert_eq!(
            parse_commit_date("2024-03-01T12:00:00Z").unwrap(),
            1_709_294_400_000
        );
        assert!(parse_commit_date("not a date").is_err());
    }

    #[test]
    fn tree_deletions_serialize_null_sha() {
        let entry = TreeEntryRequest {
            path: "expenses/a.csv",
            mode: FILE_MODE,
            kind: "blob",
            sha: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["sha"], serde_json::Value::Null);
        assert_eq!(json["type"], "blob");
    }

    #[test]
    fn put_request_omits_sha_for_new_files() {
        let body = PutContentsRequest {
            message: "m",
            content: "YQ==".to_string(),
            sha: None,
            branch: "main",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("sha").is_none());
    }

    #[test]
    fn empty_repository_detection() {
        let empty = RemoteError::from_status(
            StatusCode::CONFLICT,
            None,
            r#"{"message":"Git Repository is empty."}"#,
        );
        assert!(is_empty_repository(&empty));
        let other = RemoteError::new(RemoteErrorKind::Conflict, "sha does not match");
        assert!(!is_empty_repository(&other));
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "Requires TALLY_GITHUB_* env vars plus network access"]
    async fn github_access_and_listing() {
        let _ = dotenvy::dotenv();

        let config = SyncConfig::from_env()
            .expect("sync env parsing should not error")
            .expect("sync config should be present");
        let client = GithubClient::new(&config).unwrap();

        let access = client
            .verify_access()
            .await
            .unwrap_or_else(|error| panic!("access check failed: {error}"));
        assert!(access.can_write());

        client
            .list_files(&config.directory)
            .await
            .unwrap_or_else(|error| panic!("listing failed: {error}"));
    }
}
