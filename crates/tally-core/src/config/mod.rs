//! Sync configuration.
//!
//! `SyncConfig` is created and cleared by the user; the sync engine only ever
//! reads it. It is passed in explicitly rather than read from ambient state.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

pub const ENV_TOKEN: &str = "TALLY_GITHUB_TOKEN";
pub const ENV_REPOSITORY: &str = "TALLY_GITHUB_REPO";
pub const ENV_BRANCH: &str = "TALLY_GITHUB_BRANCH";
pub const ENV_DIRECTORY: &str = "TALLY_GITHUB_DIR";
pub const ENV_API_BASE_URL: &str = "TALLY_GITHUB_API_URL";

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_DIRECTORY: &str = "expenses";
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `owner/name` of the remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryId {
    pub owner: String,
    pub name: String,
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepositoryId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_end_matches(".git");
        let trimmed = trimmed
            .strip_prefix("https://github.com/")
            .unwrap_or(trimmed)
            .trim_matches('/');

        let valid_part = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
        };

        match trimmed.split_once('/') {
            Some((owner, name)) if valid_part(owner) && valid_part(name) => Ok(Self {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(Error::InvalidInput(format!(
                "repository must look like 'owner/name', got '{s}'"
            ))),
        }
    }
}

impl TryFrom<String> for RepositoryId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RepositoryId> for String {
    fn from(value: RepositoryId) -> Self {
        value.to_string()
    }
}

/// Everything needed to reach the remote replica.
#[derive(Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Personal access token with `contents: write` on the repository.
    pub token: String,
    pub repository: RepositoryId,
    pub branch: String,
    /// Directory inside the repository holding shards and settings.
    pub directory: String,
    pub api_base_url: String,
    pub request_timeout: Duration,
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SyncConfig")
            .field("token", &"[REDACTED]")
            .field("repository", &self.repository)
            .field("branch", &self.branch)
            .field("directory", &self.directory)
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl SyncConfig {
    /// Build a config with default branch, directory and API endpoint.
    pub fn new(token: impl Into<String>, repository: &str) -> Result<Self> {
        let token = normalize_text_option(Some(token.into()))
            .ok_or_else(|| Error::InvalidInput("GitHub token must not be empty".to_string()))?;
        Ok(Self {
            token,
            repository: repository.parse()?,
            branch: DEFAULT_BRANCH.to_string(),
            directory: DEFAULT_DIRECTORY.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_branch(mut self, branch: &str) -> Result<Self> {
        self.branch = normalize_branch(branch)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_directory(mut self, directory: &str) -> Self {
        self.directory = normalize_directory(directory);
        self
    }

    pub fn with_api_base_url(mut self, url: &str) -> Result<Self> {
        let url = url.trim();
        if !is_http_url(url) {
            return Err(Error::InvalidInput(
                "GitHub API URL must include http:// or https://".to_string(),
            ));
        }
        self.api_base_url = url.trim_end_matches('/').to_string();
        Ok(self)
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Load configuration from `TALLY_GITHUB_*` environment variables.
    ///
    /// Returns `Ok(None)` when neither token nor repository is set.
    /// Returns an error when only a partial configuration is provided.
    pub fn from_env() -> Result<Option<Self>> {
        parse_config(|key| env::var(key).ok())
    }

    /// Repository path of a file inside the configured directory.
    #[must_use]
    pub fn remote_path(&self, file_name: &str) -> String {
        if self.directory.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{file_name}", self.directory)
        }
    }
}

pub fn normalize_branch(branch: &str) -> Result<String> {
    let branch = branch.trim();
    if branch.is_empty()
        || branch.starts_with('/')
        || branch.ends_with('/')
        || branch.contains("..")
        || branch.contains(char::is_whitespace)
    {
        return Err(Error::InvalidInput(format!("invalid branch name: '{branch}'")));
    }
    Ok(branch.to_string())
}

pub fn normalize_directory(directory: &str) -> String {
    directory
        .split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<SyncConfig>> {
    let token = normalize_text_option(lookup(ENV_TOKEN));
    let repository = normalize_text_option(lookup(ENV_REPOSITORY));

    let (token, repository) = match (token, repository) {
        (None, None) => return Ok(None),
        (Some(token), Some(repository)) => (token, repository),
        (None, Some(_)) => {
            return Err(Error::InvalidInput(format!(
                "Sync configuration is incomplete. Missing: {ENV_TOKEN}"
            )))
        }
        (Some(_), None) => {
            return Err(Error::InvalidInput(format!(
                "Sync configuration is incomplete. Missing: {ENV_REPOSITORY}"
            )))
        }
    };

    let mut config = SyncConfig::new(token, &repository)?;
    if let Some(branch) = normalize_text_option(lookup(ENV_BRANCH)) {
        config = config.with_branch(&branch)?;
    }
    if let Some(directory) = lookup(ENV_DIRECTORY) {
        config = config.with_directory(&directory);
    }
    if let Some(url) = normalize_text_option(lookup(ENV_API_BASE_URL)) {
        config = config.with_api_base_url(&url)?;
    }
    Ok(Some(config))
}
