use std::io;

use tally_core::remote::RemoteError;
use tally_core::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tally_core::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Credential storage error: {0}")]
    Credentials(String),
    #[error(
        "Sync is not configured. Run `tally config init --repo owner/name --token <TOKEN>`, or set TALLY_GITHUB_REPO and TALLY_GITHUB_TOKEN."
    )]
    SyncNotConfigured,
    #[error("No token stored for profile '{0}'. Pass --token to `tally config init` or set TALLY_GITHUB_TOKEN.")]
    MissingToken(String),
    #[error("Cancelled")]
    Cancelled,
}
