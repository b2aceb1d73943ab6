//! Sync orchestrator: push, pull and merge between the local ledger and the
//! remote repository.

mod engine;
mod guard;
mod report;

use thiserror::Error;

use crate::remote::{RemoteError, RemoteErrorKind};

pub use engine::SyncEngine;
pub use guard::SyncState;
pub use report::{
    DirectionReport, DownloadReport, FileFailure, MergeReport, PullReport, SyncDirection,
    SyncOutcome, SyncPolicy, UploadReport,
};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("A sync operation is already in progress")]
    Busy,
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Local(#[from] crate::Error),
    #[error("Remote file {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: crate::Error,
    },
}

impl SyncError {
    /// Remote error kind, when the failure came from the remote.
    #[must_use]
    pub const fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            Self::Remote(error) => Some(error.kind),
            _ => None,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
