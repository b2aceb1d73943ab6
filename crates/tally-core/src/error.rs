//! Error types for tally-core

use thiserror::Error;

/// Result type alias using tally-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in local tally-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shard content could not be decoded
    #[error("Codec error at line {line}: {message}")]
    Codec {
        /// 1-based line number of the offending row
        line: usize,
        /// What was wrong with it
        message: String,
    },

    /// The local ledger collaborator failed
    #[error("Local store error: {0}")]
    LocalStore(String),
}

impl Error {
    pub(crate) fn codec(line: usize, message: impl Into<String>) -> Self {
        Self::Codec {
            line,
            message: message.into(),
        }
    }
}
