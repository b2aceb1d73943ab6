//! Closed error taxonomy for remote operations.

use std::fmt;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::compact_text;

/// Every remote failure maps onto exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteErrorKind {
    /// Invalid or expired credential
    Auth,
    /// Credential lacks write access
    Permission,
    /// Repository, branch or path missing
    NotFound,
    /// Remote moved under an optimistic-concurrency write
    Conflict,
    RateLimit,
    /// Anything else, network failures included
    Unknown,
}

impl RemoteErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "AUTH",
            Self::Permission => "PERMISSION",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::RateLimit => "RATE_LIMIT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A machine-readable kind plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

pub type RemoteResult<T> = Result<T, RemoteError>;

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Unknown, message)
    }

    /// Build an error from a non-success HTTP response.
    pub fn from_status(
        status: StatusCode,
        rate_limit_remaining: Option<u64>,
        body: &str,
    ) -> Self {
        let message = api_message(body);
        let kind = classify_status(status, rate_limit_remaining, &message);
        let message = if message.is_empty() {
            format!("HTTP {}", status.as_u16())
        } else {
            format!("{message} ({})", status.as_u16())
        };
        Self { kind, message }
    }

    #[must_use]
    pub fn is(&self, kind: RemoteErrorKind) -> bool {
        self.kind == kind
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return Self::from_status(status, None, "");
        }
        let message = if error.is_timeout() {
            format!("request timed out: {error}")
        } else {
            format!("request failed: {error}")
        };
        Self::unknown(message)
    }
}

/// Map an HTTP status onto the taxonomy.
pub fn classify_status(
    status: StatusCode,
    rate_limit_remaining: Option<u64>,
    message: &str,
) -> RemoteErrorKind {
    let lowered = message.to_ascii_lowercase();
    match status {
        StatusCode::UNAUTHORIZED => RemoteErrorKind::Auth,
        StatusCode::TOO_MANY_REQUESTS => RemoteErrorKind::RateLimit,
        StatusCode::FORBIDDEN
            if rate_limit_remaining == Some(0) || lowered.contains("rate limit") =>
        {
            RemoteErrorKind::RateLimit
        }
        StatusCode::FORBIDDEN => RemoteErrorKind::Permission,
        StatusCode::NOT_FOUND => RemoteErrorKind::NotFound,
        StatusCode::CONFLICT => RemoteErrorKind::Conflict,
        StatusCode::UNPROCESSABLE_ENTITY
            if lowered.contains("sha")
                || lowered.contains("fast forward")
                || lowered.contains("does not match") =>
        {
            RemoteErrorKind::Conflict
        }
        _ => RemoteErrorKind::Unknown,
    }
}

#[derive(Debug, serde::Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

fn api_message(body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message {
            return compact_text(&message);
        }
    }
    compact_text(body)
}
