use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::LlmError;

/// Crate-level errors. These are fatal and surface before a batch starts;
/// item-level failures never take this path.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Invalid batch settings: {0}")]
    InvalidSettings(String),

    #[error("Duplicate work item id in batch: {0}")]
    DuplicateItem(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("LLM client error: {0}")]
    Llm(#[from] LlmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Classifies a failed attempt (or a failed item) for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The attempt exceeded its deadline.
    Timeout,
    /// Network failure, HTTP error or throttling from the remote side.
    TransientRemote,
    /// The remote call succeeded but its content failed structural parsing.
    MalformedResponse,
    /// Terminal: every allowed attempt failed.
    ExhaustedRetries,
}

impl ErrorKind {
    /// Whether another attempt may follow an error of this kind.
    ///
    /// `retry_malformed` is the call-site policy for structurally invalid replies.
    pub fn is_retriable(self, retry_malformed: bool) -> bool {
        match self {
            ErrorKind::Timeout | ErrorKind::TransientRemote => true,
            ErrorKind::MalformedResponse => retry_malformed,
            ErrorKind::ExhaustedRetries => false,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Timeout => write!(f, "Timeout"),
            ErrorKind::TransientRemote => write!(f, "Transient remote error"),
            ErrorKind::MalformedResponse => write!(f, "Malformed response"),
            ErrorKind::ExhaustedRetries => write!(f, "Exhausted retries"),
        }
    }
}

/// Error produced by a single attempt of an item-processing function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ItemError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ItemError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("no reply within {}s", after.as_secs_f64()),
        )
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientRemote, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedResponse, message)
    }
}

impl From<LlmError> for ItemError {
    fn from(err: LlmError) -> Self {
        let kind = match &err {
            LlmError::Timeout => ErrorKind::Timeout,
            LlmError::ParseError(_) => ErrorKind::MalformedResponse,
            LlmError::RateLimited { .. } | LlmError::ApiError { .. } | LlmError::NetworkError(_) => {
                ErrorKind::TransientRemote
            }
        };
        Self::new(kind, err.to_string())
    }
}
