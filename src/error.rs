//! Common error type and alias.
//!
//! Variants map onto a small taxonomy (see [`ErrorKind`]) so callers can tell a
//! misconfigured integration from a flaky network from a provider that answered
//! with something unexpected.
use thiserror::Error;

use crate::store::StoreError;

pub type AppResult<T> = Result<T, AppError>;

/// Coarse classification of [`AppError`] used by callers deciding what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or disabled credentials. Not retryable without operator action.
    Configuration,
    /// Non-2xx answers, timeouts and network failures.
    Transport,
    /// The provider answered, but the body violated the expected shape.
    Protocol,
    /// The prompt could not be compiled from the given inputs.
    Prompt,
    NotFound,
    Storage,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("compiled prompt is empty")]
    EmptyPrompt,

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// The submission endpoint answered with a non-2xx status.
    #[error("submission to {url} failed (status {status}, token {masked_token}): {body}")]
    Submission {
        url: String,
        status: u16,
        masked_token: String,
        body: String,
    },

    /// Any other provider endpoint answered with a non-2xx status.
    #[error("request to {url} failed (status {status}, token {masked_token}): {body}")]
    Status {
        url: String,
        status: u16,
        masked_token: String,
        body: String,
    },

    #[error("request to {url} failed (token {masked_token}): {source}")]
    Transport {
        url: String,
        masked_token: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("download of {url} failed with status {status}")]
    Download { url: String, status: u16 },

    #[error("provider response carried no job id: {body}")]
    MissingJobId { body: String },

    #[error("malformed provider response: {0}")]
    Protocol(String),

    #[error("node '{node_id}' not found in project '{project_id}'")]
    NodeNotFound { project_id: String, node_id: String },

    #[error("node '{node_id}' has no active job")]
    NoActiveJob { node_id: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Configuration(_) => ErrorKind::Configuration,
            AppError::Submission { .. }
            | AppError::Status { .. }
            | AppError::Transport { .. }
            | AppError::Download { .. }
            | AppError::HttpClient(_) => ErrorKind::Transport,
            AppError::MissingJobId { .. } | AppError::Protocol(_) => ErrorKind::Protocol,
            AppError::EmptyPrompt | AppError::InvalidParameter { .. } => ErrorKind::Prompt,
            AppError::NodeNotFound { .. } | AppError::NoActiveJob { .. } => ErrorKind::NotFound,
            AppError::Store(_) | AppError::Io(_) => ErrorKind::Storage,
        }
    }

    /// True when the underlying transport gave up waiting for the provider.
    pub fn is_timeout(&self) -> bool {
        match self {
            AppError::Transport { source, .. } | AppError::HttpClient(source) => source.is_timeout(),
            _ => false,
        }
    }

    pub(crate) fn node_not_found(project_id: &str, node_id: &str) -> Self {
        AppError::NodeNotFound {
            project_id: project_id.to_string(),
            node_id: node_id.to_string(),
        }
    }
}
