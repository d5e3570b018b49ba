//! Error types shared by the pipeline stages.
//!
//! Errors are grouped the way callers react to them: validation problems are
//! surfaced to the user immediately, transport and response problems are
//! tolerated per page, and cache problems never leave the cache layer.

use thiserror::Error;

/// Errors that can occur while fetching, caching or condensing news.
#[derive(Debug, Error)]
pub enum NewsError {
    /// Caller supplied input that can never succeed (empty query, bad page size, ...)
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Transport-level failure: timeout, refused connection, TLS, ...
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The upstream API answered with a non-success status
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message or body excerpt from the API
        message: String,
    },

    /// Response body could not be decoded or lacked expected fields
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Still rate limited after the single permitted retry
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Cache backend failure
    #[error("Cache error: {0}")]
    Cache(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl NewsError {
    /// Whether the error is the caller's fault and retrying cannot help.
    pub fn is_validation(&self) -> bool {
        matches!(self, NewsError::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, NewsError>;
