//! Error types for provider calls.

use thiserror::Error;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors returned by the image-synthesis and text-to-speech providers.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("invalid prompt: {0}")]
    InvalidPrompt(String),

    #[error("input cannot be empty")]
    EmptyInput,

    #[error("text too long: {len} characters (max {max})")]
    TextTooLong { len: usize, max: usize },

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("transient provider failure: {0}")]
    Transient(String),

    #[error("provider returned no usable output: {0}")]
    EmptyResponse(String),

    #[error("missing configuration: {0}")]
    MissingConfig(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited(_) | ProviderError::Transient(_) => true,
            ProviderError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Whether this failure came from a rate-limit signal (slower backoff).
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited(_))
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }
}
