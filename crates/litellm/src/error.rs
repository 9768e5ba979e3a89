//! LiteLLM client error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LiteLlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LiteLLM returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Invalid response from LiteLLM: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LiteLlmError {
    /// Returns true if this error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            LiteLlmError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            LiteLlmError::Upstream { status, .. } => *status == 429 || *status >= 500,
            LiteLlmError::InvalidResponse(_) => false,
            LiteLlmError::Config(_) => false,
        }
    }
}

pub type LiteLlmResult<T> = Result<T, LiteLlmError>;
