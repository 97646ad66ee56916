//! Error types for the HTTP providers

use std::time::Duration;

use clausebook_core::ClausebookError;
use thiserror::Error;

/// Errors raised while talking to a remote model API
#[derive(Error, Debug)]
pub enum ProviderError {
    /// No API key configured for an endpoint that needs one
    #[error("no API key configured (set MISTRAL_API_KEY or the config file's api_key)")]
    MissingApiKey,

    /// Transport failure before a response arrived
    #[error("HTTP error: {0}")]
    Http(String),

    /// The request exceeded the client timeout
    #[error("request timed out")]
    TimedOut,

    /// The API answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not have the expected shape
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::TimedOut
        } else {
            ProviderError::Http(err.to_string())
        }
    }
}

impl ProviderError {
    /// Map onto the pipeline taxonomy. Timeouts keep their own kind;
    /// everything else is an upstream failure for `context`.
    pub fn into_clausebook(self, context: &str, timeout: Duration) -> ClausebookError {
        match self {
            ProviderError::TimedOut => ClausebookError::timeout(context, timeout),
            other => ClausebookError::upstream(context, other.to_string()),
        }
    }
}

pub(crate) fn body_preview(body: &str) -> String {
    const MAX: usize = 300;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX).collect();
        format!("{cut}…")
    }
}
