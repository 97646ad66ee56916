//! Error taxonomy for the structuring pipeline.
//!
//! Every variant maps to a stable code via [`ClausebookError::code`] so the
//! surrounding service can translate failures without string matching.

use std::time::Duration;

/// Errors produced by parsing, clustering, playbook generation and their
/// external collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ClausebookError {
    /// Input document format not recognised by extraction.
    #[error("unsupported document format: {path}")]
    UnsupportedFormat { path: String },

    /// LLM (or embedding) output could not be coerced into the expected shape.
    #[error("schema validation failed for {context}: {reason}")]
    SchemaValidation { context: String, reason: String },

    /// Network, auth or quota failure from an upstream service.
    #[error("upstream service error for {context}: {reason}")]
    Upstream { context: String, reason: String },

    /// An external call exceeded its bounded wait.
    #[error("timed out after {after:?} for {context}")]
    Timeout { context: String, after: Duration },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClausebookError {
    pub fn schema(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaValidation {
            context: context.into(),
            reason: reason.into(),
        }
    }

    pub fn upstream(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Upstream {
            context: context.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(context: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            context: context.into(),
            after,
        }
    }

    /// Stable error code for the service boundary.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::SchemaValidation { .. } => "schema_validation",
            Self::Upstream { .. } => "upstream_service",
            Self::Timeout { .. } => "timeout",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Whether a caller may retry the same unit of work with backoff.
    ///
    /// Schema failures are only retryable when the retry policy opts in, so
    /// they are not reported here.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream { .. } | Self::Timeout { .. })
    }

    pub fn is_schema_validation(&self) -> bool {
        matches!(self, Self::SchemaValidation { .. })
    }

    /// Prefix the unit-of-work context with an outer scope, e.g. the
    /// cluster or section being processed.
    pub fn within(self, scope: &str) -> Self {
        match self {
            Self::SchemaValidation { context, reason } => Self::SchemaValidation {
                context: format!("{scope}: {context}"),
                reason,
            },
            Self::Upstream { context, reason } => Self::Upstream {
                context: format!("{scope}: {context}"),
                reason,
            },
            Self::Timeout { context, after } => Self::Timeout {
                context: format!("{scope}: {context}"),
                after,
            },
            other => other,
        }
    }
}

/// Result type for Clausebook operations.
pub type Result<T> = std::result::Result<T, ClausebookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct_per_kind() {
        let errs = [
            ClausebookError::UnsupportedFormat {
                path: "a.txt".into(),
            },
            ClausebookError::schema("parse", "missing title"),
            ClausebookError::upstream("parse", "HTTP 503"),
            ClausebookError::timeout("parse", Duration::from_secs(3)),
            ClausebookError::InvalidConfig("eps".into()),
        ];
        let mut codes: Vec<_> = errs.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errs.len());
    }

    #[test]
    fn only_upstream_and_timeout_are_retryable() {
        assert!(ClausebookError::upstream("x", "y").is_retryable());
        assert!(ClausebookError::timeout("x", Duration::from_millis(5)).is_retryable());
        assert!(!ClausebookError::schema("x", "y").is_retryable());
        assert!(!ClausebookError::UnsupportedFormat { path: "f".into() }.is_retryable());
    }

    #[test]
    fn within_prefixes_context() {
        let err = ClausebookError::schema("section schema", "missing field `title`")
            .within("playbook cluster 4");
        let msg = err.to_string();
        assert!(msg.contains("playbook cluster 4: section schema"));
        assert!(msg.contains("missing field `title`"));
    }
}
