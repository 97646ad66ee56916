//! Process-wide configuration.
//!
//! Built once at startup (defaults, then an optional TOML file, then
//! environment overrides) and passed explicitly to the components that
//! need it. Nothing in the crate reads the environment after that.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ClausebookError, Result};

/// Which parsing strategy the structured parser uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStrategy {
    /// One combined call for the whole document tree.
    #[default]
    Single,
    /// Rough section split, then one call per section.
    Multi,
}

impl std::str::FromStr for ParseStrategy {
    type Err = ClausebookError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "multi" => Ok(Self::Multi),
            other => Err(ClausebookError::InvalidConfig(format!(
                "unknown parse strategy `{other}` (expected single|multi)"
            ))),
        }
    }
}

/// What to do when one cluster's playbook section fails schema validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    Abort,
    Skip,
}

/// Justification shape requested from the LLM for playbook variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantSchema {
    /// A single `justification` string.
    #[default]
    Single,
    /// Separate `internal_justification` and `external_justification`.
    Split,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Remote embeddings API.
    #[default]
    Remote,
    /// Local deterministic feature-hashing embedder.
    Hashing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Language the LLM should use for generated JSON values.
    pub output_language: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.mistral.ai/v1".to_string(),
            model: "mistral-large-latest".to_string(),
            api_key: None,
            timeout_secs: 120,
            output_language: "German".to_string(),
        }
    }
}

impl LlmSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Bound for one embedding request.
    pub timeout_secs: u64,
    /// Texts per embedding request.
    pub batch_size: usize,
    /// Vector size for the hashing embedder.
    pub dimensions: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Remote,
            endpoint: "https://api.mistral.ai/v1".to_string(),
            model: "mistral-embed".to_string(),
            api_key: None,
            timeout_secs: 60,
            batch_size: 32,
            dimensions: 384,
        }
    }
}

impl EmbeddingSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// DBSCAN parameters. Static for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringSettings {
    /// Maximum cosine distance between neighbours.
    pub eps: f32,
    /// Minimum neighbourhood size (point included) for a core point.
    pub min_samples: usize,
}

impl Default for ClusteringSettings {
    fn default() -> Self {
        Self {
            eps: 0.30,
            min_samples: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserSettings {
    pub strategy: ParseStrategy,
    /// Sustained request rate towards the LLM for per-section calls.
    pub requests_per_second: f64,
    /// Calls allowed back to back before pacing kicks in.
    pub burst: u32,
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            strategy: ParseStrategy::Single,
            requests_per_second: 1.0,
            burst: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybookSettings {
    pub failure_policy: FailurePolicy,
    pub variant_schema: VariantSchema,
}

/// Retry behaviour for individual LLM calls. Disabled by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    /// Also retry the same prompt when the response fails validation.
    pub retry_schema_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: 500,
            retry_schema_errors: false,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    /// Exponential backoff before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
    }

    pub fn should_retry(&self, err: &ClausebookError, attempt: u32) -> bool {
        attempt <= self.max_retries
            && (err.is_retryable() || (self.retry_schema_errors && err.is_schema_validation()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClausebookConfig {
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub clustering: ClusteringSettings,
    pub parser: ParserSettings,
    pub playbook: PlaybookSettings,
    pub retry: RetryPolicy,
}

impl ClausebookConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ClausebookError::InvalidConfig(e.to_string()))
    }

    /// Override fields from `CLAUSEBOOK_*` variables and the provider key.
    /// A variable that is set but does not parse is an error.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(key) = var("MISTRAL_API_KEY") {
            self.llm.api_key.get_or_insert(key.clone());
            self.embedding.api_key.get_or_insert(key);
        }
        if let Some(endpoint) = var("CLAUSEBOOK_LLM_ENDPOINT") {
            self.llm.endpoint = endpoint;
        }
        if let Some(model) = var("CLAUSEBOOK_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(lang) = var("CLAUSEBOOK_OUTPUT_LANGUAGE") {
            self.llm.output_language = lang;
        }
        if let Some(endpoint) = var("CLAUSEBOOK_EMBEDDING_ENDPOINT") {
            self.embedding.endpoint = endpoint;
        }
        if let Some(model) = var("CLAUSEBOOK_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(eps) = parse_var(&var, "CLAUSEBOOK_EPS")? {
            self.clustering.eps = eps;
        }
        if let Some(n) = parse_var(&var, "CLAUSEBOOK_MIN_SAMPLES")? {
            self.clustering.min_samples = n;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.clustering;
        if !(c.eps > 0.0 && c.eps <= 2.0) {
            return Err(ClausebookError::InvalidConfig(format!(
                "clustering.eps must be in (0, 2], got {}",
                c.eps
            )));
        }
        if c.min_samples == 0 {
            return Err(ClausebookError::InvalidConfig(
                "clustering.min_samples must be at least 1".into(),
            ));
        }
        if self.llm.timeout_secs == 0 || self.embedding.timeout_secs == 0 {
            return Err(ClausebookError::InvalidConfig(
                "timeouts must be greater than zero".into(),
            ));
        }
        if !(self.parser.requests_per_second > 0.0) || self.parser.burst == 0 {
            return Err(ClausebookError::InvalidConfig(
                "parser rate limit needs requests_per_second > 0 and burst >= 1".into(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(ClausebookError::InvalidConfig(
                "embedding.batch_size must be at least 1".into(),
            ));
        }
        if self.embedding.provider == EmbeddingProvider::Hashing && self.embedding.dimensions == 0
        {
            return Err(ClausebookError::InvalidConfig(
                "embedding.dimensions must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ClausebookError::InvalidConfig(format!("{key}: `{raw}`: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = ClausebookConfig::default();
        config.validate().unwrap();
        assert_eq!(config.clustering.eps, 0.30);
        assert_eq!(config.clustering.min_samples, 2);
        assert_eq!(config.parser.strategy, ParseStrategy::Single);
        assert_eq!(config.playbook.failure_policy, FailurePolicy::Abort);
        assert_eq!(config.retry.max_retries, 0);
    }

    #[test]
    fn toml_overrides_nested_sections() {
        let config = ClausebookConfig::from_toml_str(
            r#"
            [clustering]
            eps = 0.5

            [parser]
            strategy = "multi"

            [playbook]
            failure_policy = "skip"
            variant_schema = "split"
            "#,
        )
        .unwrap();
        assert_eq!(config.clustering.eps, 0.5);
        assert_eq!(config.clustering.min_samples, 2);
        assert_eq!(config.parser.strategy, ParseStrategy::Multi);
        assert_eq!(config.playbook.failure_policy, FailurePolicy::Skip);
        assert_eq!(config.playbook.variant_schema, VariantSchema::Split);
    }

    #[test]
    fn env_vars_override_fields() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("MISTRAL_API_KEY", "secret"),
            ("CLAUSEBOOK_EPS", "0.42"),
            ("CLAUSEBOOK_LLM_MODEL", "mistral-small-latest"),
        ]);
        let mut config = ClausebookConfig::default();
        config
            .apply_vars(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.llm.api_key.as_deref(), Some("secret"));
        assert_eq!(config.embedding.api_key.as_deref(), Some("secret"));
        assert_eq!(config.clustering.eps, 0.42);
        assert_eq!(config.llm.model, "mistral-small-latest");
    }

    #[test]
    fn malformed_clustering_vars_are_rejected() {
        let mut config = ClausebookConfig::default();
        let err = config
            .apply_vars(|k| (k == "CLAUSEBOOK_EPS").then(|| "0,5".to_string()))
            .unwrap_err();
        assert!(matches!(err, ClausebookError::InvalidConfig(_)));
        assert!(err.to_string().contains("CLAUSEBOOK_EPS"));
        assert_eq!(config.clustering.eps, 0.30);

        let err = ClausebookConfig::default()
            .apply_vars(|k| (k == "CLAUSEBOOK_MIN_SAMPLES").then(|| "two".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("CLAUSEBOOK_MIN_SAMPLES"));
    }

    #[test]
    fn validate_rejects_bad_clustering_parameters() {
        let mut config = ClausebookConfig::default();
        config.clustering.eps = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ClausebookError::InvalidConfig(_))
        ));

        let mut config = ClausebookConfig::default();
        config.clustering.min_samples = 0;
        assert!(config.validate().is_err());

        let mut config = ClausebookConfig::default();
        config.parser.requests_per_second = 0.0;
        assert!(config.validate().is_err());

        let mut config = ClausebookConfig::default();
        config.embedding.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn retry_policy_backoff_doubles() {
        let policy = RetryPolicy {
            max_retries: 3,
            initial_backoff_ms: 100,
            retry_schema_errors: false,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn retry_policy_respects_error_kind() {
        let policy = RetryPolicy {
            max_retries: 2,
            ..RetryPolicy::default()
        };
        let upstream = ClausebookError::upstream("x", "503");
        let schema = ClausebookError::schema("x", "bad");
        assert!(policy.should_retry(&upstream, 1));
        assert!(policy.should_retry(&upstream, 2));
        assert!(!policy.should_retry(&upstream, 3));
        assert!(!policy.should_retry(&schema, 1));

        let opted_in = RetryPolicy {
            retry_schema_errors: true,
            ..policy
        };
        assert!(opted_in.should_retry(&schema, 1));
        assert!(!RetryPolicy::none().should_retry(&upstream, 1));
    }

    #[test]
    fn parse_strategy_from_str() {
        assert_eq!("Multi".parse::<ParseStrategy>().unwrap(), ParseStrategy::Multi);
        assert!("batch".parse::<ParseStrategy>().is_err());
    }
}
