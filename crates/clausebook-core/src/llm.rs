//! Schema-constrained LLM calls.
//!
//! Every structuring step is "prompt + fixed output schema". Backends
//! implement [`StructuredLlm`]; callers go through [`invoke_structured`],
//! which paces, bounds, optionally retries, and validates the response
//! against the target type before handing it back.

use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::error::{ClausebookError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::ratelimit::RateLimiter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One chat message of a structuring prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// JSON Schema describing the object the LLM must return.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

impl OutputSchema {
    pub fn of<T: JsonSchema>() -> Self {
        Self {
            name: T::schema_name(),
            schema: serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default(),
        }
    }
}

/// The structuring primitive: any backend that can answer a prompt with a
/// JSON object shaped by `schema`.
///
/// Implementations report transport failures as
/// [`ClausebookError::Upstream`]. They may return the object as a JSON
/// value or as a string containing JSON; shape validation happens in
/// [`invoke_structured`], never in the backend.
#[async_trait]
pub trait StructuredLlm: Send + Sync {
    async fn invoke(
        &self,
        messages: &[PromptMessage],
        schema: &OutputSchema,
    ) -> Result<serde_json::Value>;
}

/// Pacing, time bound and retry behaviour applied to each LLM call.
#[derive(Debug, Clone)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub limiter: RateLimiter,
}

impl CallPolicy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            retry: RetryPolicy::none(),
            limiter: RateLimiter::unlimited(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }
}

/// Invoke `llm` and validate the result as `T`.
///
/// `context` names the unit of work and is attached to every error.
pub async fn invoke_structured<T>(
    llm: &dyn StructuredLlm,
    messages: &[PromptMessage],
    context: &str,
    policy: &CallPolicy,
) -> Result<T>
where
    T: DeserializeOwned + JsonSchema,
{
    let schema = OutputSchema::of::<T>();
    let mut attempt = 0;

    loop {
        attempt += 1;
        policy.limiter.acquire().await;
        METRICS.inc_llm_calls();
        debug!(context = %context, schema = %schema.name, attempt, "invoking llm");

        let outcome = match tokio::time::timeout(policy.timeout, llm.invoke(messages, &schema))
            .await
        {
            Ok(Ok(value)) => coerce::<T>(value, context),
            Ok(Err(err)) => Err(err.within(context)),
            Err(_) => Err(ClausebookError::timeout(context, policy.timeout)),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if policy.retry.should_retry(&err, attempt) => {
                let backoff = policy.retry.backoff(attempt);
                warn!(
                    context = %context,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "llm call failed, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(err) => {
                if err.is_schema_validation() {
                    METRICS.inc_schema_failures();
                }
                obs::emit_llm_call_failed(context, &err);
                return Err(err);
            }
        }
    }
}

/// Coerce a backend response into `T`.
pub fn coerce<T: DeserializeOwned>(value: serde_json::Value, context: &str) -> Result<T> {
    let value = match value {
        serde_json::Value::String(text) => {
            let json = extract_json_text(&text);
            serde_json::from_str(json).map_err(|e| {
                ClausebookError::schema(
                    context,
                    format!("response is not JSON ({e}): {}", preview(json)),
                )
            })?
        }
        other => other,
    };
    serde_json::from_value(value).map_err(|e| ClausebookError::schema(context, e.to_string()))
}

/// Strip markdown fences or surrounding prose from a JSON answer.
///
/// The fence's info string (`json`, `JSON`, anything else) is dropped along
/// with any text around the outermost object.
pub fn extract_json_text(response: &str) -> &str {
    let body = match response.split_once("```") {
        Some((_, rest)) => rest.split("```").next().unwrap_or(rest),
        None => response,
    };
    let body = body.trim();
    match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => body,
    }
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}
