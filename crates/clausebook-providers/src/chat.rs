//! Chat-completions client (Mistral / OpenAI compatible)
//!
//! Implements [`StructuredLlm`] with JSON-mode responses. The target JSON
//! Schema travels in the system message; validation against it happens in
//! the core, not here.

use std::time::Duration;

use async_trait::async_trait;
use clausebook_core::config::LlmSettings;
use clausebook_core::{OutputSchema, PromptMessage, Result, Role, StructuredLlm};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{body_preview, ProviderError};

const CONTEXT: &str = "chat completions";

/// Connection settings for a chat-completions endpoint
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Base URL, e.g. `https://api.mistral.ai/v1`
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub temperature: f32,
}

impl ChatConfig {
    pub fn new(endpoint: &str, model: &str) -> Self {
        ChatConfig {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
            timeout: Duration::from_secs(120),
            temperature: 0.0,
        }
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> String {
        format!("{}/chat/completions", self.endpoint)
    }
}

impl From<&LlmSettings> for ChatConfig {
    fn from(settings: &LlmSettings) -> Self {
        let mut config =
            ChatConfig::new(&settings.endpoint, &settings.model).with_timeout(settings.timeout());
        config.api_key = settings.api_key.clone();
        config
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Build the JSON-mode request body. The schema is appended to the first
/// system message, or sent as its own system message when there is none.
pub fn build_chat_request(
    model: &str,
    temperature: f32,
    messages: &[PromptMessage],
    schema: &OutputSchema,
) -> ChatRequest {
    let instruction = format!(
        "Respond with a single JSON object named {} that validates against this JSON Schema:\n{}",
        schema.name, schema.schema
    );

    let mut out: Vec<ChatMessage> = messages
        .iter()
        .map(|m| ChatMessage {
            role: match m.role {
                Role::System => "system".to_string(),
                Role::User => "user".to_string(),
            },
            content: m.content.clone(),
        })
        .collect();

    match out.iter_mut().find(|m| m.role == "system") {
        Some(system) => {
            system.content.push_str("\n\n");
            system.content.push_str(&instruction);
        }
        None => out.insert(
            0,
            ChatMessage {
                role: "system".to_string(),
                content: instruction,
            },
        ),
    }

    ChatRequest {
        model: model.to_string(),
        messages: out,
        temperature,
        response_format: ResponseFormat {
            kind: "json_object".to_string(),
        },
    }
}

/// First choice's message content.
pub fn extract_content(response: ChatResponse) -> std::result::Result<String, ProviderError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ProviderError::MalformedResponse("no message content in first choice".into()))
}

/// [`StructuredLlm`] backed by an HTTP chat-completions API
pub struct ChatCompletionsClient {
    config: ChatConfig,
    http_client: reqwest::Client,
}

impl ChatCompletionsClient {
    pub fn new(config: ChatConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("clausebook/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| clausebook_core::ClausebookError::InvalidConfig(e.to_string()))?;
        Ok(ChatCompletionsClient {
            config,
            http_client,
        })
    }

    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        Self::new(ChatConfig::from(settings))
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    async fn send(&self, body: &ChatRequest) -> std::result::Result<String, ProviderError> {
        let key = self.config.api_key.as_deref().ok_or(ProviderError::MissingApiKey)?;

        let response = self
            .http_client
            .post(self.config.url())
            .bearer_auth(key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: body_preview(&body),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        extract_content(parsed)
    }
}

#[async_trait]
impl StructuredLlm for ChatCompletionsClient {
    #[instrument(skip(self, messages, schema), fields(model = %self.config.model, schema = %schema.name))]
    async fn invoke(
        &self,
        messages: &[PromptMessage],
        schema: &OutputSchema,
    ) -> Result<serde_json::Value> {
        let body = build_chat_request(
            &self.config.model,
            self.config.temperature,
            messages,
            schema,
        );
        let content = self
            .send(&body)
            .await
            .map_err(|e| e.into_clausebook(CONTEXT, self.config.timeout))?;
        debug!(chars = content.len(), "chat completion received");
        Ok(serde_json::Value::String(content))
    }
}
