//! Embeddings API client (Mistral / OpenAI compatible)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use clausebook_core::config::EmbeddingSettings;
use clausebook_core::metrics::METRICS;
use clausebook_core::{ClausebookError, EmbeddingService, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{body_preview, ProviderError};

const CONTEXT: &str = "embeddings";

/// Connection settings for an embeddings endpoint
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    /// Texts per request; larger inputs are split into several requests.
    pub batch_size: usize,
}

impl EmbeddingConfig {
    pub fn new(endpoint: &str, model: &str) -> Self {
        EmbeddingConfig {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
            timeout: Duration::from_secs(60),
            batch_size: 32,
        }
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    pub fn url(&self) -> String {
        format!("{}/embeddings", self.endpoint)
    }
}

impl From<&EmbeddingSettings> for EmbeddingConfig {
    fn from(settings: &EmbeddingSettings) -> Self {
        let mut config = EmbeddingConfig::new(&settings.endpoint, &settings.model);
        config.api_key = settings.api_key.clone();
        config.timeout = settings.timeout();
        config.batch_size = settings.batch_size;
        config
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbeddingRequest<'a> {
    pub model: &'a str,
    pub input: &'a [String],
    pub encoding_format: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingResponse {
    #[serde(default)]
    pub data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingDatum {
    #[serde(default)]
    pub index: usize,
    pub embedding: Vec<f32>,
}

/// Vectors in input order. The API may return data out of order, so
/// entries are placed by `index`; every input must be answered exactly once.
pub fn order_embeddings(
    response: EmbeddingResponse,
    expected: usize,
) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
    if response.data.len() != expected {
        return Err(ProviderError::MalformedResponse(format!(
            "{} embeddings for {expected} inputs",
            response.data.len()
        )));
    }
    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for datum in response.data {
        let slot = slots.get_mut(datum.index).ok_or_else(|| {
            ProviderError::MalformedResponse(format!("embedding index {} out of range", datum.index))
        })?;
        if slot.replace(datum.embedding).is_some() {
            return Err(ProviderError::MalformedResponse(format!(
                "embedding index {} returned twice",
                datum.index
            )));
        }
    }
    slots
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| ProviderError::MalformedResponse("missing embedding index".into()))
}

/// [`EmbeddingService`] backed by an HTTP embeddings API
pub struct HttpEmbedder {
    config: EmbeddingConfig,
    http_client: reqwest::Client,
    dimensions: AtomicUsize,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("clausebook/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClausebookError::InvalidConfig(e.to_string()))?;
        Ok(HttpEmbedder {
            config,
            http_client,
            dimensions: AtomicUsize::new(0),
        })
    }

    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        Self::new(EmbeddingConfig::from(settings))
    }

    async fn request(&self, input: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        let key = self.config.api_key.as_deref().ok_or(ProviderError::MissingApiKey)?;
        let body = EmbeddingRequest {
            model: &self.config.model,
            input,
            encoding_format: "float",
        };

        METRICS.inc_embedding_calls();
        let response = self
            .http_client
            .post(self.config.url())
            .bearer_auth(key)
            .json(&body)
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

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        order_embeddings(parsed, input.len())
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbedder {
    /// 0 until the first response reveals the model's vector size.
    fn dimensions(&self) -> usize {
        self.dimensions.load(Ordering::Relaxed)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ClausebookError::upstream(CONTEXT, "empty embedding response"))
    }

    #[instrument(skip(self, texts), fields(model = %self.config.model, texts = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.config.batch_size.max(1)) {
            let vectors = self
                .request(chunk)
                .await
                .map_err(|e| e.into_clausebook(CONTEXT, self.config.timeout))?;
            out.extend(vectors);
        }
        if let Some(first) = out.first() {
            self.dimensions.store(first.len(), Ordering::Relaxed);
        }
        debug!(vectors = out.len(), "embeddings received");
        Ok(out)
    }
}
