//! In-memory fakes for the LLM and embedding collaborators (testing only).
//!
//! `FakeLlm` replays a script of responses (or answers through a closure)
//! and records every call; `FakeEmbedder` serves fixed vectors per text.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::embedding::EmbeddingService;
use crate::error::{ClausebookError, Result};
use crate::llm::{OutputSchema, PromptMessage, StructuredLlm};

/// A call observed by [`FakeLlm`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<PromptMessage>,
    pub schema_name: String,
}

impl RecordedCall {
    /// Concatenated content of the user messages.
    pub fn user_content(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == crate::llm::Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

type Responder = Box<dyn Fn(&[PromptMessage], &OutputSchema) -> Result<serde_json::Value> + Send + Sync>;

enum Source {
    Script(Mutex<VecDeque<Result<serde_json::Value>>>),
    Responder(Responder),
}

/// Deterministic stand-in for an LLM backend.
///
/// In script mode responses are served in order; the last `Ok` response
/// keeps being returned once it is the only one left. An exhausted script
/// yields an upstream error.
pub struct FakeLlm {
    source: Source,
    latency: Option<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeLlm {
    pub fn new(responses: Vec<Result<serde_json::Value>>) -> Self {
        Self {
            source: Source::Script(Mutex::new(responses.into())),
            latency: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `value`.
    pub fn always(value: serde_json::Value) -> Self {
        Self::new(vec![Ok(value)])
    }

    /// Answer each call through `responder`.
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&[PromptMessage], &OutputSchema) -> Result<serde_json::Value>
            + Send
            + Sync
            + 'static,
    {
        Self {
            source: Source::Responder(Box::new(responder)),
            latency: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Delay every answer by `latency` (use with paused tokio time).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StructuredLlm for FakeLlm {
    async fn invoke(
        &self,
        messages: &[PromptMessage],
        schema: &OutputSchema,
    ) -> Result<serde_json::Value> {
        self.calls.lock().unwrap().push(RecordedCall {
            messages: messages.to_vec(),
            schema_name: schema.name.clone(),
        });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match &self.source {
            Source::Responder(responder) => responder(messages, schema),
            Source::Script(script) => {
                let mut script = script.lock().unwrap();
                let repeat_last = script.len() == 1 && matches!(script.front(), Some(Ok(_)));
                if repeat_last {
                    if let Some(Ok(value)) = script.front() {
                        return Ok(value.clone());
                    }
                }
                script
                    .pop_front()
                    .unwrap_or_else(|| Err(ClausebookError::upstream("fake llm", "script exhausted")))
            }
        }
    }
}

/// Embedder serving fixed vectors per text.
pub struct FakeEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    fallback: Option<Vec<f32>>,
    dimensions: usize,
    calls: Mutex<usize>,
}

impl FakeEmbedder {
    pub fn new<I, S>(vectors: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<f32>)>,
        S: Into<String>,
    {
        let vectors: HashMap<String, Vec<f32>> =
            vectors.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let dimensions = vectors.values().next().map(Vec::len).unwrap_or(0);
        Self {
            vectors,
            fallback: None,
            dimensions,
            calls: Mutex::new(0),
        }
    }

    /// Vector returned for texts without a fixed entry.
    pub fn with_fallback(mut self, vector: Vec<f32>) -> Self {
        self.dimensions = vector.len();
        self.fallback = Some(vector);
        self
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl EmbeddingService for FakeEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        *self.calls.lock().unwrap() += 1;
        self.vectors
            .get(text)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| ClausebookError::upstream("fake embedder", format!("no vector for `{text}`")))
    }
}
