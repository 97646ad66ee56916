//! Clausebook providers: HTTP collaborators
//!
//! Concrete backends for the two external services the pipeline consumes:
//!
//! - `ChatCompletionsClient`: [`StructuredLlm`] over a Mistral/OpenAI
//!   compatible `/chat/completions` endpoint in JSON mode
//! - `HttpEmbedder`: [`EmbeddingService`] over `/embeddings`
//!
//! [`StructuredLlm`]: clausebook_core::StructuredLlm
//! [`EmbeddingService`]: clausebook_core::EmbeddingService

pub mod chat;
pub mod embeddings;
mod error;

pub use chat::{ChatCompletionsClient, ChatConfig};
pub use embeddings::{EmbeddingConfig, HttpEmbedder};
pub use error::ProviderError;
