//! Clausebook core: contract structuring and playbook synthesis
//!
//! Turns raw contract text into a typed document tree with a
//! schema-constrained LLM, clusters similar clauses across contracts, and
//! synthesizes a negotiation playbook from the clusters.
//!
//! ## Pipeline
//!
//! ```text
//! file ─► TextExtractor ─► StructuredParser ─► Contract
//! [Contract] ─► ClauseClusterer ─► ClusterMap ─► PlaybookGenerator ─► Playbook ─► export
//! ```
//!
//! ## Key Components
//!
//! - `StructuredLlm`: the structuring primitive (prompt + output schema)
//! - `EmbeddingService`: text → vector, remote or local
//! - `StructuredParser`: single-call or multi-call parsing
//! - `ClauseClusterer`: flatten, embed, DBSCAN over cosine distance
//! - `PlaybookGenerator`: four ranked variants per cluster

pub mod cluster;
pub mod config;
pub mod embedding;
mod error;
pub mod export;
pub mod extract;
pub mod fakes;
pub mod llm;
pub mod metrics;
pub mod model;
pub mod obs;
pub mod parser;
pub mod playbook;
pub mod ratelimit;
pub mod telemetry;

pub use cluster::{
    dbscan, flatten_clauses, k_distances, suggest_eps, ClauseClusterer, ClusterMap,
    KDistanceReport, NOISE,
};
pub use config::{
    ClausebookConfig, ClusteringSettings, EmbeddingProvider, EmbeddingSettings, FailurePolicy,
    LlmSettings, ParseStrategy, ParserSettings, PlaybookSettings, RetryPolicy, VariantSchema,
};
pub use embedding::{cosine_distance, CachingEmbedder, EmbeddingService, HashingEmbedder};
pub use error::{ClausebookError, Result};
pub use export::{
    render_playbook_md, render_playbook_xml, write_playbook_json, write_playbook_md,
    write_playbook_xml,
};
pub use extract::{DocumentFormat, TextExtractor};
pub use llm::{invoke_structured, CallPolicy, OutputSchema, PromptMessage, Role, StructuredLlm};
pub use model::{
    Clause, Contract, ContractId, ContractRaw, Favorability, Party, Playbook, PlaybookId,
    PlaybookSection, PlaybookVariant, Section, SectionRaw, Subsection,
};
pub use parser::StructuredParser;
pub use playbook::{PlaybookGenerator, PlaybookReport, SkippedCluster};
pub use ratelimit::RateLimiter;

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
