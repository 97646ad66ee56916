//! Clause clustering across contracts.
//!
//! Clauses are flattened out of every contract, embedded through an
//! [`EmbeddingService`], and grouped with [`dbscan`] over cosine distance.
//! Clauses outside every dense region land under [`NOISE`].

mod dbscan;
mod kdistance;

pub use dbscan::{dbscan, NOISE};
pub use kdistance::{k_distances, suggest_eps, KDistanceReport};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::{ClausebookConfig, ClusteringSettings};
use crate::embedding::EmbeddingService;
use crate::error::{ClausebookError, Result};
use crate::model::Contract;
use crate::obs;

/// Cluster id → clause texts in first-seen order. Key [`NOISE`] holds
/// clauses that belong to no cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterMap(BTreeMap<i32, Vec<String>>);

impl ClusterMap {
    pub const NOISE: i32 = NOISE;

    pub fn new() -> Self {
        Self::default()
    }

    /// Group `texts` by the label at the same index.
    pub fn from_labels(texts: &[String], labels: &[i32]) -> Self {
        let mut map: BTreeMap<i32, Vec<String>> = BTreeMap::new();
        for (text, label) in texts.iter().zip(labels) {
            map.entry(*label).or_default().push(text.clone());
        }
        Self(map)
    }

    pub fn insert(&mut self, id: i32, texts: Vec<String>) {
        self.0.insert(id, texts);
    }

    pub fn get(&self, id: i32) -> Option<&[String]> {
        self.0.get(&id).map(Vec::as_slice)
    }

    /// Clauses without a cluster.
    pub fn noise(&self) -> &[String] {
        self.get(NOISE).unwrap_or(&[])
    }

    /// Non-noise clusters in ascending id order.
    pub fn clusters(&self) -> impl Iterator<Item = (i32, &[String])> + '_ {
        self.0
            .iter()
            .filter(|(id, _)| **id != NOISE)
            .map(|(id, texts)| (*id, texts.as_slice()))
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters().count()
    }

    /// Number of entries, noise included.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&i32, &Vec<String>)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> BTreeMap<i32, Vec<String>> {
        self.0
    }
}

impl From<BTreeMap<i32, Vec<String>>> for ClusterMap {
    fn from(map: BTreeMap<i32, Vec<String>>) -> Self {
        Self(map)
    }
}

/// Every clause text in traversal order: per section its direct clauses,
/// then each subsection's clauses.
pub fn flatten_clauses(contracts: &[Contract]) -> Vec<String> {
    let mut out = Vec::new();
    for contract in contracts {
        for section in &contract.sections {
            out.extend(section.clauses.iter().map(|c| c.text.clone()));
            for subsection in &section.subsections {
                out.extend(subsection.clauses.iter().map(|c| c.text.clone()));
            }
        }
    }
    out
}

pub struct ClauseClusterer {
    embedder: Arc<dyn EmbeddingService>,
    settings: ClusteringSettings,
    batch_size: usize,
    timeout: Duration,
}

impl ClauseClusterer {
    pub fn new(embedder: Arc<dyn EmbeddingService>, settings: ClusteringSettings) -> Self {
        Self {
            embedder,
            settings,
            batch_size: 32,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn from_config(embedder: Arc<dyn EmbeddingService>, config: &ClausebookConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(embedder, config.clustering)
            .with_batch_size(config.embedding.batch_size)
            .with_timeout(config.embedding.timeout()))
    }

    /// Texts handed to the embedder per call.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Upper bound for one embedder call of at most `batch_size` texts.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn settings(&self) -> ClusteringSettings {
        self.settings
    }

    #[instrument(skip(self, contracts), fields(contracts = contracts.len()))]
    pub async fn cluster(&self, contracts: &[Contract]) -> Result<ClusterMap> {
        let texts = flatten_clauses(contracts);
        if texts.is_empty() {
            debug!("no clauses to cluster");
            obs::emit_cluster_finished(0, 0, 0);
            return Ok(ClusterMap::new());
        }

        let vectors = self.embed(&texts).await?;
        let labels = dbscan(&vectors, self.settings.eps, self.settings.min_samples);
        let map = ClusterMap::from_labels(&texts, &labels);

        obs::emit_cluster_finished(texts.len(), map.cluster_count(), map.noise().len());
        Ok(map)
    }

    /// k-distance curve over all clauses of `contracts`.
    #[instrument(skip(self, contracts), fields(contracts = contracts.len()))]
    pub async fn k_distance_report(&self, contracts: &[Contract], k: usize) -> Result<KDistanceReport> {
        let texts = flatten_clauses(contracts);
        if texts.is_empty() {
            return Ok(KDistanceReport::from_vectors(&[], k));
        }
        let vectors = self.embed(&texts).await?;
        Ok(KDistanceReport::from_vectors(&vectors, k))
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        const CONTEXT: &str = "embed clauses";

        let mut vectors = Vec::with_capacity(texts.len());
        for (index, chunk) in texts.chunks(self.batch_size).enumerate() {
            let batch = tokio::time::timeout(self.timeout, self.embedder.embed_batch(chunk))
                .await
                .map_err(|_| {
                    ClausebookError::timeout(format!("{CONTEXT} batch {index}"), self.timeout)
                })?
                .map_err(|e| e.within(CONTEXT))?;
            if batch.len() != chunk.len() {
                return Err(ClausebookError::schema(
                    CONTEXT,
                    format!(
                        "{} vectors for {} clauses in batch {index}",
                        batch.len(),
                        chunk.len()
                    ),
                ));
            }
            vectors.extend(batch);
        }

        let dimensions = vectors.first().map(Vec::len).unwrap_or(0);
        if dimensions == 0 {
            return Err(ClausebookError::schema(CONTEXT, "empty embedding vector"));
        }
        if let Some((index, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dimensions) {
            return Err(ClausebookError::schema(
                CONTEXT,
                format!(
                    "embedding {index} has {} dimensions, expected {dimensions}",
                    v.len()
                ),
            ));
        }
        Ok(vectors)
    }
}
