//! Sentence-embedding collaborators.
//!
//! The clusterer only sees [`EmbeddingService`]; a remote API client lives
//! in `clausebook-providers`, and [`HashingEmbedder`] offers a local,
//! deterministic alternative that needs no network.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::error::{ClausebookError, Result};
use crate::metrics::METRICS;

/// Maps text to a fixed-length vector. Identical input and model version
/// must give identical output.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Length of every vector this service returns (0 when unknown).
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch as one blocking unit. The default embeds sequentially.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

#[async_trait]
impl<E: EmbeddingService + ?Sized> EmbeddingService for Arc<E> {
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts).await
    }
}

/// Cosine distance `1 - cos θ`, in `[0, 2]`.
///
/// A zero-norm vector is at distance 1.0 from everything, itself included.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    let similarity = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
    1.0 - similarity
}

/// Feature-hashing embedder over lower-cased word unigrams and bigrams.
///
/// Each feature is hashed with SHA-256 into a signed bucket, and the
/// result is L2-normalised. Texts sharing most of their words land close
/// together in cosine space; identical texts map to identical vectors.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();

        for word in &words {
            self.add_feature(&mut vector, word, 1.0);
        }
        for pair in words.windows(2) {
            self.add_feature(&mut vector, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        let h = u64::from_le_bytes(bytes);
        let bucket = (h % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

#[async_trait]
impl EmbeddingService for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        METRICS.inc_embedding_calls();
        Ok(self.embed_sync(text))
    }
}

/// Memoises an inner embedder by the SHA-256 of the text.
pub struct CachingEmbedder<E> {
    inner: E,
    cache: Mutex<HashMap<String, Vec<f32>>>,
}

impl<E: EmbeddingService> CachingEmbedder<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.lock().await.len()
    }

    fn key(text: &str) -> String {
        hex::encode(Sha256::digest(text.as_bytes()))
    }
}

#[async_trait]
impl<E: EmbeddingService> EmbeddingService for CachingEmbedder<E> {
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = Self::key(text);
        if let Some(hit) = self.cache.lock().await.get(&key) {
            return Ok(hit.clone());
        }
        let vector = self.inner.embed(text).await?;
        self.cache.lock().await.insert(key, vector.clone());
        Ok(vector)
    }

    /// Misses go to the inner service as one batch, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let keys: Vec<String> = texts.iter().map(|t| Self::key(t)).collect();
        let mut out: Vec<Option<Vec<f32>>> = {
            let cache = self.cache.lock().await;
            keys.iter().map(|k| cache.get(k).cloned()).collect()
        };

        let mut miss_keys: Vec<&String> = Vec::new();
        let mut misses: Vec<String> = Vec::new();
        for (i, slot) in out.iter().enumerate() {
            if slot.is_none() && !miss_keys.contains(&&keys[i]) {
                miss_keys.push(&keys[i]);
                misses.push(texts[i].clone());
            }
        }

        if !misses.is_empty() {
            let vectors = self.inner.embed_batch(&misses).await?;
            let mut cache = self.cache.lock().await;
            for (key, vector) in miss_keys.into_iter().zip(vectors) {
                cache.insert(key.clone(), vector);
            }
            for (slot, key) in out.iter_mut().zip(&keys) {
                if slot.is_none() {
                    *slot = cache.get(key).cloned();
                }
            }
        }

        out.into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                ClausebookError::upstream("embedding cache", "inner service returned too few vectors")
            })
    }
}
