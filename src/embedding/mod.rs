//! Embedding gateway
//!
//! Obtains fixed-dimensional vectors for item content from an embedding
//! provider. Batches up to a provider-imposed maximum, caches by content
//! hash, and retries failed batches with exponential backoff. An input
//! whose embedding remains unresolved after retries does not block
//! ingestion; its item is persisted as embedding-pending and picked up by
//! the backfill worker.
//!
//! Backends:
//! - HTTP API (OpenAI-compatible `/v1/embeddings` shape)
//! - Deterministic hashing embedder (no external dependencies; used for
//!   tests and offline operation)

pub mod backfill;
mod cache;

pub use backfill::EmbeddingBackfill;
pub use cache::{CacheStats, EmbeddingCache};

use async_trait::async_trait;
use rand::Rng;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::error::{MnemoError, Result};
use crate::types::EmbeddingConfig;

/// Maximum inputs per provider call
pub const MAX_BATCH_SIZE: usize = 128;

/// Maximum concurrent provider calls per gateway
const MAX_INFLIGHT: usize = 8;

/// Base delay for exponential backoff between retries
const BACKOFF_BASE: Duration = Duration::from_millis(200);

/// Trait for embedding generators
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate one vector per input text, in order
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Output dimension
    fn dimensions(&self) -> usize;

    /// Model identifier recorded alongside stored vectors
    fn model_id(&self) -> &str;
}

/// HTTP embedding client (OpenAI-compatible response shape)
pub struct HttpEmbedder {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    dimensions: usize,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/embeddings".to_string()),
            model: config.model_id.clone(),
            dimensions: config.dimensions,
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "input": texts,
                "model": self.model,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(MnemoError::ProviderUnavailable(format!(
                    "{}: {}",
                    status, body
                )));
            }
            return Err(MnemoError::Embedding(format!(
                "provider error {}: {}",
                status, body
            )));
        }

        let data: serde_json::Value = response.json().await?;
        let rows = data["data"]
            .as_array()
            .ok_or_else(|| MnemoError::Embedding("malformed provider response".to_string()))?;
        if rows.len() != texts.len() {
            return Err(MnemoError::Embedding(format!(
                "provider returned {} vectors for {} inputs",
                rows.len(),
                texts.len()
            )));
        }

        let mut vectors = Vec::with_capacity(rows.len());
        for row in rows {
            let vector: Vec<f32> = row["embedding"]
                .as_array()
                .ok_or_else(|| MnemoError::Embedding("malformed embedding row".to_string()))?
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect();
            if vector.len() != self.dimensions {
                return Err(MnemoError::Embedding(format!(
                    "provider returned dimension {} (expected {})",
                    vector.len(),
                    self.dimensions
                )));
            }
            vectors.push(vector);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Deterministic embedder using the hashing trick over unigrams and bigrams
///
/// Identical text always produces an identical unit-norm vector, which makes
/// it suitable for tests and offline operation. Never returns a zero vector.
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.len() > 1)
            .map(String::from)
            .collect()
    }

    fn hash_index(parts: &[&str], dimensions: usize) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for p in parts {
            p.hash(&mut hasher);
        }
        (hasher.finish() as usize) % dimensions
    }

    fn hash_sign(parts: &[&str]) -> f32 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for p in parts {
            p.hash(&mut hasher);
        }
        "sign".hash(&mut hasher);
        if hasher.finish() % 2 == 0 {
            1.0
        } else {
            -1.0
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let tokens = Self::tokenize(text);
        let mut vector = vec![0.0_f32; self.dimensions];

        if tokens.is_empty() {
            // Keep the L2 norm strictly positive for degenerate inputs
            vector[0] = 1.0;
            return vector;
        }

        for window in tokens.windows(2) {
            let parts = [window[0].as_str(), window[1].as_str()];
            let idx = Self::hash_index(&parts, self.dimensions);
            vector[idx] += 0.5 * Self::hash_sign(&parts);
        }

        for token in &tokens {
            let parts = [token.as_str()];
            let idx = Self::hash_index(&parts, self.dimensions);
            vector[idx] += Self::hash_sign(&parts);
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        } else {
            vector[0] = 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        "hash-v1"
    }
}

/// Create an embedder from configuration: HTTP when an API key is present,
/// the deterministic hashing embedder otherwise
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match &config.api_key {
        Some(key) => Ok(Arc::new(HttpEmbedder::new(config, key.clone()))),
        None => Ok(Arc::new(HashEmbedder::new(config.dimensions))),
    }
}

/// Gateway in front of an embedder: content-hash cache, batching, bounded
/// concurrency, retries with exponential backoff, deadline awareness
#[derive(Clone)]
pub struct EmbedderGateway {
    embedder: Arc<dyn Embedder>,
    cache: Arc<EmbeddingCache>,
    inflight: Arc<Semaphore>,
    batch_size: usize,
    max_retries: u32,
}

impl EmbedderGateway {
    pub fn new(embedder: Arc<dyn Embedder>, config: &EmbeddingConfig) -> Self {
        Self {
            embedder,
            cache: Arc::new(EmbeddingCache::new(config.cache_bytes)),
            inflight: Arc::new(Semaphore::new(MAX_INFLIGHT)),
            batch_size: config.batch_size.clamp(1, MAX_BATCH_SIZE),
            max_retries: config.max_retries,
        }
    }

    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    pub fn dimensions(&self) -> usize {
        self.embedder.dimensions()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Embed pre-hashed inputs. Returns one slot per input: `Some` when a
    /// vector was obtained (cached or fresh), `None` when it remains
    /// unresolved after retries or the deadline expired.
    ///
    /// A retryable provider error is surfaced only when the call produced
    /// zero vectors in total.
    pub async fn embed_hashed(
        &self,
        inputs: &[(u64, &str)],
        deadline: Option<Instant>,
    ) -> Result<Vec<Option<Arc<[f32]>>>> {
        let model = self.embedder.model_id().to_string();
        let mut out: Vec<Option<Arc<[f32]>>> = vec![None; inputs.len()];

        let mut miss_indices = Vec::new();
        for (i, (hash, _)) in inputs.iter().enumerate() {
            if let Some(vector) = self.cache.get(*hash, &model) {
                out[i] = Some(vector);
            } else {
                miss_indices.push(i);
            }
        }

        if miss_indices.is_empty() {
            return Ok(out);
        }

        let chunk_futures = miss_indices.chunks(self.batch_size).map(|chunk| {
            let texts: Vec<&str> = chunk.iter().map(|&i| inputs[i].1).collect();
            async move {
                let _permit = self.inflight.acquire().await.map_err(|_| {
                    MnemoError::Internal("embedding semaphore closed".to_string())
                })?;
                self.embed_with_retry(&texts, deadline).await
            }
        });

        let results = futures::future::join_all(chunk_futures).await;

        let produced_from_cache = inputs.len() - miss_indices.len();
        let mut produced = produced_from_cache;
        let mut last_error: Option<MnemoError> = None;

        for (chunk, result) in miss_indices.chunks(self.batch_size).zip(results) {
            match result {
                Ok(vectors) => {
                    for (&i, vector) in chunk.iter().zip(vectors) {
                        let arc: Arc<[f32]> = vector.into();
                        self.cache.put(inputs[i].0, &model, arc.clone());
                        out[i] = Some(arc);
                        produced += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, batch = chunk.len(), "embedding batch unresolved");
                    last_error = Some(e);
                }
            }
        }

        if produced == 0 {
            if let Some(e) = last_error {
                if e.is_retryable() {
                    return Err(e);
                }
            }
        }

        Ok(out)
    }

    /// Embed a single purpose/query text
    pub async fn embed_query(
        &self,
        hash: u64,
        text: &str,
        deadline: Option<Instant>,
    ) -> Result<Option<Arc<[f32]>>> {
        let mut result = self.embed_hashed(&[(hash, text)], deadline).await?;
        Ok(result.pop().flatten())
    }

    async fn embed_with_retry(
        &self,
        texts: &[&str],
        deadline: Option<Instant>,
    ) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0u32;
        loop {
            if let Some(d) = deadline {
                if Instant::now() >= d {
                    return Err(MnemoError::Cancelled(Duration::ZERO));
                }
            }

            match self.embedder.embed_batch(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let jitter = rand::thread_rng().gen_range(0..100);
                    let mut delay =
                        BACKOFF_BASE * 2u32.pow(attempt) + Duration::from_millis(jitter);
                    if let Some(d) = deadline {
                        let remaining = d.saturating_duration_since(Instant::now());
                        if remaining.is_zero() {
                            return Err(e);
                        }
                        delay = delay.min(remaining);
                    }
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying embedding batch");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
