//! Embedding generation
//!
//! This module provides an abstraction over embedding providers with:
//! - A trait for different embedding backends
//! - HTTP embedding backend (OpenAI-compatible endpoint)
//! - Token-budgeted batch processing

mod http_backend;

pub use http_backend::*;

use crate::chunk::estimate_tokens;
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use crate::limiter::TokenBucket;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Trait for embedding providers
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning one vector per input in order
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let embedder = HttpEmbedder::new(config)?;
    Ok(Arc::new(embedder))
}

/// Batches chunk texts into embedding requests while respecting the
/// provider's tokens-per-minute budget.
///
/// Each batch costs the sum of its texts' estimated token counts; the
/// bucket is drained before the request is sent, so concurrent workers
/// sharing one batcher stay inside the shared budget.
pub struct EmbeddingBatcher {
    embedder: Arc<dyn Embedder>,
    bucket: Arc<TokenBucket>,
    batch_size: usize,
}

impl EmbeddingBatcher {
    pub fn new(embedder: Arc<dyn Embedder>, config: &EmbeddingConfig) -> Self {
        Self {
            embedder,
            bucket: Arc::new(TokenBucket::per_minute(config.tokens_per_minute)),
            batch_size: config.batch_size.max(1),
        }
    }

    /// Embed all texts in configured-size batches.
    ///
    /// Returns exactly one vector per input text, in input order. A failed
    /// batch fails the whole call; partial results are never returned.
    pub async fn embed_all(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let cost: usize = batch.iter().map(|t| estimate_tokens(t)).sum();
            self.bucket.acquire(cost as f64).await;

            debug!(batch_len = batch.len(), cost, "Embedding batch");
            let embeddings = self.embedder.embed(batch.to_vec()).await?;
            if embeddings.len() != batch.len() {
                return Err(Error::EmbeddingOther(format!(
                    "Provider returned {} embeddings for {} inputs",
                    embeddings.len(),
                    batch.len()
                )));
            }
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }
}
