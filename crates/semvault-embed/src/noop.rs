//! No-op embedder for testing without an upstream.
//!
//! Returns zero-vectors for all inputs. Useful for wiring tests and
//! development builds where no API key is available.

use async_trait::async_trait;
use semvault_core::{EmbedError, Embedder};

/// Embedder that returns zero-vectors of a fixed dimension.
pub struct NoopEmbedder {
    dimension: usize,
}

impl NoopEmbedder {
    #[must_use]
    pub fn new() -> Self {
        Self { dimension: 1536 }
    }

    #[must_use]
    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for NoopEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for NoopEmbedder {
    fn model_name(&self) -> &str {
        "noop"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|_| vec![0.0; self.dimension]).collect())
    }
}
