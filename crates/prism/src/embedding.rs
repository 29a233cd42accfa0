//! Embedding model abstraction.

use crate::error::{Error, Result};
use async_trait::async_trait;

/// Converts text into embedding vectors.
///
/// Implementations batch however their backend prefers; callers rely only on
/// the output containing one vector per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let texts = vec![text.to_string()];
        let mut vectors = self.embed_batch(&texts).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::api_format("no embedding returned for input"))
    }
}
