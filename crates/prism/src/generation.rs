//! Text generation model abstraction.

use crate::error::Result;
use async_trait::async_trait;

/// Produces a text completion for a prompt.
///
/// Both query expansion and synthesis speak to language models through this
/// trait, so a single configured client can serve the whole pipeline.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Complete `prompt`, returning the model's text output.
    async fn complete(&self, prompt: &str) -> Result<String>;
}
