//! # OpenAI Embeddings
//!
//! Implements the [`Embedder`] capability against OpenAI's `/v1/embeddings`
//! endpoint. Requests are batched, retried per the configured policy, and
//! vectors are returned in input order.
//!
//! ## Example
//!
//! ```no_run
//! use prism::Embedder;
//! use prism_openai::OpenAIEmbeddings;
//!
//! # async fn example() -> prism::Result<()> {
//! let embedder = OpenAIEmbeddings::new().with_model("text-embedding-3-small");
//! let vector = embedder.embed("What drives customer churn?").await?;
//! println!("{} dimensions", vector.len());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use prism::{with_retry, Embedder, Error, Result, RetryPolicy};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::http::check_status;

const API_KEY_ENV: &str = "OPENAI_API_KEY";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_BATCH_SIZE: usize = 96;

/// OpenAI embeddings client.
///
/// Reads `OPENAI_API_KEY` from the environment by default; override with
/// [`with_api_key`](Self::with_api_key).
pub struct OpenAIEmbeddings {
    api_key: Option<String>,
    base_url: String,
    model: String,
    batch_size: usize,
    client: Client,
    retry_policy: RetryPolicy,
}

impl Default for OpenAIEmbeddings {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OpenAIEmbeddings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIEmbeddings")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("batch_size", &self.batch_size)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl OpenAIEmbeddings {
    #[must_use]
    pub fn new() -> Self {
        Self {
            api_key: std::env::var(API_KEY_ENV).ok(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            client: Client::new(),
            retry_policy: RetryPolicy::exponential(3),
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Override the API endpoint, e.g. for a proxy or a mock server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the number of texts sent per request. Clamped to at least 1.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    fn get_api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(Error::config(
                "OPENAI_API_KEY not set. Provide it via the environment or with_api_key()",
            )),
        }
    }

    /// Embed one batch of texts with a single API call.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let api_key = self.get_api_key()?;
        let url = format!("{}/v1/embeddings", self.base_url);
        let request = EmbeddingsRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
            encoding_format: "float",
        };
        tracing::debug!(texts = texts.len(), model = %self.model, "requesting embeddings");

        let response = with_retry(&self.retry_policy, || async {
            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {api_key}"))
                .header("Content-Type", "application/json")
                .json(&request)
                .send()
                .await
                .map_err(|err| Error::network(format!("OpenAI embeddings request failed: {err}")))?;
            check_status(response).await
        })
        .await?;

        let parsed: EmbeddingsResponse = response.json().await.map_err(|err| {
            Error::api_format(format!("failed to parse OpenAI embeddings response: {err}"))
        })?;

        if parsed.data.len() != texts.len() {
            return Err(Error::api_format(format!(
                "OpenAI returned {} embeddings for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        // The API reports an index per vector rather than guaranteeing order.
        let mut data = parsed.data;
        data.sort_by_key(|item| item.index);
        Ok(data.into_iter().map(|item| item.embedding).collect())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest {
    model: String,
    input: Vec<String>,
    encoding_format: &'static str,
}

/// OpenAI API response struct. Fields marked `dead_code` are present in the
/// response and required for serde deserialization, but not currently used.
#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingObject>,
    #[allow(dead_code)] // Deserialize: model that served the request - reserved for telemetry
    model: String,
    #[allow(dead_code)] // Deserialize: token counts - reserved for cost tracking
    usage: Option<EmbeddingsUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingObject {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsUsage {
    #[allow(dead_code)] // Deserialize: tokens in the input - reserved for cost tracking
    prompt_tokens: u32,
    #[allow(dead_code)] // Deserialize: total tokens billed - reserved for cost tracking
    total_tokens: u32,
}

#[async_trait]
impl Embedder for OpenAIEmbeddings {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            embeddings.extend(self.embed_texts(batch).await?);
        }
        Ok(embeddings)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration() {
        let embedder = OpenAIEmbeddings::new().with_api_key("test-key");
        assert_eq!(embedder.base_url, DEFAULT_BASE_URL);
        assert_eq!(embedder.model, DEFAULT_MODEL);
        assert_eq!(embedder.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn builders_override_fields() {
        let embedder = OpenAIEmbeddings::new()
            .with_api_key("test-key")
            .with_base_url("http://localhost:9999/")
            .with_model("text-embedding-3-large")
            .with_batch_size(0);
        assert_eq!(embedder.base_url, "http://localhost:9999");
        assert_eq!(embedder.model, "text-embedding-3-large");
        assert_eq!(embedder.batch_size, 1);
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let embedder = OpenAIEmbeddings::new().with_api_key("");
        let err = embedder.get_api_key().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let embedder = OpenAIEmbeddings::new().with_api_key("sk-secret");
        let rendered = format!("{embedder:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("sk-secret"));
    }

    #[test]
    fn request_serializes_expected_shape() {
        let request = EmbeddingsRequest {
            model: DEFAULT_MODEL.to_string(),
            input: vec!["hello".to_string()],
            encoding_format: "float",
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "text-embedding-3-small");
        assert_eq!(value["input"][0], "hello");
        assert_eq!(value["encoding_format"], "float");
    }

    #[test]
    fn response_parses_without_usage() {
        let parsed: EmbeddingsResponse = serde_json::from_value(serde_json::json!({
            "data": [{"embedding": [0.1, 0.2], "index": 0}],
            "model": "text-embedding-3-small"
        }))
        .unwrap();
        assert_eq!(parsed.data.len(), 1);
        assert_eq!(parsed.data[0].embedding, vec![0.1, 0.2]);
    }

    #[tokio::test]
    async fn empty_batch_skips_the_api() {
        let embedder = OpenAIEmbeddings::new().with_api_key("");
        let embeddings = embedder.embed_batch(&[]).await.unwrap();
        assert!(embeddings.is_empty());
    }

    #[tokio::test]
    #[ignore = "requires OPENAI_API_KEY"]
    async fn live_embed_query() {
        let embedder = OpenAIEmbeddings::new();
        let vector = embedder.embed("customer retention drivers").await.unwrap();
        assert!(!vector.is_empty());
    }
}
