//! # Jina Reranker
//!
//! Implements the [`Reranker`] capability against Jina AI's `/v1/rerank`
//! endpoint. Every `(query, passage)` pair receives a cross-encoder
//! relevance score, returned in input order.
//!
//! ## Example
//!
//! ```no_run
//! use prism::Reranker;
//! use prism_jina::JinaRerank;
//!
//! # async fn example() -> prism::Result<()> {
//! let reranker = JinaRerank::new();
//! let scores = reranker
//!     .score(vec![(
//!         "What drives churn?".to_string(),
//!         "Churn fell after onboarding improved.".to_string(),
//!     )])
//!     .await?;
//! println!("{scores:?}");
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use prism::{Error, Reranker, Result};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

const API_KEY_ENV: &str = "JINA_API_KEY";
const DEFAULT_BASE_URL: &str = "https://api.jina.ai";
const DEFAULT_MODEL: &str = "jina-reranker-v1-base-en";

/// Jina AI reranker client.
///
/// Reads `JINA_API_KEY` from the environment by default; override with
/// [`with_api_key`](Self::with_api_key).
pub struct JinaRerank {
    api_key: Option<String>,
    base_url: String,
    model: String,
    client: Client,
}

impl Default for JinaRerank {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for JinaRerank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JinaRerank")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl JinaRerank {
    #[must_use]
    pub fn new() -> Self {
        Self {
            api_key: std::env::var(API_KEY_ENV).ok(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            client: Client::new(),
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

    fn get_api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(Error::config(
                "JINA_API_KEY not set. Provide it via the environment or with_api_key()",
            )),
        }
    }
}

/// Map a non-success response to the matching error variant, keeping the
/// response body as context.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = format!("Jina API error {status}: {body}");
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::authentication(message),
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimit(message),
        _ if status.is_server_error() => Error::Http(message),
        _ => Error::api(message),
    })
}

#[derive(Debug, Serialize)]
struct RerankRequest {
    query: String,
    documents: Vec<String>,
    model: String,
}

/// Jina API response struct. Fields marked `dead_code` are present in the
/// response and required for serde deserialization, but not currently used.
#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
    #[allow(dead_code)] // Deserialize: model that served the request - reserved for telemetry
    model: Option<String>,
    #[allow(dead_code)] // Deserialize: token counts - reserved for cost tracking
    usage: Option<RerankUsage>,
}

#[derive(Debug, Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f64,
}

#[derive(Debug, Deserialize)]
struct RerankUsage {
    #[allow(dead_code)] // Deserialize: total tokens billed - reserved for cost tracking
    total_tokens: u32,
}

#[async_trait]
impl Reranker for JinaRerank {
    async fn score(&self, pairs: Vec<(String, String)>) -> Result<Vec<f32>> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        let api_key = self.get_api_key()?;
        let url = format!("{}/v1/rerank", self.base_url);

        // The endpoint scores one query against many documents. The pipeline
        // pairs every candidate with the same question, so the first pair's
        // query stands for the batch.
        let query = pairs[0].0.clone();
        let documents: Vec<String> = pairs.into_iter().map(|(_, passage)| passage).collect();
        let expected = documents.len();
        let request = RerankRequest {
            query,
            documents,
            model: self.model.clone(),
        };
        tracing::debug!(documents = expected, model = %self.model, "requesting rerank scores");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|err| Error::network(format!("Jina rerank request failed: {err}")))?;
        let response = check_status(response).await?;

        let parsed: RerankResponse = response.json().await.map_err(|err| {
            Error::api_format(format!("failed to parse Jina rerank response: {err}"))
        })?;

        let mut scores: Vec<Option<f32>> = vec![None; expected];
        for result in parsed.results {
            match scores.get_mut(result.index) {
                Some(slot) => *slot = Some(result.relevance_score as f32),
                None => {
                    return Err(Error::api_format(format!(
                        "Jina returned index {} for {expected} documents",
                        result.index
                    )))
                }
            }
        }
        scores
            .into_iter()
            .enumerate()
            .map(|(index, score)| {
                score.ok_or_else(|| {
                    Error::api_format(format!("Jina response missing a score for document {index}"))
                })
            })
            .collect()
    }
}
