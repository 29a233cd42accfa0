//! # OpenAI Chat Completions
//!
//! Implements the [`CompletionModel`] capability against OpenAI's
//! `/v1/chat/completions` endpoint. Each call sends an optional system
//! message plus the prompt and returns the first choice's content.
//!
//! ## Example
//!
//! ```no_run
//! use prism::CompletionModel;
//! use prism_openai::OpenAICompletions;
//!
//! # async fn example() -> prism::Result<()> {
//! let model = OpenAICompletions::new().with_temperature(0.1);
//! let answer = model.complete("Summarize the retention findings.").await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use prism::{with_retry, CompletionModel, Error, Result, RetryPolicy};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::http::check_status;

const API_KEY_ENV: &str = "OPENAI_API_KEY";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TEMPERATURE: f32 = 0.1;

/// OpenAI chat completions client.
///
/// Reads `OPENAI_API_KEY` from the environment by default; override with
/// [`with_api_key`](Self::with_api_key).
pub struct OpenAICompletions {
    api_key: Option<String>,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    system_prompt: Option<String>,
    client: Client,
    retry_policy: RetryPolicy,
}

impl Default for OpenAICompletions {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OpenAICompletions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAICompletions")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl OpenAICompletions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            api_key: std::env::var(API_KEY_ENV).ok(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            system_prompt: None,
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

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Prepend a system message to every request.
    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
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
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// OpenAI API response struct. Fields marked `dead_code` are present in the
/// response and required for serde deserialization, but not currently used.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[allow(dead_code)] // Deserialize: model that served the request - reserved for telemetry
    model: String,
    #[allow(dead_code)] // Deserialize: token counts - reserved for cost tracking
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    #[allow(dead_code)] // Deserialize: stop reason - reserved for truncation detection
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    // Null when the model answers with something other than text.
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[allow(dead_code)] // Deserialize: tokens in the prompt - reserved for cost tracking
    prompt_tokens: u32,
    #[allow(dead_code)] // Deserialize: tokens in the completion - reserved for cost tracking
    completion_tokens: u32,
}

#[async_trait]
impl CompletionModel for OpenAICompletions {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let api_key = self.get_api_key()?;
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt.to_string(),
        });

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "requesting completion");

        let response = with_retry(&self.retry_policy, || async {
            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {api_key}"))
                .header("Content-Type", "application/json")
                .json(&request)
                .send()
                .await
                .map_err(|err| Error::network(format!("OpenAI chat request failed: {err}")))?;
            check_status(response).await
        })
        .await?;

        let parsed: ChatResponse = response.json().await.map_err(|err| {
            Error::api_format(format!("failed to parse OpenAI chat response: {err}"))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::api_format("OpenAI response contained no completion text"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration() {
        let model = OpenAICompletions::new().with_api_key("test-key");
        assert_eq!(model.base_url, DEFAULT_BASE_URL);
        assert_eq!(model.model, DEFAULT_MODEL);
        assert!((model.temperature - DEFAULT_TEMPERATURE).abs() < f32::EPSILON);
        assert!(model.max_tokens.is_none());
        assert!(model.system_prompt.is_none());
    }

    #[test]
    fn builders_override_fields() {
        let model = OpenAICompletions::new()
            .with_api_key("test-key")
            .with_base_url("http://localhost:9999/")
            .with_model("gpt-4o")
            .with_temperature(0.7)
            .with_max_tokens(2048)
            .with_system_prompt("You are terse.");
        assert_eq!(model.base_url, "http://localhost:9999");
        assert_eq!(model.model, "gpt-4o");
        assert_eq!(model.max_tokens, Some(2048));
        assert_eq!(model.system_prompt.as_deref(), Some("You are terse."));
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let model = OpenAICompletions::new().with_api_key("");
        let err = model.get_api_key().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn debug_redacts_api_key() {
        let model = OpenAICompletions::new().with_api_key("sk-secret");
        let rendered = format!("{model:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("sk-secret"));
    }

    #[test]
    fn request_omits_absent_max_tokens() {
        let request = ChatRequest {
            model: DEFAULT_MODEL.to_string(),
            messages: vec![ChatMessage {
                role: "user",
                content: "hello".to_string(),
            }],
            temperature: 0.1,
            max_tokens: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("max_tokens").is_none());
        assert_eq!(value["messages"][0]["role"], "user");
    }

    #[test]
    fn response_parses_null_content() {
        let parsed: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"content": null}, "finish_reason": "tool_calls"}],
            "model": "gpt-4o-mini"
        }))
        .unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }

    #[tokio::test]
    #[ignore = "requires OPENAI_API_KEY"]
    async fn live_complete() {
        let model = OpenAICompletions::new();
        let answer = model.complete("Reply with the word ready.").await.unwrap();
        assert!(!answer.is_empty());
    }
}
