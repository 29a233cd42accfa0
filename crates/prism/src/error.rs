//! Error types for the synthesis engine.
//!
//! Every pipeline stage reports failures through [`Error`]. Use
//! [`Error::category()`] to decide how to react, [`Error::is_retryable()`]
//! before handing an error to [`crate::retry::with_retry`], and
//! [`Error::is_recoverable()`] to ask whether the pipeline has a defined
//! degraded path for the failure (template expansion, rerank passthrough,
//! context truncation).

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error category for systematic handling and reporting.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Account/billing issues (insufficient credits, quota exceeded).
    AccountBilling,

    /// Authentication/authorization issues (invalid keys, expired tokens).
    Authentication,

    /// API format mismatches (parsing errors, unexpected response shapes).
    ApiFormat,

    /// Network/infrastructure issues (timeouts, connection refused).
    Network,

    /// Validation errors (invalid input, constraint violations).
    Validation,

    /// Pipeline stage failures with a defined degraded path.
    Stage,

    /// Other/unknown errors.
    Unknown,
}

impl ErrorCategory {
    /// Human-readable description of the category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCategory::AccountBilling => "Account/Billing Issue",
            ErrorCategory::Authentication => "Authentication/Authorization Issue",
            ErrorCategory::ApiFormat => "API Format Mismatch",
            ErrorCategory::Network => "Network/Infrastructure Issue",
            ErrorCategory::Validation => "Validation Error",
            ErrorCategory::Stage => "Pipeline Stage Failure",
            ErrorCategory::Unknown => "Unknown Error",
        }
    }

    /// Whether the category describes an environmental issue rather than a
    /// problem with the request itself.
    #[must_use]
    pub fn is_environmental(&self) -> bool {
        matches!(
            self,
            ErrorCategory::AccountBilling | ErrorCategory::Authentication | ErrorCategory::Network
        )
    }
}

/// Core error type for engine operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// Query expansion failed. Recoverable: the pipeline substitutes the
    /// deterministic template set.
    #[error("Query expansion failed: {0}")]
    Expansion(String),

    /// A retrieval call failed for one sub-query. The retriever records it
    /// in the diagnostics and continues with the remaining sub-queries.
    #[error("Retrieval failed for {query:?}: {reason}")]
    Retrieval {
        /// The sub-query whose index call failed.
        query: String,
        /// What went wrong.
        reason: String,
    },

    /// Candidate deduplication failed.
    #[error("Deduplication failed: {0}")]
    Dedup(String),

    /// Reranking failed. Recoverable: the pipeline keeps the pre-rerank
    /// candidate order, truncated to the rerank width.
    #[error("Rerank failed: {0}")]
    Rerank(String),

    /// Assembled context exceeded the configured character budget.
    /// Recoverable: the pipeline retries with a truncated context.
    #[error("Context of {size} chars exceeds budget of {budget}")]
    ContextOverflow {
        /// Character length of the assembled context.
        size: usize,
        /// Configured budget it had to fit in.
        budget: usize,
    },

    /// The synthesis model call failed. Not recoverable: the pipeline has no
    /// answer to degrade to.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// The overall deadline elapsed or a caller-supplied token fired before
    /// the pipeline produced a report.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// Input validation error.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error (non-success status).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Network error. Usually transient and retryable.
    #[error("Network error: {0}")]
    Network(String),

    /// Authentication/authorization error.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Provider API error. [`Error::category()`] inspects the message to
    /// distinguish auth, billing, and transient network causes.
    #[error("API error: {0}")]
    Api(String),

    /// API response did not match the expected shape.
    #[error("API format error: {0}")]
    ApiFormat(String),

    /// Rate limit error. Retryable after backoff.
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Timeout error. Retryable.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Capability not provided by this implementation.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Generic error for anything else.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Authentication(_) => ErrorCategory::Authentication,
            Error::ApiFormat(_) => ErrorCategory::ApiFormat,
            Error::Network(_) | Error::RateLimit(_) | Error::Timeout(_) => ErrorCategory::Network,
            Error::InvalidInput(_) | Error::Configuration(_) => ErrorCategory::Validation,
            Error::Expansion(_)
            | Error::Retrieval { .. }
            | Error::Dedup(_)
            | Error::Rerank(_)
            | Error::ContextOverflow { .. }
            | Error::Generation(_) => ErrorCategory::Stage,
            Error::Api(msg) => {
                let msg_lower = msg.to_lowercase();

                if msg_lower.contains("invalid api key")
                    || msg_lower.contains("invalid_api_key")
                    || msg_lower.contains("unauthorized")
                    || msg_lower.contains("authentication")
                {
                    return ErrorCategory::Authentication;
                }

                if msg_lower.contains("insufficient_quota")
                    || msg_lower.contains("insufficient credits")
                    || msg_lower.contains("quota exceeded")
                    || msg_lower.contains("billing")
                    || msg_lower.contains("payment required")
                {
                    return ErrorCategory::AccountBilling;
                }

                if msg_lower.contains("connection refused")
                    || msg_lower.contains("connection reset")
                    || msg_lower.contains("connection closed")
                    || msg_lower.contains("timed out")
                    || msg_lower.contains("timeout")
                    || msg_lower.contains("rate limit")
                    || msg_lower.contains("too many requests")
                    || msg_lower.contains("429")
                    || msg_lower.contains("dns error")
                    || msg_lower.contains("unexpected end of")
                {
                    return ErrorCategory::Network;
                }

                ErrorCategory::Unknown
            }
            _ => ErrorCategory::Unknown,
        }
    }

    /// Status message with the category prefix, for logs and reports.
    #[must_use]
    pub fn status_message(&self) -> String {
        format!("[{}] {}", self.category().description(), self)
    }

    /// Whether retrying the failed call may succeed.
    ///
    /// True for transient errors (network, timeout, rate limit). False for
    /// errors that need a configuration change or a code fix.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_)
                | Error::Timeout(_)
                | Error::RateLimit(_)
                | Error::Http(_)
                | Error::Io(_)
        ) || (matches!(self, Error::Api(_)) && self.category() == ErrorCategory::Network)
    }

    /// Whether the pipeline defines a degraded path for this error.
    ///
    /// Expansion falls back to the template set, rerank falls back to
    /// truncation, and context overflow falls back to a truncated context.
    /// Everything else aborts the query.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Expansion(_) | Error::Rerank(_) | Error::ContextOverflow { .. }
        )
    }

    /// Create an authentication error.
    pub fn authentication<S: Into<String>>(msg: S) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create an API format error.
    pub fn api_format<S: Into<String>>(msg: S) -> Self {
        Self::ApiFormat(msg.into())
    }

    /// Create an API error.
    pub fn api<S: Into<String>>(msg: S) -> Self {
        Self::Api(msg.into())
    }

    /// Create a network error.
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Create a configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a retrieval error for one sub-query.
    pub fn retrieval<Q: Into<String>, R: Into<String>>(query: Q, reason: R) -> Self {
        Self::Retrieval {
            query: query.into(),
            reason: reason.into(),
        }
    }

    /// Create a generation error.
    pub fn generation<S: Into<String>>(msg: S) -> Self {
        Self::Generation(msg.into())
    }

    /// Create a cancellation error.
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create a generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }
}
