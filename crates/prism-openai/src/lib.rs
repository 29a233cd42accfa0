//! # Prism OpenAI
//!
//! OpenAI capability providers for the prism synthesis engine: an
//! [`Embedder`](prism::Embedder) backed by `/v1/embeddings` and a
//! [`CompletionModel`](prism::CompletionModel) backed by
//! `/v1/chat/completions`.
//!
//! Both clients read `OPENAI_API_KEY` from the environment, batch and retry
//! transient failures, and expose `with_*` builders for model, endpoint, and
//! policy overrides.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use prism::{Document, InMemoryIndex, Ingestor, SynthesisPipeline};
//! use prism_openai::{OpenAICompletions, OpenAIEmbeddings};
//!
//! # async fn example() -> prism::Result<()> {
//! let index: Arc<dyn prism::VectorIndex> = Arc::new(InMemoryIndex::new());
//! let embedder: Arc<dyn prism::Embedder> = Arc::new(OpenAIEmbeddings::new());
//! let model = Arc::new(OpenAICompletions::new());
//!
//! let ingestor = Ingestor::new(Arc::clone(&index), Arc::clone(&embedder));
//! ingestor
//!     .ingest(&Document::new("report.pdf", "Churn fell after onboarding improved."))
//!     .await?;
//!
//! let pipeline = SynthesisPipeline::new(index, embedder, model);
//! let report = pipeline.answer("What moved churn?").await?;
//! println!("{}", report.render_markdown());
//! # Ok(())
//! # }
//! ```

pub mod completions;
pub mod embeddings;
mod http;

pub use completions::OpenAICompletions;
pub use embeddings::OpenAIEmbeddings;
