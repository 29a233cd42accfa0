//! # Prism Jina
//!
//! Jina AI capability provider for the prism synthesis engine: a
//! [`Reranker`](prism::Reranker) backed by the `/v1/rerank` cross-encoder
//! endpoint.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use prism::{InMemoryIndex, PipelineConfig, SynthesisPipeline};
//! use prism_jina::JinaRerank;
//!
//! # async fn example(
//! #     embedder: Arc<dyn prism::Embedder>,
//! #     model: Arc<dyn prism::CompletionModel>,
//! # ) -> prism::Result<()> {
//! let index = Arc::new(InMemoryIndex::new());
//! let pipeline = SynthesisPipeline::new(index, embedder, model)
//!     .with_reranker(Arc::new(JinaRerank::new()))
//!     .with_config(PipelineConfig::deep());
//! let report = pipeline.answer("What drives retention?").await?;
//! println!("{}", report.render_markdown());
//! # Ok(())
//! # }
//! ```

pub mod rerank;

pub use rerank::JinaRerank;
