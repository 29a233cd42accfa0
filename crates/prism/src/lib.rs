//! Retrieval-augmented synthesis over a document corpus.
//!
//! Prism ingests documents into a vector index and answers questions with a
//! structured, source-attributed synthesis report. The query path expands a
//! question into sub-queries, fans out retrieval over them together with
//! concept and related-term probes, deduplicates and reranks the candidates,
//! groups them by source, and drives a single completion call that produces
//! the report.
//!
//! The external capabilities (vector index, embeddings, completions,
//! reranking) are trait objects, so the pipeline runs against any backend.
//! [`InMemoryIndex`] is the bundled reference index; the `prism-openai` and
//! `prism-jina` crates provide hosted implementations of the rest.
//!
//! # Example
//!
//! ```no_run
//! use prism::{Document, InMemoryIndex, Ingestor, PipelineConfig, SynthesisPipeline};
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     embedder: Arc<dyn prism::Embedder>,
//! #     model: Arc<dyn prism::CompletionModel>,
//! # ) -> Result<(), prism::Error> {
//! let index: Arc<dyn prism::VectorIndex> = Arc::new(InMemoryIndex::new());
//!
//! let ingestor = Ingestor::new(Arc::clone(&index), Arc::clone(&embedder));
//! ingestor
//!     .ingest(&Document::new("handbook.pdf", "Commitment grows from ownership."))
//!     .await?;
//!
//! let pipeline = SynthesisPipeline::new(index, embedder, model)
//!     .with_config(PipelineConfig::deep());
//! let report = pipeline.answer("what drives commitment?").await?;
//! println!("{}", report.render_markdown());
//! # Ok(())
//! # }
//! ```

pub mod chunker;
pub mod config;
pub mod dedup;
pub mod document;
pub mod embedding;
pub mod error;
pub mod expand;
pub mod generation;
pub mod group;
pub mod index;
pub mod pipeline;
pub mod rerank;
pub mod retrieve;
pub mod retry;
pub mod synthesis;
pub mod tagger;
pub mod text;

pub use chunker::{SentenceChunker, TextChunk};
pub use config::{PipelineConfig, RelatedTermEntry, RelatedTermsTable};
pub use dedup::dedupe;
pub use document::{content_checksum, Chunk, ChunkKind, Document, Page};
pub use embedding::Embedder;
pub use error::{Error, Result};
pub use expand::{QueryExpander, SubQuery, SubQueryOrigin};
pub use generation::CompletionModel;
pub use group::SourceGroups;
pub use index::{InMemoryIndex, IndexHit, IndexRecord, PutReport, VectorIndex};
pub use pipeline::{IngestReport, Ingestor, SynthesisPipeline};
pub use rerank::{CandidateReranker, Reranker};
pub use retrieve::{
    CancelGuard, CancelToken, Candidate, MultiQueryRetriever, RetrievalDiagnostics,
    RetrievalResult, RetrievalStrategy,
};
pub use retry::{with_retry, RetryPolicy};
pub use synthesis::{
    ContextBuild, ReportSection, SourceSummary, SynthesisBuilder, SynthesisReport,
};
pub use tagger::MetadataTagger;
