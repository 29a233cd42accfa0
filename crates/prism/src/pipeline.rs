//! End-to-end ingestion and query pipelines.
//!
//! [`Ingestor`] feeds documents through clean, chunk, tag, embed, and store.
//! [`SynthesisPipeline`] answers questions through expansion, fan-out
//! retrieval, dedup, rerank, grouping, and synthesis. Stages between
//! expansion and synthesis run strictly in sequence for one question;
//! independent questions and documents run concurrently under a bounded
//! semaphore.

use crate::chunker::SentenceChunker;
use crate::config::{PipelineConfig, RelatedTermsTable};
use crate::dedup::dedupe;
use crate::document::Document;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::expand::{QueryExpander, SubQuery};
use crate::generation::CompletionModel;
use crate::group::SourceGroups;
use crate::index::{IndexRecord, VectorIndex};
use crate::rerank::{CandidateReranker, Reranker};
use crate::retrieve::{CancelToken, MultiQueryRetriever};
use crate::retry::{with_retry, with_retry_all, RetryPolicy};
use crate::synthesis::{SynthesisBuilder, SynthesisReport};
use crate::tagger::MetadataTagger;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::Instrument;

/// Outcome of ingesting one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Chunks newly stored in the index.
    pub chunks_added: usize,
    /// Chunks the index already held under the same id.
    pub chunks_skipped: usize,
}

/// Ingestion pipeline: clean, chunk, tag, embed, store.
pub struct Ingestor {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    config: PipelineConfig,
    retry_policy: RetryPolicy,
}

impl Ingestor {
    /// Create an ingestor writing to `index` with vectors from `embedder`.
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index,
            embedder,
            config: PipelineConfig::default(),
            retry_policy: RetryPolicy::exponential(3),
        }
    }

    /// Replace the pipeline configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the retry policy applied to embedding and store calls.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Ingest one document.
    ///
    /// The document's cleaned text is chunked at sentence boundaries,
    /// each chunk is tagged with index metadata, the batch is embedded with
    /// retries per the policy, and the records are stored. Chunk ids key on
    /// `{checksum}:{chunk_index}`, so re-ingesting an unchanged document
    /// adds nothing.
    pub async fn ingest(&self, document: &Document) -> Result<IngestReport> {
        self.config.validate()?;

        let chunker = SentenceChunker::new()
            .with_chunk_size(self.config.chunk_size)
            .with_overlap(self.config.chunk_overlap);
        let chunks = chunker.chunk_document(document);
        if chunks.is_empty() {
            return Ok(IngestReport::default());
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings =
            with_retry(&self.retry_policy, || self.embedder.embed_batch(&texts)).await?;
        if embeddings.len() != chunks.len() {
            return Err(Error::api_format(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let tagger = MetadataTagger::new();
        let records: Vec<IndexRecord> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexRecord {
                chunk_id: chunk.id(),
                embedding,
                text: chunk.text.clone(),
                metadata: tagger.index_metadata(document, chunk),
            })
            .collect();

        // The put contract is idempotent on chunk id, so retrying the whole
        // batch after any failure is safe.
        let put = with_retry_all(&self.retry_policy, || self.index.put(records.clone())).await?;
        tracing::info!(
            source_id = %document.source_id,
            added = put.num_added,
            skipped = put.num_skipped,
            "document ingested"
        );
        Ok(IngestReport {
            chunks_added: put.num_added,
            chunks_skipped: put.num_skipped,
        })
    }

    /// Ingest independent documents concurrently, at most `max_parallel` at
    /// a time. Results are returned in input order; one failed document does
    /// not abort the rest.
    pub async fn ingest_all(
        &self,
        documents: &[Document],
        max_parallel: usize,
    ) -> Vec<Result<IngestReport>> {
        let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
        let runs = documents.iter().map(|document| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return Err(Error::cancelled("ingest batch semaphore closed")),
                };
                self.ingest(document).await
            }
        });
        futures::future::join_all(runs).await
    }
}

/// The full query pipeline over injected capabilities.
///
/// Holds the vector index, the embedder, the completion model, an optional
/// rerank scorer, and the related-terms table. All tuning lives in
/// [`PipelineConfig`]; the three historical variants of this pipeline are
/// its `lean`, `broad`, and `deep` profiles.
pub struct SynthesisPipeline {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn CompletionModel>,
    scorer: Option<Arc<dyn Reranker>>,
    related_terms: Arc<RelatedTermsTable>,
    config: PipelineConfig,
}

impl SynthesisPipeline {
    /// Create a pipeline with the default configuration and no reranker.
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn CompletionModel>,
    ) -> Self {
        Self {
            index,
            embedder,
            model,
            scorer: None,
            related_terms: Arc::new(RelatedTermsTable::default()),
            config: PipelineConfig::default(),
        }
    }

    /// Attach a rerank scorer. It is consulted only when the configuration
    /// enables reranking.
    #[must_use]
    pub fn with_reranker(mut self, scorer: Arc<dyn Reranker>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Replace the related-terms table.
    #[must_use]
    pub fn with_related_terms(mut self, table: Arc<RelatedTermsTable>) -> Self {
        self.related_terms = table;
        self
    }

    /// Replace the pipeline configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Answer one question.
    pub async fn answer(&self, question: &str) -> Result<SynthesisReport> {
        self.answer_with_cancel(question, &CancelToken::never()).await
    }

    /// Answer one question under a cancellation token.
    ///
    /// Cancellation aborts outstanding retrieval calls and skips synthesis;
    /// the caller gets [`Error::Cancelled`], never a partial report. A
    /// retrieval that produces no candidates at all fails with
    /// [`Error::Retrieval`] describing what was attempted rather than
    /// synthesizing from nothing.
    pub async fn answer_with_cancel(
        &self,
        question: &str,
        cancel: &CancelToken,
    ) -> Result<SynthesisReport> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::invalid_input("question must not be blank"));
        }
        self.config.validate()?;

        let start_time = Instant::now();
        let span = tracing::info_span!(
            "pipeline.answer",
            query = %question,
            duration_ms = tracing::field::Empty
        );

        async move {
            let subqueries = if self.config.expansion_enabled {
                let expander = QueryExpander::new(Arc::clone(&self.model))
                    .with_max_subqueries(self.config.max_subqueries);
                expander.expand(question).await
            } else {
                vec![SubQuery::original(question)]
            };

            let retriever = MultiQueryRetriever::new(
                Arc::clone(&self.index),
                Arc::clone(&self.embedder),
                Arc::clone(&self.related_terms),
            );
            let mut retrieved = retriever
                .retrieve(question, &subqueries, &self.config, cancel)
                .await?;

            if retrieved.candidates.is_empty() {
                return Err(Error::retrieval(
                    question,
                    format!(
                        "no candidates retrieved ({} sub-queries issued, {} calls failed, {} timed out)",
                        retrieved.diagnostics.subqueries_issued,
                        retrieved.diagnostics.calls_failed,
                        retrieved.diagnostics.calls_timed_out
                    ),
                ));
            }

            let before = retrieved.candidates.len();
            let unique = dedupe(std::mem::take(&mut retrieved.candidates));
            retrieved.diagnostics.duplicates_removed = before - unique.len();

            let scorer = if self.config.rerank_enabled {
                self.scorer.clone()
            } else {
                None
            };
            let top = CandidateReranker::new(scorer)
                .rerank(question, unique, self.config.rerank_top_k)
                .await;

            if cancel.is_cancelled() {
                return Err(Error::cancelled(format!("query cancelled for {question:?}")));
            }

            let groups = SourceGroups::from_candidates(top);
            let builder = SynthesisBuilder::new(Arc::clone(&self.model));
            let report = tokio::select! {
                () = cancel.cancelled() => {
                    return Err(Error::cancelled(format!("query cancelled for {question:?}")));
                }
                report = builder.synthesize(question, &groups, self.config.context_budget) => report?,
            };

            retrieved.diagnostics.context_trimmed = report.context_trimmed;
            let duration_ms = start_time.elapsed().as_millis() as u64;
            tracing::Span::current().record("duration_ms", duration_ms);
            tracing::info!(
                sources = groups.len(),
                candidates = groups.candidate_count(),
                duplicates_removed = retrieved.diagnostics.duplicates_removed,
                context_trimmed = retrieved.diagnostics.context_trimmed,
                duration_ms,
                "question answered"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Answer independent questions concurrently, at most `max_parallel`
    /// end-to-end runs at a time. Results are returned in input order; one
    /// failed question does not abort the rest.
    pub async fn answer_many(
        &self,
        questions: &[String],
        max_parallel: usize,
    ) -> Vec<Result<SynthesisReport>> {
        let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
        let runs = questions.iter().map(|question| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return Err(Error::cancelled("query batch semaphore closed")),
                };
                self.answer(question).await
            }
        });
        futures::future::join_all(runs).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::index::InMemoryIndex;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const REPORT: &str = "## 1. Executive Summary\nAgreement.\n\n\
                          ## 2. Thematic Analysis\nThemes.\n\n\
                          ## 3. Comparative Framework\nContrast.\n\n\
                          ## 4. Strategic Implications\nActions.\n\n\
                          ## 5. Key Takeaways\n- one\n";

    struct ConstantEmbedder;

    #[async_trait]
    impl Embedder for ConstantEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn unit_embedder() -> Arc<ConstantEmbedder> {
        Arc::new(ConstantEmbedder)
    }

    struct PoisonEmbedder;

    #[async_trait]
    impl Embedder for PoisonEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.iter().any(|text| text.contains("poison")) {
                return Err(Error::api("embedding refused"));
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    /// Pops one scripted response per call, falling back to [`REPORT`].
    struct ScriptedModel {
        responses: Mutex<VecDeque<String>>,
        calls: AtomicUsize,
        current: AtomicUsize,
        max_seen: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedModel {
        fn new(responses: &[&str]) -> Self {
            Self {
                responses: Mutex::new(
                    responses.iter().map(|response| response.to_string()).collect(),
                ),
                calls: AtomicUsize::new(0),
                current: AtomicUsize::new(0),
                max_seen: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl CompletionModel for ScriptedModel {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            let active = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(active, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            let response = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| REPORT.to_string());
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(response)
        }
    }

    #[tokio::test]
    async fn answer_end_to_end_over_ingested_documents() {
        let index: Arc<dyn VectorIndex> = Arc::new(InMemoryIndex::new());
        let embedder: Arc<dyn Embedder> = unit_embedder();
        let ingestor = Ingestor::new(Arc::clone(&index), Arc::clone(&embedder));
        ingestor
            .ingest(&Document::new("alpha.pdf", "Commitment grows from ownership."))
            .await
            .unwrap();
        ingestor
            .ingest(&Document::new("beta.pdf", "Sellers hesitate without trust."))
            .await
            .unwrap();

        let model = Arc::new(ScriptedModel::new(&[REPORT]));
        let pipeline =
            SynthesisPipeline::new(index, embedder, Arc::clone(&model) as Arc<dyn CompletionModel>)
                .with_config(PipelineConfig::lean());

        let answer = pipeline.answer("what drives commitment").await.unwrap();

        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        assert_eq!(answer.question, "what drives commitment");
        assert_eq!(answer.sections.len(), 5);
        assert_eq!(answer.sections[0].title, "Executive Summary");
        let mut sources: Vec<&str> = answer
            .sources
            .iter()
            .map(|source| source.source_id.as_str())
            .collect();
        sources.sort_unstable();
        assert_eq!(sources, ["alpha.pdf", "beta.pdf"]);
    }

    #[tokio::test]
    async fn answer_expands_queries_with_the_deep_profile() {
        let index: Arc<dyn VectorIndex> = Arc::new(InMemoryIndex::new());
        let embedder: Arc<dyn Embedder> = unit_embedder();
        Ingestor::new(Arc::clone(&index), Arc::clone(&embedder))
            .ingest(&Document::new("alpha.pdf", "Commitment grows from ownership."))
            .await
            .unwrap();

        let model = Arc::new(ScriptedModel::new(&[
            r#"["commitment drivers", "ownership and motivation"]"#,
            REPORT,
        ]));
        let pipeline =
            SynthesisPipeline::new(index, embedder, Arc::clone(&model) as Arc<dyn CompletionModel>);

        let answer = pipeline.answer("what drives commitment").await.unwrap();

        // One completion for expansion, one for synthesis.
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
        assert_eq!(answer.sections.len(), 5);
    }

    #[tokio::test]
    async fn answer_rejects_a_blank_question() {
        let pipeline = SynthesisPipeline::new(
            Arc::new(InMemoryIndex::new()),
            unit_embedder(),
            Arc::new(ScriptedModel::new(&[])),
        );
        let err = pipeline.answer("   ").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn answer_reports_diagnostics_when_nothing_is_retrieved() {
        let pipeline = SynthesisPipeline::new(
            Arc::new(InMemoryIndex::new()),
            unit_embedder(),
            Arc::new(ScriptedModel::new(&[])),
        )
        .with_config(PipelineConfig::lean());

        let err = pipeline.answer("anything at all").await.unwrap_err();
        match err {
            Error::Retrieval { query, reason } => {
                assert_eq!(query, "anything at all");
                assert!(reason.contains("no candidates retrieved"));
                assert!(reason.contains("sub-queries issued"));
            }
            other => panic!("expected retrieval error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_query_produces_no_report_and_no_completion() {
        let index: Arc<dyn VectorIndex> = Arc::new(InMemoryIndex::new());
        let embedder: Arc<dyn Embedder> = unit_embedder();
        Ingestor::new(Arc::clone(&index), Arc::clone(&embedder))
            .ingest(&Document::new("alpha.pdf", "Commitment grows from ownership."))
            .await
            .unwrap();

        let model = Arc::new(ScriptedModel::new(&[]));
        let pipeline =
            SynthesisPipeline::new(index, embedder, Arc::clone(&model) as Arc<dyn CompletionModel>)
                .with_config(PipelineConfig::lean());

        let (token, guard) = CancelToken::new();
        guard.cancel();
        let err = pipeline
            .answer_with_cancel("what drives commitment", &token)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled(_)));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn answer_many_bounds_concurrency_and_preserves_order() {
        let index: Arc<dyn VectorIndex> = Arc::new(InMemoryIndex::new());
        let embedder: Arc<dyn Embedder> = unit_embedder();
        Ingestor::new(Arc::clone(&index), Arc::clone(&embedder))
            .ingest(&Document::new("alpha.pdf", "Commitment grows from ownership."))
            .await
            .unwrap();

        let model = Arc::new(ScriptedModel::new(&[]).with_delay(Duration::from_millis(10)));
        let pipeline =
            SynthesisPipeline::new(index, embedder, Arc::clone(&model) as Arc<dyn CompletionModel>)
                .with_config(PipelineConfig::lean());

        let questions = vec![
            "first question".to_string(),
            "  ".to_string(),
            "third question".to_string(),
        ];
        let results = pipeline.answer_many(&questions, 1).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().question, "first question");
        assert!(matches!(results[1], Err(Error::InvalidInput(_))));
        assert_eq!(results[2].as_ref().unwrap().question, "third question");
        assert_eq!(model.max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reingesting_an_unchanged_document_adds_nothing() {
        let ingestor = Ingestor::new(Arc::new(InMemoryIndex::new()), unit_embedder());
        let document = Document::new("alpha.pdf", "Commitment grows from ownership.");

        let first = ingestor.ingest(&document).await.unwrap();
        assert_eq!(first.chunks_added, 1);
        assert_eq!(first.chunks_skipped, 0);

        let second = ingestor.ingest(&document).await.unwrap();
        assert_eq!(second.chunks_added, 0);
        assert_eq!(second.chunks_skipped, 1);
    }

    #[tokio::test]
    async fn ingesting_an_empty_document_is_a_no_op() {
        let ingestor = Ingestor::new(Arc::new(InMemoryIndex::new()), unit_embedder());
        let report = ingestor
            .ingest(&Document::new("empty.pdf", ""))
            .await
            .unwrap();
        assert_eq!(report, IngestReport::default());
    }

    #[tokio::test]
    async fn ingest_all_keeps_going_past_a_failing_document() {
        let ingestor = Ingestor::new(Arc::new(InMemoryIndex::new()), Arc::new(PoisonEmbedder))
            .with_retry_policy(RetryPolicy::immediate(1));
        let documents = vec![
            Document::new("good.pdf", "Useful content here."),
            Document::new("bad.pdf", "This text is poison."),
        ];

        let results = ingestor.ingest_all(&documents, 2).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().chunks_added, 1);
        assert!(results[1].is_err());
    }
}
