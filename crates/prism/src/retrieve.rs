//! Multi-strategy retrieval fan-out.
//!
//! For one question the retriever issues a batch of independent index calls:
//! one per sub-query (the primary pass), one per long token of the original
//! question (concept fan-out), and one per related term from the injected
//! table. Calls run concurrently under a bounded fan-out with a per-call
//! timeout and an overall deadline; failed or slow calls are skipped and the
//! aggregation proceeds with whatever arrived. Results are reassembled in
//! plan order regardless of completion order: primary, then concept, then
//! related.

use crate::config::{PipelineConfig, RelatedTermsTable};
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::expand::SubQuery;
use crate::index::{IndexHit, VectorIndex};
use crate::retry::{with_retry, RetryPolicy};
use crate::text;
use futures::StreamExt;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;

/// Which strategy produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStrategy {
    /// Nearest-neighbour search for a sub-query.
    Primary,
    /// Search for a single long token of the original question.
    Concept,
    /// Search for a term from the related-terms table.
    Related,
}

/// A retrieved passage with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Passage text as stored in the index.
    pub text: String,
    /// Originating document, from the stored `file_name` metadata.
    pub source_id: String,
    /// Full metadata stored with the chunk.
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Distance reported by the index. Lower is closer.
    pub distance: f32,
    /// Strategy that retrieved this candidate.
    pub strategy: RetrievalStrategy,
    /// Position within the originating index call.
    pub rank: usize,
}

impl Candidate {
    fn from_hit(hit: IndexHit, strategy: RetrievalStrategy, rank: usize) -> Self {
        let source_id = hit
            .metadata_str("file_name")
            .unwrap_or("unknown")
            .to_string();
        Self {
            text: hit.text,
            source_id,
            metadata: hit.metadata,
            distance: hit.distance,
            strategy,
            rank,
        }
    }
}

/// Counters describing how retrieval went for one question.
///
/// Later stages keep this up to date: dedup records removals, synthesis
/// records context trimming. Surfaced to callers inside
/// [`RetrievalResult`] and in error messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetrievalDiagnostics {
    /// Sub-queries issued in the primary pass.
    pub subqueries_issued: usize,
    /// Index calls that returned an error, any strategy.
    pub calls_failed: usize,
    /// Index calls dropped by the per-call timeout or the overall deadline.
    pub calls_timed_out: usize,
    /// Candidates returned by the primary pass, pre-dedup.
    pub primary_candidates: usize,
    /// Candidates returned by concept fan-out, pre-dedup.
    pub concept_candidates: usize,
    /// Candidates returned by related-term expansion, pre-dedup.
    pub related_candidates: usize,
    /// Duplicate candidates removed by the dedup stage.
    pub duplicates_removed: usize,
    /// Whether the assembled context had to be trimmed to the budget.
    pub context_trimmed: bool,
}

/// Candidates for one question, with diagnostics.
///
/// Fresh from the retriever the candidates are the raw pre-dedup
/// aggregation; the dedup and rerank stages refine the same value in place.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    /// The user's question.
    pub query: String,
    /// Candidates in current pipeline order.
    pub candidates: Vec<Candidate>,
    /// Counters for this retrieval.
    pub diagnostics: RetrievalDiagnostics,
}

/// Cooperative cancellation handle for an in-flight query.
///
/// Created with [`CancelToken::new`], which also returns the guard used to
/// request cancellation. A token whose guard is dropped without cancelling
/// behaves like [`CancelToken::never`].
#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: Option<watch::Receiver<bool>>,
}

/// Requests cancellation of the linked [`CancelToken`]s.
#[derive(Debug)]
pub struct CancelGuard {
    sender: watch::Sender<bool>,
}

impl CancelToken {
    /// A token and the guard that cancels it.
    #[must_use]
    pub fn new() -> (Self, CancelGuard) {
        let (sender, receiver) = watch::channel(false);
        (
            Self {
                receiver: Some(receiver),
            },
            CancelGuard { sender },
        )
    }

    /// A token that is never cancelled.
    #[must_use]
    pub fn never() -> Self {
        Self { receiver: None }
    }

    /// True once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.receiver.as_ref().is_some_and(|r| *r.borrow())
    }

    /// Resolves when cancellation is requested; otherwise pends forever.
    pub async fn cancelled(&self) {
        match &self.receiver {
            Some(receiver) => {
                let mut receiver = receiver.clone();
                if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
                    // Guard dropped without cancelling
                    std::future::pending::<()>().await;
                }
            }
            None => std::future::pending::<()>().await,
        }
    }
}

impl CancelGuard {
    /// Cancel all linked tokens.
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }
}

/// One index call the retriever intends to make.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PlannedCall {
    query: String,
    k: usize,
    strategy: RetrievalStrategy,
}

/// Fans retrieval out across sub-queries, concept tokens, and related terms.
pub struct MultiQueryRetriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    related_terms: Arc<RelatedTermsTable>,
    retry_policy: RetryPolicy,
}

impl MultiQueryRetriever {
    /// Create a retriever over `index`, embedding queries with `embedder`.
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        related_terms: Arc<RelatedTermsTable>,
    ) -> Self {
        Self {
            index,
            embedder,
            related_terms,
            retry_policy: RetryPolicy::exponential(3),
        }
    }

    /// Set the retry policy applied to query embedding calls.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Run the full fan-out for `question`.
    ///
    /// Returns the aggregated candidates in plan order with per-strategy
    /// diagnostics. Individual call failures and timeouts are skipped;
    /// only cancellation produces an error.
    pub async fn retrieve(
        &self,
        question: &str,
        subqueries: &[SubQuery],
        config: &PipelineConfig,
        cancel: &CancelToken,
    ) -> Result<RetrievalResult> {
        if cancel.is_cancelled() {
            return Err(Error::cancelled(format!(
                "retrieval cancelled for {question:?}"
            )));
        }

        let plan = self.build_plan(question, subqueries, config);
        let plan_len = plan.len();
        let mut diagnostics = RetrievalDiagnostics {
            subqueries_issued: subqueries.len(),
            ..RetrievalDiagnostics::default()
        };

        let index = self.index.as_ref();
        let embedder = self.embedder.as_ref();
        let policy = &self.retry_policy;
        let per_call_timeout = config.per_call_timeout;

        let mut stream = futures::stream::iter(plan.into_iter().enumerate())
            .map(|(plan_idx, call)| async move {
                let outcome =
                    tokio::time::timeout(per_call_timeout, run_call(index, embedder, policy, &call))
                        .await;
                (plan_idx, call, outcome)
            })
            .buffer_unordered(config.max_concurrency.max(1));

        let deadline = tokio::time::Instant::now() + config.overall_deadline;
        let mut slots: Vec<Option<Vec<Candidate>>> = (0..plan_len).map(|_| None).collect();
        let mut completed = 0usize;

        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => {
                    tracing::warn!(query = question, "retrieval cancelled, aborting outstanding calls");
                    return Err(Error::cancelled(format!(
                        "retrieval cancelled for {question:?}"
                    )));
                }
                next = tokio::time::timeout_at(deadline, stream.next()) => next,
            };

            match next {
                Ok(Some((plan_idx, call, outcome))) => {
                    completed += 1;
                    match outcome {
                        Ok(Ok(hits)) => {
                            let batch: Vec<Candidate> = hits
                                .into_iter()
                                .enumerate()
                                .map(|(rank, hit)| Candidate::from_hit(hit, call.strategy, rank))
                                .collect();
                            match call.strategy {
                                RetrievalStrategy::Primary => {
                                    diagnostics.primary_candidates += batch.len();
                                }
                                RetrievalStrategy::Concept => {
                                    diagnostics.concept_candidates += batch.len();
                                }
                                RetrievalStrategy::Related => {
                                    diagnostics.related_candidates += batch.len();
                                }
                            }
                            slots[plan_idx] = Some(batch);
                        }
                        Ok(Err(error)) => {
                            diagnostics.calls_failed += 1;
                            tracing::warn!(
                                query = %call.query,
                                error = %error,
                                "retrieval failed for query, skipping"
                            );
                        }
                        Err(_) => {
                            diagnostics.calls_timed_out += 1;
                            tracing::warn!(query = %call.query, "index call timed out, skipping");
                        }
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    let outstanding = plan_len - completed;
                    diagnostics.calls_timed_out += outstanding;
                    tracing::warn!(
                        query = question,
                        outstanding,
                        "retrieval deadline reached, proceeding with partial results"
                    );
                    break;
                }
            }
        }
        drop(stream);

        let mut candidates = Vec::new();
        for slot in slots {
            if let Some(mut batch) = slot {
                candidates.append(&mut batch);
            }
        }

        tracing::debug!(
            query = question,
            candidates = candidates.len(),
            failed = diagnostics.calls_failed,
            timed_out = diagnostics.calls_timed_out,
            "retrieval fan-out complete"
        );

        Ok(RetrievalResult {
            query: question.to_string(),
            candidates,
            diagnostics,
        })
    }

    /// Primary calls in sub-query order, then one call per distinct long
    /// token of the question, then one per related term.
    fn build_plan(
        &self,
        question: &str,
        subqueries: &[SubQuery],
        config: &PipelineConfig,
    ) -> Vec<PlannedCall> {
        let mut plan = Vec::new();

        let per_query_k = (config.retrieval_budget / subqueries.len().max(1)).max(1);
        for subquery in subqueries {
            plan.push(PlannedCall {
                query: subquery.text.clone(),
                k: per_query_k,
                strategy: RetrievalStrategy::Primary,
            });
        }

        if config.concept_k > 0 {
            let mut seen = HashSet::new();
            for token in text::tokens(question) {
                if token.len() > 3 && seen.insert(token.clone()) {
                    plan.push(PlannedCall {
                        query: token,
                        k: config.concept_k,
                        strategy: RetrievalStrategy::Concept,
                    });
                }
            }
        }

        if config.related_k > 0 {
            for term in self.related_terms.lookup(question) {
                plan.push(PlannedCall {
                    query: term,
                    k: config.related_k,
                    strategy: RetrievalStrategy::Related,
                });
            }
        }

        plan
    }
}

async fn run_call(
    index: &dyn VectorIndex,
    embedder: &dyn Embedder,
    policy: &RetryPolicy,
    call: &PlannedCall,
) -> Result<Vec<IndexHit>> {
    let embedding = with_retry(policy, || embedder.embed(&call.query)).await?;
    index.query(&embedding, call.k).await
}
