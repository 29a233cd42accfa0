//! Candidate reranking.
//!
//! Initial retrieval ranks by embedding distance, which is coarse. When a
//! rerank capability is configured, candidates are rescored as
//! `(query, passage)` pairs and reordered by descending score. Reranking is
//! strictly a permutation-then-truncation: it never invents or drops a
//! distinct candidate beyond the `top_k` cut, and any scorer trouble
//! degrades silently to plain truncation.

use crate::error::Result;
use crate::retrieve::Candidate;
use async_trait::async_trait;
use std::sync::Arc;

/// Scores `(query, passage)` pairs. Higher means more relevant.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// One score per input pair, in input order.
    async fn score(&self, pairs: Vec<(String, String)>) -> Result<Vec<f32>>;
}

/// Applies a [`Reranker`] to candidates with a truncation fallback.
pub struct CandidateReranker {
    scorer: Option<Arc<dyn Reranker>>,
}

impl CandidateReranker {
    /// Create the stage. With `None` the stage only truncates.
    pub fn new(scorer: Option<Arc<dyn Reranker>>) -> Self {
        Self { scorer }
    }

    /// Reorder `candidates` by relevance to `query` and keep the `top_k`
    /// best.
    ///
    /// No scoring is attempted when the list already fits in `top_k` or no
    /// scorer is configured; the prefix is returned unchanged. A scorer
    /// error or a score-count mismatch also falls back to the unchanged
    /// prefix. Never fails.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<Candidate>,
        top_k: usize,
    ) -> Vec<Candidate> {
        if candidates.len() <= top_k {
            return candidates;
        }
        let Some(scorer) = &self.scorer else {
            return truncated(candidates, top_k);
        };

        let pairs: Vec<(String, String)> = candidates
            .iter()
            .map(|candidate| (query.to_string(), candidate.text.clone()))
            .collect();

        match scorer.score(pairs).await {
            Ok(scores) if scores.len() == candidates.len() => {
                let mut scored: Vec<(Candidate, f32)> =
                    candidates.into_iter().zip(scores).collect();
                scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

                let mut reranked: Vec<Candidate> =
                    scored.into_iter().map(|(candidate, _)| candidate).collect();
                reranked.truncate(top_k);
                tracing::debug!(kept = reranked.len(), "reranked candidates");
                reranked
            }
            Ok(scores) => {
                tracing::warn!(
                    expected = candidates.len(),
                    received = scores.len(),
                    "reranker returned wrong score count, falling back to truncation"
                );
                truncated(candidates, top_k)
            }
            Err(error) => {
                tracing::warn!(error = %error, "reranking failed, falling back to truncation");
                truncated(candidates, top_k)
            }
        }
    }
}

fn truncated(mut candidates: Vec<Candidate>, top_k: usize) -> Vec<Candidate> {
    candidates.truncate(top_k);
    candidates
}
