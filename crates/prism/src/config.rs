//! Pipeline configuration and the related-terms table.
//!
//! One parameterized [`PipelineConfig`] drives every pipeline instead of
//! separate hard-wired variants; the named profiles ([`PipelineConfig::lean`],
//! [`PipelineConfig::broad`], [`PipelineConfig::deep`]) preserve the parameter
//! sets that used to be scattered across call sites.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// One trigger and the related terms retrieved when it matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedTermEntry {
    /// Matched case-insensitively as a substring of the query.
    pub trigger: String,
    /// Terms to issue auxiliary retrievals for.
    pub terms: Vec<String>,
}

/// Static trigger-term to related-terms table.
///
/// Immutable after construction; the retriever holds it behind an `Arc` and
/// only ever reads it. The version is bumped whenever the shipped entries
/// change so operators can tell which table a deployment is running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedTermsTable {
    /// Table version.
    pub version: u32,
    /// Entries, matched in order.
    pub entries: Vec<RelatedTermEntry>,
}

impl Default for RelatedTermsTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RelatedTermsTable {
    /// Empty table with the given version.
    #[must_use]
    pub fn new(version: u32) -> Self {
        Self {
            version,
            entries: Vec::new(),
        }
    }

    /// The table shipped with the crate (v1).
    ///
    /// Plural forms of the triggers are covered by substring matching, so
    /// only the singular stems are listed.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(1)
            .with_entry(
                "commitment",
                &[
                    "motivation",
                    "willingness",
                    "reluctance",
                    "attachment",
                    "dedication",
                ],
            )
            .with_entry("seller", &["owner", "entrepreneur", "founder", "proprietor"])
            .with_entry(
                "approach",
                &[
                    "method",
                    "strategy",
                    "philosophy",
                    "perspective",
                    "framework",
                ],
            )
            .with_entry(
                "theme",
                &[
                    "pattern",
                    "recurring",
                    "consistent",
                    "underlying",
                    "fundamental",
                ],
            )
            .with_entry(
                "factor",
                &[
                    "influence",
                    "determinant",
                    "driver",
                    "element",
                    "component",
                ],
            )
    }

    /// Append an entry.
    #[must_use]
    pub fn with_entry(mut self, trigger: impl Into<String>, terms: &[&str]) -> Self {
        self.entries.push(RelatedTermEntry {
            trigger: trigger.into(),
            terms: terms.iter().map(|t| (*t).to_string()).collect(),
        });
        self
    }

    /// Parse a table from its JSON representation.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let table: Self = serde_json::from_str(raw)?;
        Ok(table)
    }

    /// Load a table from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Related terms for `query`: every entry whose trigger appears in the
    /// query (case-insensitive substring) contributes its terms, in table
    /// order, deduplicated.
    #[must_use]
    pub fn lookup(&self, query: &str) -> Vec<String> {
        let query_lower = query.to_lowercase();
        let mut seen = HashSet::new();
        let mut terms = Vec::new();
        for entry in &self.entries {
            if query_lower.contains(&entry.trigger.to_lowercase()) {
                for term in &entry.terms {
                    if seen.insert(term.as_str()) {
                        terms.push(term.clone());
                    }
                }
            }
        }
        terms
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parameters for one pipeline instance.
///
/// All knobs in one place: chunking geometry, retrieval caps, rerank and
/// context budgets, and the concurrency limits from the resource model.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Target chunk size in characters.
    pub chunk_size: usize,

    /// Overlap carried between consecutive chunks, in characters.
    pub chunk_overlap: usize,

    /// Total candidate budget for the primary retrieval pass, divided
    /// evenly across sub-queries.
    pub retrieval_budget: usize,

    /// Per-call cap for concept-token retrievals.
    pub concept_k: usize,

    /// Per-call cap for related-term retrievals.
    pub related_k: usize,

    /// Whether to expand the query with a generative model.
    pub expansion_enabled: bool,

    /// Upper bound on sub-queries per request, original included.
    pub max_subqueries: usize,

    /// Whether to score candidates with the rerank capability.
    pub rerank_enabled: bool,

    /// Candidates kept after reranking (or plain truncation when reranking
    /// is disabled or unavailable).
    pub rerank_top_k: usize,

    /// Maximum assembled context size in characters.
    pub context_budget: usize,

    /// Concurrency cap for retrieval fan-out within one query.
    pub max_concurrency: usize,

    /// Timeout applied to each individual index call.
    pub per_call_timeout: Duration,

    /// Deadline for the whole retrieval phase of one query.
    pub overall_deadline: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::deep()
    }
}

impl PipelineConfig {
    /// Full pipeline: query expansion and reranking enabled.
    #[must_use]
    pub fn deep() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 300,
            retrieval_budget: 30,
            concept_k: 2,
            related_k: 2,
            expansion_enabled: true,
            max_subqueries: 7,
            rerank_enabled: true,
            rerank_top_k: 15,
            context_budget: 32_000,
            max_concurrency: 8,
            per_call_timeout: Duration::from_secs(10),
            overall_deadline: Duration::from_secs(30),
        }
    }

    /// Small corpora: single query, small caps, no expansion or reranking.
    #[must_use]
    pub fn lean() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            retrieval_budget: 12,
            concept_k: 2,
            related_k: 2,
            expansion_enabled: false,
            max_subqueries: 1,
            rerank_enabled: false,
            rerank_top_k: 12,
            ..Self::deep()
        }
    }

    /// Larger chunks and wider concept fan-out, no expansion or reranking.
    #[must_use]
    pub fn broad() -> Self {
        Self {
            chunk_size: 2000,
            chunk_overlap: 400,
            retrieval_budget: 15,
            concept_k: 3,
            related_k: 2,
            expansion_enabled: false,
            max_subqueries: 1,
            rerank_enabled: false,
            rerank_top_k: 15,
            ..Self::deep()
        }
    }

    /// Default profile overlaid with `PRISM_*` environment variables.
    ///
    /// Recognized: `PRISM_CHUNK_SIZE`, `PRISM_CHUNK_OVERLAP`,
    /// `PRISM_RETRIEVAL_BUDGET`, `PRISM_RERANK_TOP_K`,
    /// `PRISM_CONTEXT_BUDGET`. Unset variables keep the profile value;
    /// unparseable values are a configuration error.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(value) = env_usize("PRISM_CHUNK_SIZE")? {
            config.chunk_size = value;
        }
        if let Some(value) = env_usize("PRISM_CHUNK_OVERLAP")? {
            config.chunk_overlap = value;
        }
        if let Some(value) = env_usize("PRISM_RETRIEVAL_BUDGET")? {
            config.retrieval_budget = value;
        }
        if let Some(value) = env_usize("PRISM_RERANK_TOP_K")? {
            config.rerank_top_k = value;
        }
        if let Some(value) = env_usize("PRISM_CONTEXT_BUDGET")? {
            config.context_budget = value;
        }
        config.validate()?;
        Ok(config)
    }

    /// Set the chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the chunk overlap.
    #[must_use]
    pub fn with_chunk_overlap(mut self, chunk_overlap: usize) -> Self {
        self.chunk_overlap = chunk_overlap;
        self
    }

    /// Set the total primary retrieval budget.
    #[must_use]
    pub fn with_retrieval_budget(mut self, budget: usize) -> Self {
        self.retrieval_budget = budget;
        self
    }

    /// Set the per-call cap for concept-token retrievals.
    #[must_use]
    pub fn with_concept_k(mut self, k: usize) -> Self {
        self.concept_k = k;
        self
    }

    /// Set the per-call cap for related-term retrievals.
    #[must_use]
    pub fn with_related_k(mut self, k: usize) -> Self {
        self.related_k = k;
        self
    }

    /// Enable or disable query expansion.
    #[must_use]
    pub fn with_expansion(mut self, enabled: bool) -> Self {
        self.expansion_enabled = enabled;
        self
    }

    /// Set the sub-query cap.
    #[must_use]
    pub fn with_max_subqueries(mut self, max: usize) -> Self {
        self.max_subqueries = max;
        self
    }

    /// Enable or disable reranking.
    #[must_use]
    pub fn with_rerank(mut self, enabled: bool) -> Self {
        self.rerank_enabled = enabled;
        self
    }

    /// Set the post-rerank candidate count.
    #[must_use]
    pub fn with_rerank_top_k(mut self, top_k: usize) -> Self {
        self.rerank_top_k = top_k;
        self
    }

    /// Set the context budget in characters.
    #[must_use]
    pub fn with_context_budget(mut self, budget: usize) -> Self {
        self.context_budget = budget;
        self
    }

    /// Set the retrieval fan-out concurrency cap.
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Set the per-call timeout.
    #[must_use]
    pub fn with_per_call_timeout(mut self, timeout: Duration) -> Self {
        self.per_call_timeout = timeout;
        self
    }

    /// Set the overall retrieval deadline.
    #[must_use]
    pub fn with_overall_deadline(mut self, deadline: Duration) -> Self {
        self.overall_deadline = deadline;
        self
    }

    /// Check that the parameters are usable together.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::config("chunk_size must be greater than 0"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.retrieval_budget == 0 {
            return Err(Error::config("retrieval_budget must be greater than 0"));
        }
        if self.max_subqueries == 0 {
            return Err(Error::config("max_subqueries must be greater than 0"));
        }
        if self.rerank_top_k == 0 {
            return Err(Error::config("rerank_top_k must be greater than 0"));
        }
        if self.context_budget == 0 {
            return Err(Error::config("context_budget must be greater than 0"));
        }
        if self.max_concurrency == 0 {
            return Err(Error::config("max_concurrency must be greater than 0"));
        }
        if self.per_call_timeout.is_zero() {
            return Err(Error::config("per_call_timeout must be non-zero"));
        }
        if self.overall_deadline.is_zero() {
            return Err(Error::config("overall_deadline must be non-zero"));
        }
        Ok(())
    }
}

fn env_usize(name: &str) -> Result<Option<usize>> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<usize>().map(Some).map_err(|_| {
            Error::config(format!("{name} must be a non-negative integer, got {raw:?}"))
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_lookup_matches_trigger() {
        let table = RelatedTermsTable::builtin();
        let terms = table.lookup("what drives seller commitment?");
        assert!(terms.contains(&"owner".to_string()));
        assert!(terms.contains(&"motivation".to_string()));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let table = RelatedTermsTable::builtin();
        let terms = table.lookup("Key THEMES in the interviews");
        assert!(terms.contains(&"pattern".to_string()));
    }

    #[test]
    fn test_lookup_matches_substring() {
        let table = RelatedTermsTable::builtin();
        // "factors" contains the trigger "factor"
        let terms = table.lookup("which factors matter most");
        assert!(terms.contains(&"driver".to_string()));
    }

    #[test]
    fn test_lookup_without_trigger_is_empty() {
        let table = RelatedTermsTable::builtin();
        assert!(table.lookup("weather forecast for tomorrow").is_empty());
    }

    #[test]
    fn test_lookup_deduplicates_across_entries() {
        let table = RelatedTermsTable::new(9)
            .with_entry("alpha", &["one", "two"])
            .with_entry("beta", &["two", "three"]);
        let terms = table.lookup("alpha and beta");
        assert_eq!(terms, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_lookup_preserves_table_order() {
        let table = RelatedTermsTable::new(9)
            .with_entry("beta", &["late"])
            .with_entry("alpha", &["early"]);
        let terms = table.lookup("alpha beta");
        assert_eq!(terms, vec!["late", "early"]);
    }

    #[test]
    fn test_builtin_table_version_and_size() {
        let table = RelatedTermsTable::builtin();
        assert_eq!(table.version, 1);
        assert_eq!(table.len(), 5);
        assert!(!table.is_empty());
    }

    #[test]
    fn test_table_json_round_trip() {
        let table = RelatedTermsTable::new(3).with_entry("margin", &["profit", "markup"]);
        let json = serde_json::to_string(&table).unwrap();
        let parsed = RelatedTermsTable::from_json_str(&json).unwrap();
        assert_eq!(parsed.version, 3);
        assert_eq!(parsed.lookup("gross margin"), vec!["profit", "markup"]);
    }

    #[test]
    fn test_table_from_json_rejects_garbage() {
        assert!(RelatedTermsTable::from_json_str("not json").is_err());
    }

    #[test]
    fn test_table_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terms.json");
        std::fs::write(
            &path,
            r#"{"version": 2, "entries": [{"trigger": "risk", "terms": ["exposure"]}]}"#,
        )
        .unwrap();

        let table = RelatedTermsTable::from_path(&path).unwrap();
        assert_eq!(table.version, 2);
        assert_eq!(table.lookup("risk profile"), vec!["exposure"]);
    }

    #[test]
    fn test_table_from_missing_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = RelatedTermsTable::from_path(dir.path().join("absent.json"));
        assert!(result.is_err());
    }

    #[test]
    fn test_default_config_is_deep_profile() {
        let config = PipelineConfig::default();
        assert!(config.expansion_enabled);
        assert!(config.rerank_enabled);
        assert_eq!(config.retrieval_budget, 30);
        assert_eq!(config.rerank_top_k, 15);
        assert_eq!(config.max_subqueries, 7);
    }

    #[test]
    fn test_lean_profile() {
        let config = PipelineConfig::lean();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.retrieval_budget, 12);
        assert_eq!(config.concept_k, 2);
        assert!(!config.expansion_enabled);
        assert!(!config.rerank_enabled);
        assert_eq!(config.rerank_top_k, 12);
        config.validate().unwrap();
    }

    #[test]
    fn test_broad_profile() {
        let config = PipelineConfig::broad();
        assert_eq!(config.chunk_size, 2000);
        assert_eq!(config.chunk_overlap, 400);
        assert_eq!(config.retrieval_budget, 15);
        assert_eq!(config.concept_k, 3);
        assert!(!config.expansion_enabled);
        assert!(!config.rerank_enabled);
        config.validate().unwrap();
    }

    #[test]
    fn test_builder_setters() {
        let config = PipelineConfig::default()
            .with_chunk_size(500)
            .with_chunk_overlap(50)
            .with_retrieval_budget(20)
            .with_concept_k(4)
            .with_related_k(3)
            .with_expansion(false)
            .with_max_subqueries(5)
            .with_rerank(false)
            .with_rerank_top_k(10)
            .with_context_budget(8_000)
            .with_max_concurrency(4)
            .with_per_call_timeout(Duration::from_secs(5))
            .with_overall_deadline(Duration::from_secs(20));

        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.retrieval_budget, 20);
        assert_eq!(config.concept_k, 4);
        assert_eq!(config.related_k, 3);
        assert!(!config.expansion_enabled);
        assert_eq!(config.max_subqueries, 5);
        assert!(!config.rerank_enabled);
        assert_eq!(config.rerank_top_k, 10);
        assert_eq!(config.context_budget, 8_000);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.per_call_timeout, Duration::from_secs(5));
        assert_eq!(config.overall_deadline, Duration::from_secs(20));
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let config = PipelineConfig::default().with_chunk_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_overlap_not_smaller_than_chunk_size() {
        let config = PipelineConfig::default()
            .with_chunk_size(100)
            .with_chunk_overlap(100);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_budget_and_caps() {
        assert!(PipelineConfig::default()
            .with_retrieval_budget(0)
            .validate()
            .is_err());
        assert!(PipelineConfig::default()
            .with_max_subqueries(0)
            .validate()
            .is_err());
        assert!(PipelineConfig::default()
            .with_rerank_top_k(0)
            .validate()
            .is_err());
        assert!(PipelineConfig::default()
            .with_context_budget(0)
            .validate()
            .is_err());
        assert!(PipelineConfig::default()
            .with_max_concurrency(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        assert!(PipelineConfig::default()
            .with_per_call_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(PipelineConfig::default()
            .with_overall_deadline(Duration::ZERO)
            .validate()
            .is_err());
    }

    // The only test that touches process environment; keeping it in one
    // test avoids races between parallel test threads.
    #[test]
    fn test_from_env_overlay() {
        std::env::set_var("PRISM_CHUNK_SIZE", "750");
        std::env::set_var("PRISM_RERANK_TOP_K", "9");
        let config = PipelineConfig::from_env().unwrap();
        assert_eq!(config.chunk_size, 750);
        assert_eq!(config.rerank_top_k, 9);
        // Untouched knobs keep the default profile values
        assert_eq!(config.retrieval_budget, 30);

        std::env::set_var("PRISM_CHUNK_SIZE", "not-a-number");
        let err = PipelineConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("PRISM_CHUNK_SIZE"));

        std::env::remove_var("PRISM_CHUNK_SIZE");
        std::env::remove_var("PRISM_RERANK_TOP_K");
        let config = PipelineConfig::from_env().unwrap();
        assert_eq!(config.chunk_size, 1000);
    }
}
