// Allow clippy warnings for static regex initialization
#![allow(clippy::expect_used)]

//! Query expansion.
//!
//! Turns one user question into several sub-queries covering different
//! facets, so retrieval is not limited to the phrasing the user happened to
//! choose. The generative model is asked for a JSON array of facet queries;
//! any failure on that path degrades to a fixed template set. Expansion
//! never fails and always returns the original question first.

use crate::error::{Error, Result};
use crate::generation::CompletionModel;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

static JSON_ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[.*?\]").expect("JSON array regex is valid"));

const TEMPLATE_PREFIXES: [&str; 4] = [
    "different perspectives on",
    "examples of",
    "factors affecting",
    "comparison of",
];

/// Where a sub-query came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubQueryOrigin {
    /// The user's question, verbatim.
    Original,
    /// Produced by the generative model.
    Generated,
    /// One of the fixed fallback templates.
    Template,
}

/// One of the query variants issued to the index for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubQuery {
    /// Query text.
    pub text: String,
    /// How this sub-query was produced.
    pub origin: SubQueryOrigin,
}

impl SubQuery {
    fn new(text: impl Into<String>, origin: SubQueryOrigin) -> Self {
        Self {
            text: text.into(),
            origin,
        }
    }

    /// A sub-query carrying the user's question verbatim. This is what the
    /// retriever receives when expansion is disabled.
    pub fn original(text: impl Into<String>) -> Self {
        Self::new(text, SubQueryOrigin::Original)
    }
}

/// Expands one question into up to `max_subqueries` sub-queries.
pub struct QueryExpander {
    model: Arc<dyn CompletionModel>,
    max_subqueries: usize,
}

impl QueryExpander {
    /// Create an expander using `model` for facet generation.
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self {
            model,
            max_subqueries: 7,
        }
    }

    /// Cap the number of sub-queries, original included. Minimum 1.
    #[must_use]
    pub fn with_max_subqueries(mut self, max: usize) -> Self {
        self.max_subqueries = max.max(1);
        self
    }

    /// Expand `question` into sub-queries, the original always first.
    ///
    /// A model failure, a response without a JSON array, unparseable JSON,
    /// or an empty array all fall back to the template set. This method
    /// never fails.
    pub async fn expand(&self, question: &str) -> Vec<SubQuery> {
        match self.generate(question).await {
            Ok(generated) if !generated.is_empty() => self.merge(question, generated),
            Ok(_) => {
                tracing::warn!(query = question, "expansion returned no queries, using templates");
                self.templates(question)
            }
            Err(error) => {
                tracing::warn!(
                    query = question,
                    error = %error,
                    "query expansion failed, using templates"
                );
                self.templates(question)
            }
        }
    }

    async fn generate(&self, question: &str) -> Result<Vec<String>> {
        let response = self.model.complete(&expansion_prompt(question)).await?;
        let matched = JSON_ARRAY
            .find(&response)
            .ok_or_else(|| Error::api_format("no JSON array in expansion response"))?;
        let queries: Vec<String> = serde_json::from_str(matched.as_str())?;
        tracing::debug!(count = queries.len(), "generated sub-queries");
        Ok(queries)
    }

    /// Original first, then generated queries with empties and duplicates
    /// (case-insensitive, original included) removed.
    fn merge(&self, question: &str, generated: Vec<String>) -> Vec<SubQuery> {
        let mut subqueries = vec![SubQuery::new(question, SubQueryOrigin::Original)];
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(question.trim().to_lowercase());

        for text in generated {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }
            if seen.insert(trimmed.to_lowercase()) {
                subqueries.push(SubQuery::new(trimmed, SubQueryOrigin::Generated));
            }
        }

        subqueries.truncate(self.max_subqueries);
        subqueries
    }

    fn templates(&self, question: &str) -> Vec<SubQuery> {
        let mut subqueries = vec![SubQuery::new(question, SubQueryOrigin::Original)];
        for prefix in TEMPLATE_PREFIXES {
            subqueries.push(SubQuery::new(
                format!("{prefix} {question}"),
                SubQueryOrigin::Template,
            ));
        }
        subqueries.truncate(self.max_subqueries);
        subqueries
    }
}

fn expansion_prompt(question: &str) -> String {
    format!(
        "Given this user question: \"{question}\"\n\n\
         Generate 5-7 specific sub-queries that would help answer this comprehensively.\n\
         Consider:\n\
         - Different aspects of the main topic\n\
         - Related concepts and synonyms\n\
         - Contrasting viewpoints\n\
         - Specific examples\n\
         - Quantitative vs qualitative angles\n\n\
         Return as a JSON list of strings, like: [\"query1\", \"query2\", \"query3\"]"
    )
}
