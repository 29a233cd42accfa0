// Allow clippy warnings for static regex initialization
#![allow(clippy::expect_used)]

//! Provenance and enrichment metadata for chunks.
//!
//! The tagger derives keywords and entity-like terms from chunk text and
//! assembles the metadata map stored next to each embedding in the index.
//! Extraction is heuristic and fully deterministic; there is no model call
//! on the ingestion path.

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::document::{Chunk, ChunkKind, Document};
use crate::text;

static CAPITALIZED_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z][a-z]+(?: [A-Z][a-z]+){0,3}\b").expect("capitalized run regex is valid")
});

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "that", "this", "with", "from", "have", "has", "are", "was", "were",
    "will", "would", "been", "their", "they", "them", "its", "also", "can", "could", "should",
    "may", "might", "must", "not", "but", "what", "when", "where", "which", "who", "how", "why",
    "all", "each", "more", "most", "other", "some", "such", "only", "same", "than", "then", "into",
    "over", "about", "there", "here", "out", "per", "you", "your",
];

/// Derives index metadata for chunks.
#[derive(Debug, Clone)]
pub struct MetadataTagger {
    max_terms: usize,
}

impl MetadataTagger {
    /// Create a tagger that keeps up to 8 keywords and 8 entities per chunk.
    #[must_use]
    pub fn new() -> Self {
        Self { max_terms: 8 }
    }

    /// Override the per-field term cap.
    #[must_use]
    pub fn with_max_terms(mut self, max_terms: usize) -> Self {
        self.max_terms = max_terms;
        self
    }

    /// Frequency-ranked lowercase keywords, stopwords removed. Ties break
    /// by first appearance so the output is stable.
    #[must_use]
    pub fn keywords(&self, chunk_text: &str) -> Vec<String> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut first_seen: Vec<String> = Vec::new();

        for token in text::tokens(chunk_text) {
            if token.len() <= 2 || STOPWORDS.contains(&token.as_str()) {
                continue;
            }
            if !counts.contains_key(&token) {
                first_seen.push(token.clone());
            }
            *counts.entry(token).or_insert(0) += 1;
        }

        let mut ranked: Vec<(usize, String)> = first_seen.into_iter().enumerate().collect();
        ranked.sort_by_key(|(order, token)| {
            let count = counts.get(token).copied().unwrap_or(0);
            (std::cmp::Reverse(count), *order)
        });
        ranked.truncate(self.max_terms);
        ranked.into_iter().map(|(_, token)| token).collect()
    }

    /// Runs of capitalized words, in first-appearance order.
    #[must_use]
    pub fn entities(&self, chunk_text: &str) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for m in CAPITALIZED_RUN.find_iter(chunk_text) {
            let entity = m.as_str().to_string();
            if !seen.contains(&entity) {
                seen.push(entity);
                if seen.len() == self.max_terms {
                    break;
                }
            }
        }
        seen
    }

    /// Assemble the metadata map stored with a chunk's embedding.
    #[must_use]
    pub fn index_metadata(&self, document: &Document, chunk: &Chunk) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert(
            "source_type".to_string(),
            Value::String(document.source_type.clone()),
        );
        metadata.insert(
            "file_name".to_string(),
            Value::String(document.source_id.clone()),
        );
        metadata.insert(
            "checksum".to_string(),
            Value::String(chunk.checksum.clone()),
        );
        if let Some(topic) = &document.topic {
            metadata.insert("topic".to_string(), Value::String(topic.clone()));
        }
        metadata.insert("chunk_index".to_string(), Value::from(chunk.chunk_index));
        metadata.insert(
            "chunk_type".to_string(),
            Value::String(
                match chunk.kind {
                    ChunkKind::Body => "body",
                    ChunkKind::Oversize => "oversize",
                }
                .to_string(),
            ),
        );
        metadata.insert(
            "entities".to_string(),
            Value::String(self.entities(&chunk.text).join(", ")),
        );
        metadata.insert(
            "keywords".to_string(),
            Value::String(self.keywords(&chunk.text).join(", ")),
        );
        if let Some(page_range) = &document.page_range {
            metadata.insert("page_range".to_string(), Value::String(page_range.clone()));
        }
        metadata.insert("chunk_length".to_string(), Value::from(chunk.length));
        metadata
    }
}

impl Default for MetadataTagger {
    fn default() -> Self {
        Self::new()
    }
}
