//! Vector index abstraction and an in-memory reference implementation.
//!
//! The pipeline talks to storage exclusively through [`VectorIndex`], so any
//! backend that can store embeddings and answer nearest-neighbour queries can
//! slot in. [`InMemoryIndex`] is the bundled implementation, suitable for
//! tests, prototyping, and corpora that fit in memory.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// A chunk prepared for indexing, with its embedding and metadata attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Stable identifier in the form `"{checksum}:{chunk_index}"`.
    pub chunk_id: String,
    /// Embedding vector for the chunk text.
    pub embedding: Vec<f32>,
    /// Chunk text exactly as stored.
    pub text: String,
    /// Metadata attached at indexing time.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A single result returned from a vector query.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    /// Stored chunk text.
    pub text: String,
    /// Metadata stored alongside the chunk.
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Cosine distance from the query embedding. Lower is closer.
    pub distance: f32,
}

impl IndexHit {
    /// Metadata value for `key` as a string, if present.
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// Outcome of a [`VectorIndex::put`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutReport {
    /// Records written for the first time.
    pub num_added: usize,
    /// Records skipped because their `chunk_id` was already present.
    pub num_skipped: usize,
}

/// Storage backend for embedded chunks.
///
/// Implementations must be safe to share across concurrent retrieval tasks.
/// Writes are idempotent per `chunk_id`: re-submitting a record that is
/// already stored is a skip, not an error, which makes re-ingestion of an
/// unchanged document a no-op.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Store `records`, skipping any whose `chunk_id` is already present.
    async fn put(&self, records: Vec<IndexRecord>) -> Result<PutReport>;

    /// Return the `k` stored records closest to `embedding`, ordered by
    /// ascending distance.
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<IndexHit>>;

    /// Number of records currently stored.
    ///
    /// Optional; backends without a cheap count can leave the default.
    async fn count(&self) -> Result<usize> {
        Err(Error::NotImplemented(
            "count not supported by this index".to_string(),
        ))
    }
}

/// In-memory vector index backed by a `HashMap` behind an `RwLock`.
///
/// Queries scan every stored record, so this is linear in corpus size.
/// Ties on distance break on `chunk_id` to keep results stable across runs.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    records: RwLock<HashMap<String, StoredRecord>>,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    embedding: Vec<f32>,
    text: String,
    metadata: serde_json::Map<String, serde_json::Value>,
}

impl InMemoryIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cosine distance (1 - cosine similarity) between two vectors.
    fn cosine_distance(a: &[f32], b: &[f32]) -> Result<f32> {
        if a.len() != b.len() {
            return Err(Error::invalid_input(format!(
                "vector dimension mismatch: {} vs {}",
                a.len(),
                b.len()
            )));
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a = Self::magnitude(a);
        let norm_b = Self::magnitude(b);

        if norm_a == 0.0 || norm_b == 0.0 {
            return Ok(1.0); // Maximum distance for zero vectors
        }

        // Clamp to [-1, 1] to absorb floating point error
        let similarity = (dot / (norm_a * norm_b)).clamp(-1.0, 1.0);
        Ok(1.0 - similarity)
    }

    fn magnitude(v: &[f32]) -> f32 {
        v.iter().map(|x| x.powi(2)).sum::<f32>().sqrt()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn put(&self, records: Vec<IndexRecord>) -> Result<PutReport> {
        let mut store = self
            .records
            .write()
            .map_err(|_| Error::other("index lock poisoned"))?;

        let mut report = PutReport::default();
        for record in records {
            if store.contains_key(&record.chunk_id) {
                report.num_skipped += 1;
                continue;
            }
            store.insert(
                record.chunk_id,
                StoredRecord {
                    embedding: record.embedding,
                    text: record.text,
                    metadata: record.metadata,
                },
            );
            report.num_added += 1;
        }
        Ok(report)
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let store = self
            .records
            .read()
            .map_err(|_| Error::other("index lock poisoned"))?;

        let mut scored: Vec<(f32, &String, &StoredRecord)> = Vec::with_capacity(store.len());
        for (chunk_id, record) in store.iter() {
            let distance = Self::cosine_distance(embedding, &record.embedding)?;
            scored.push((distance, chunk_id, record));
        }

        scored.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(b.1))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(distance, _, record)| IndexHit {
                text: record.text.clone(),
                metadata: record.metadata.clone(),
                distance,
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let store = self
            .records
            .read()
            .map_err(|_| Error::other("index lock poisoned"))?;
        Ok(store.len())
    }
}
