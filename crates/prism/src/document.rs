//! Document and chunk types.
//!
//! A [`Document`] is created once at ingestion and never mutated afterwards;
//! its checksum identifies the content everywhere else in the engine. The
//! chunker turns a document into [`Chunk`]s, which the index owns after
//! ingestion.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One page of extracted text, as supplied by the external extraction step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number.
    pub number: u32,
    /// Extracted plaintext of the page.
    pub text: String,
}

impl Page {
    /// Create a page.
    pub fn new(number: u32, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }
}

/// An ingested document: raw text plus a stable content checksum.
///
/// # Example
///
/// ```
/// use prism::document::Document;
///
/// let doc = Document::new("report.pdf", "Q3 revenue grew 12 percent.");
/// assert_eq!(doc.source_id, "report.pdf");
/// assert_eq!(doc.checksum.len(), 64);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier of the originating source, usually a file name.
    pub source_id: String,

    /// Raw document text.
    pub text: String,

    /// SHA-256 of the raw text, hex encoded.
    pub checksum: String,

    /// Broad topic label, when the caller supplies one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    /// Kind of source the text came from, e.g. `"pdf"`.
    pub source_type: String,

    /// Human-readable page span, e.g. `"pages 1-42"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_range: Option<String>,
}

impl Document {
    /// Create a document from raw text. The checksum is computed here and
    /// fixed for the document's lifetime.
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let checksum = content_checksum(&text);
        Self {
            source_id: source_id.into(),
            text,
            checksum,
            topic: None,
            source_type: "text".to_string(),
            page_range: None,
        }
    }

    /// Create a document from page-segmented text. Blank pages are dropped;
    /// the rest are joined with visible page markers so chunk text retains
    /// rough positional hints. The page range spans the supplied pages,
    /// blank ones included.
    pub fn from_pages(source_id: impl Into<String>, pages: &[Page]) -> Self {
        let text = pages
            .iter()
            .filter(|p| !p.text.trim().is_empty())
            .map(|p| format!("--- Page {} ---\n{}", p.number, p.text))
            .collect::<Vec<_>>()
            .join("\n\n");
        let page_range = match (pages.first(), pages.last()) {
            (Some(first), Some(last)) => Some(format!("pages {}-{}", first.number, last.number)),
            _ => None,
        };
        let mut doc = Self::new(source_id, text);
        doc.source_type = "pdf".to_string();
        doc.page_range = page_range;
        doc
    }

    /// Set the topic label.
    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Set the source type.
    #[must_use]
    pub fn with_source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = source_type.into();
        self
    }
}

/// How a chunk was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// Regular sentence-accumulated chunk.
    Body,
    /// A single sentence longer than the chunk size, emitted unsplit.
    Oversize,
}

/// A bounded span of source text with provenance, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk text, including any overlap prefix.
    pub text: String,

    /// Source the chunk came from.
    pub source_id: String,

    /// Checksum of the whole source document.
    pub checksum: String,

    /// Position of this chunk within its document, starting at 0.
    pub chunk_index: usize,

    /// Character length of `text`.
    pub length: usize,

    /// Regular or oversize.
    pub kind: ChunkKind,
}

impl Chunk {
    /// Index key, stable across re-ingestion of identical content.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}:{}", self.checksum, self.chunk_index)
    }
}

/// SHA-256 checksum of text, hex encoded.
#[must_use]
pub fn content_checksum(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
