//! Sentence-boundary chunker for the ingestion path.
//!
//! Sentences accumulate into a buffer until the next one would push it past
//! `chunk_size`; the buffer is then closed and the next chunk is seeded with
//! a word-aligned suffix of the closed chunk so neighbouring chunks share
//! context. Both `chunk_size` and `overlap` are character budgets. The
//! output is fully determined by the sentence sequence and the parameters.

use crate::document::{Chunk, ChunkKind, Document};
use crate::error::{Error, Result};
use crate::text;

/// A chunk of text before provenance is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// Chunk text, including any overlap prefix.
    pub text: String,
    /// Regular or oversize.
    pub kind: ChunkKind,
}

/// Splits cleaned text into overlapping sentence-aligned chunks.
///
/// # Example
///
/// ```
/// use prism::chunker::SentenceChunker;
///
/// let chunker = SentenceChunker::new().with_chunk_size(1000).with_overlap(0);
/// let chunks = chunker.split("A. B. C.");
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].text, "A. B. C.");
/// ```
#[derive(Debug, Clone)]
pub struct SentenceChunker {
    chunk_size: usize,
    overlap: usize,
}

impl SentenceChunker {
    /// Create a chunker with the default 1000/200 character budgets.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }

    /// Set the chunk size in characters.
    #[must_use]
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Set the overlap budget in characters.
    #[must_use]
    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    /// The configured chunk size.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// The configured overlap.
    #[must_use]
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::config("chunk_size must be > 0"));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    /// Split text into chunks. Every sentence of the input appears in
    /// exactly one chunk body; a chunk is never longer than
    /// `chunk_size + overlap` unless it is a single oversize sentence.
    #[must_use]
    pub fn split(&self, input: &str) -> Vec<TextChunk> {
        let sentences = text::split_sentences(input);
        let mut chunks: Vec<TextChunk> = Vec::new();
        let mut buffer = String::new();
        // A freshly seeded buffer holds only overlap text; it must never be
        // emitted or closed until a sentence lands in it.
        let mut has_sentence = false;

        for sentence in &sentences {
            if sentence.len() > self.chunk_size {
                // Oversize sentence: close whatever is buffered, emit the
                // sentence alone and unsplit, and let it seed the next
                // chunk like any other closed chunk.
                tracing::warn!(
                    length = sentence.len(),
                    chunk_size = self.chunk_size,
                    "sentence exceeds chunk size, emitting unsplit"
                );
                if has_sentence {
                    chunks.push(TextChunk {
                        text: std::mem::take(&mut buffer),
                        kind: ChunkKind::Body,
                    });
                }
                chunks.push(TextChunk {
                    text: sentence.clone(),
                    kind: ChunkKind::Oversize,
                });
                buffer = self.seed(sentence);
                has_sentence = false;
                continue;
            }

            let joined_len = if buffer.is_empty() {
                sentence.len()
            } else {
                buffer.len() + 1 + sentence.len()
            };

            if joined_len > self.chunk_size && has_sentence {
                let closed = std::mem::take(&mut buffer);
                buffer = self.seed(&closed);
                chunks.push(TextChunk {
                    text: closed,
                    kind: ChunkKind::Body,
                });
            }
            if !buffer.is_empty() {
                buffer.push(' ');
            }
            buffer.push_str(sentence);
            has_sentence = true;
        }

        if has_sentence && !buffer.is_empty() {
            chunks.push(TextChunk {
                text: buffer,
                kind: ChunkKind::Body,
            });
        }

        chunks
    }

    /// Chunk a document's cleaned text and attach provenance.
    #[must_use]
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        let cleaned = text::clean(&document.text);
        self.split(&cleaned)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, piece)| Chunk {
                length: piece.text.len(),
                text: piece.text,
                source_id: document.source_id.clone(),
                checksum: document.checksum.clone(),
                chunk_index,
                kind: piece.kind,
            })
            .collect()
    }

    // The joining space between the seed and the first new sentence counts
    // against the overlap budget, which keeps every chunk within
    // chunk_size + overlap.
    fn seed(&self, closed: &str) -> String {
        text::word_suffix(closed, self.overlap.saturating_sub(1))
    }
}

impl Default for SentenceChunker {
    fn default() -> Self {
        Self::new()
    }
}
