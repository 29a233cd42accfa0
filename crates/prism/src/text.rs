// Allow clippy warnings for static regex initialization
#![allow(clippy::expect_used)]

//! Text normalization shared by the ingestion and query paths.
//!
//! [`clean`] is applied to extracted document text before chunking. The
//! helpers below it back the chunker's overlap seeding, the retriever's
//! concept tokenization, and the deduplicator's key normalization.

use regex::Regex;
use std::sync::LazyLock;

static PAGE_NUMBER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*\d+\s*$").expect("page number regex is valid"));
static HEADER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[A-Z\s]{2,}$").expect("header line regex is valid"));
static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s.,!?;:\-()]").expect("disallowed char regex is valid"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));
static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([.!?]+)\s+").expect("sentence end regex is valid"));
static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w+\b").expect("word regex is valid"));

/// Clean extracted document text for chunking.
///
/// Drops page-number-only lines and all-caps header lines left behind by
/// page extraction, strips characters outside the word/space/basic
/// punctuation set, then collapses whitespace runs to single spaces.
#[must_use]
pub fn clean(text: &str) -> String {
    let text = PAGE_NUMBER_LINE.replace_all(text, "");
    let text = HEADER_LINE.replace_all(&text, "");
    let text = DISALLOWED.replace_all(&text, "");
    let text = WHITESPACE.replace_all(&text, " ");
    text.trim().to_string()
}

/// Split cleaned text into sentences.
///
/// A sentence ends at a run of `.`, `!` or `?` followed by whitespace. The
/// trailing fragment is kept even without a terminator, so the sentence
/// sequence always covers the input.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for caps in SENTENCE_END.captures_iter(text) {
        // Capture 1 is the terminator run; the sentence ends with it and the
        // following whitespace is dropped.
        if let (Some(terminator), Some(whole)) = (caps.get(1), caps.get(0)) {
            let sentence = text[start..terminator.end()].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = whole.end();
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Longest whole-word suffix of `text` whose joined length fits in
/// `max_chars`. Returns the entire text when it already fits. Used to seed
/// the next chunk's overlap prefix.
#[must_use]
pub fn word_suffix(text: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    if text.len() <= max_chars {
        return text.trim().to_string();
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut taken = 0usize;
    let mut length = 0usize;
    for word in words.iter().rev() {
        let extra = if taken == 0 {
            word.len()
        } else {
            word.len() + 1
        };
        if length + extra > max_chars {
            break;
        }
        length += extra;
        taken += 1;
    }
    words[words.len() - taken..].join(" ")
}

/// Lowercased word tokens of a query, in order of appearance.
#[must_use]
pub fn tokens(text: &str) -> Vec<String> {
    WORD.find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Normalize text for use as a deduplication key: trim and collapse
/// whitespace runs. Case is preserved, so passages differing only in case
/// stay distinct.
#[must_use]
pub fn normalize_for_key(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").to_string()
}
