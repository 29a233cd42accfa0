//! Candidate deduplication.
//!
//! The fan-out strategies routinely return the same passage several times.
//! Dedup keys on a checksum of the whitespace-normalized text, keeps the
//! first occurrence, and preserves order. Case is not folded: differently
//! cased passages are genuinely different text.

use crate::document::content_checksum;
use crate::retrieve::Candidate;
use crate::text;
use std::collections::HashSet;

/// Remove candidates whose normalized text was already seen.
///
/// Single pass, first occurrence wins, order-preserving.
#[must_use]
pub fn dedupe(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::with_capacity(candidates.len());
    let mut unique = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        if seen.insert(dedup_key(&candidate.text)) {
            unique.push(candidate);
        }
    }

    tracing::debug!(unique = unique.len(), "deduplicated candidates");
    unique
}

fn dedup_key(candidate_text: &str) -> String {
    content_checksum(&text::normalize_for_key(candidate_text))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::retrieve::RetrievalStrategy;

    fn candidate(candidate_text: &str, strategy: RetrievalStrategy) -> Candidate {
        Candidate {
            text: candidate_text.to_string(),
            source_id: "doc".to_string(),
            metadata: serde_json::Map::new(),
            distance: 0.5,
            strategy,
            rank: 0,
        }
    }

    #[test]
    fn test_repeated_text_kept_once_in_first_appearance_order() {
        let input = vec![
            candidate("x", RetrievalStrategy::Primary),
            candidate("y", RetrievalStrategy::Primary),
            candidate("x", RetrievalStrategy::Concept),
        ];

        let unique = dedupe(input);
        let texts: Vec<&str> = unique.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["x", "y"]);
    }

    #[test]
    fn test_first_occurrence_keeps_its_provenance() {
        let input = vec![
            candidate("same passage", RetrievalStrategy::Primary),
            candidate("same passage", RetrievalStrategy::Related),
        ];

        let unique = dedupe(input);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].strategy, RetrievalStrategy::Primary);
    }

    #[test]
    fn test_whitespace_variants_are_duplicates() {
        let input = vec![
            candidate("margin grew fast", RetrievalStrategy::Primary),
            candidate("  margin   grew\tfast ", RetrievalStrategy::Primary),
        ];

        let unique = dedupe(input);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].text, "margin grew fast");
    }

    #[test]
    fn test_case_is_not_folded() {
        let input = vec![
            candidate("Margin grew", RetrievalStrategy::Primary),
            candidate("margin grew", RetrievalStrategy::Primary),
        ];

        assert_eq!(dedupe(input).len(), 2);
    }

    #[test]
    fn test_dedupe_is_idempotent() {
        let input = vec![
            candidate("a", RetrievalStrategy::Primary),
            candidate("b", RetrievalStrategy::Primary),
            candidate("a", RetrievalStrategy::Primary),
        ];

        let once = dedupe(input);
        let twice = dedupe(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_input() {
        assert!(dedupe(Vec::new()).is_empty());
    }
}
