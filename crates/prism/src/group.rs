//! Grouping candidates by source document.

use crate::retrieve::Candidate;

/// Candidates partitioned by originating document.
///
/// Iteration follows first-appearance order of sources; within a source,
/// candidates keep the relative order they arrived in. This is what lets
/// the synthesis prompt attribute every excerpt to a named source.
#[derive(Debug, Clone, Default)]
pub struct SourceGroups {
    groups: Vec<(String, Vec<Candidate>)>,
}

impl SourceGroups {
    /// Partition `candidates` by their `source_id`.
    #[must_use]
    pub fn from_candidates(candidates: Vec<Candidate>) -> Self {
        let mut groups: Vec<(String, Vec<Candidate>)> = Vec::new();
        for candidate in candidates {
            match groups
                .iter_mut()
                .find(|(source, _)| *source == candidate.source_id)
            {
                Some((_, members)) => members.push(candidate),
                None => {
                    let source = candidate.source_id.clone();
                    groups.push((source, vec![candidate]));
                }
            }
        }
        Self { groups }
    }

    /// Groups in first-appearance order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Candidate])> {
        self.groups
            .iter()
            .map(|(source, members)| (source.as_str(), members.as_slice()))
    }

    /// Candidates for one source, if present.
    #[must_use]
    pub fn get(&self, source_id: &str) -> Option<&[Candidate]> {
        self.groups
            .iter()
            .find(|(source, _)| source == source_id)
            .map(|(_, members)| members.as_slice())
    }

    /// Source ids in first-appearance order.
    #[must_use]
    pub fn source_ids(&self) -> Vec<String> {
        self.groups.iter().map(|(source, _)| source.clone()).collect()
    }

    /// Number of sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// True when no candidates were grouped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total candidates across all sources.
    #[must_use]
    pub fn candidate_count(&self) -> usize {
        self.groups.iter().map(|(_, members)| members.len()).sum()
    }
}
