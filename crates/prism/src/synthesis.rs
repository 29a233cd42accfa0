//! Context assembly and report synthesis.
//!
//! The last stage of the query path. Grouped candidates are rendered into a
//! source-labeled context, fitted under the completion model's character
//! budget, and sent through a single completion call whose output is parsed
//! into a structured [`SynthesisReport`]. Generation is the only stage whose
//! failure is surfaced to the caller rather than degraded.

use crate::error::{Error, Result};
use crate::generation::CompletionModel;
use crate::group::SourceGroups;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Section titles the synthesis prompt requires, in report order.
const SECTION_TITLES: [&str; 5] = [
    "Executive Summary",
    "Thematic Analysis",
    "Comparative Framework",
    "Strategic Implications",
    "Key Takeaways",
];

/// A source-labeled context ready for prompting.
#[derive(Debug, Clone)]
pub struct ContextBuild {
    /// The assembled context text.
    pub text: String,
    /// Whether excerpts were dropped or truncated to fit the budget.
    pub trimmed: bool,
}

/// Renders grouped candidates with source headers and numbered excerpts.
///
/// Each group opens with `## From {source}:` and lists its candidates as
/// `### Excerpt {n}:` blocks separated by blank lines, in group order.
#[must_use]
pub fn format_context(groups: &SourceGroups) -> String {
    let mut parts: Vec<String> = Vec::new();
    for (source, candidates) in groups.iter() {
        parts.push(format!("## From {source}:"));
        for (index, candidate) in candidates.iter().enumerate() {
            parts.push(format!("### Excerpt {}:", index + 1));
            parts.push(candidate.text.clone());
            parts.push(String::new());
        }
    }
    parts.join("\n")
}

/// Renders the full context, failing if it exceeds `budget` characters.
pub fn assemble(groups: &SourceGroups, budget: usize) -> Result<String> {
    let context = format_context(groups);
    let size = context.chars().count();
    if size > budget {
        return Err(Error::ContextOverflow { size, budget });
    }
    Ok(context)
}

/// Builds a context guaranteed to fit within `budget` characters.
///
/// A context that fits is returned unchanged. An oversized one is rebuilt
/// as the longest prefix of excerpts in (group, excerpt) order that fits,
/// so later groups and excerpts are dropped before earlier ones. If not
/// even the first excerpt fits whole, it is cut at a word boundary.
#[must_use]
pub fn build_context(groups: &SourceGroups, budget: usize) -> ContextBuild {
    let context = format_context(groups);
    let size = context.chars().count();
    if size <= budget {
        return ContextBuild {
            text: context,
            trimmed: false,
        };
    }
    tracing::warn!(size, budget, "context exceeds budget, dropping later excerpts");
    ContextBuild {
        text: trim_to_budget(groups, budget),
        trimmed: true,
    }
}

fn trim_to_budget(groups: &SourceGroups, budget: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut used = 0usize;

    'groups: for (source, candidates) in groups.iter() {
        let mut header_needed = true;
        for (index, candidate) in candidates.iter().enumerate() {
            let mut block: Vec<String> = Vec::new();
            if header_needed {
                block.push(format!("## From {source}:"));
            }
            block.push(format!("### Excerpt {}:", index + 1));
            block.push(candidate.text.clone());
            block.push(String::new());

            let cost = block_cost(&block, parts.is_empty());
            if used + cost > budget {
                break 'groups;
            }
            used += cost;
            header_needed = false;
            parts.append(&mut block);
        }
    }

    if parts.is_empty() {
        return truncate_first_excerpt(groups, budget);
    }
    parts.join("\n")
}

/// Character cost of appending `block` to a newline-joined part list.
fn block_cost(block: &[String], first: bool) -> usize {
    let chars: usize = block.iter().map(|part| part.chars().count()).sum();
    let separators = if first {
        block.len().saturating_sub(1)
    } else {
        block.len()
    };
    chars + separators
}

/// Fits a word-boundary prefix of the very first excerpt under `budget`.
fn truncate_first_excerpt(groups: &SourceGroups, budget: usize) -> String {
    let first = groups.iter().next().and_then(|(source, candidates)| {
        candidates.first().map(|candidate| (source, candidate))
    });
    let (source, candidate) = match first {
        Some(pair) => pair,
        None => return String::new(),
    };

    let head = format!("## From {source}:\n### Excerpt 1:\n");
    let head_chars = head.chars().count();
    if head_chars >= budget {
        return head.chars().take(budget).collect();
    }

    let mut remaining = budget - head_chars;
    let mut kept: Vec<&str> = Vec::new();
    for word in candidate.text.split_whitespace() {
        let word_chars = word.chars().count();
        let cost = if kept.is_empty() {
            word_chars
        } else {
            word_chars + 1
        };
        if cost > remaining {
            break;
        }
        remaining -= cost;
        kept.push(word);
    }
    format!("{head}{}", kept.join(" "))
}

/// Builds the synthesis instruction prompt for one question and context.
#[must_use]
pub fn construct_prompt(question: &str, context: &str) -> String {
    format!(
        r#"You are an expert analyst synthesizing insights from multiple source documents.

USER QUESTION: {question}

RETRIEVED CONTEXT FROM SOURCES:
{context}

INSTRUCTIONS:
1. Synthesize, don't summarize: compare perspectives across sources
2. Organize thematically, not source by source
3. Be specific: reference exact examples, frameworks, and numbers from the text
4. Show relationships: where do the sources agree or disagree?
5. Attribute every claim to its source identifier

REQUIRED FORMAT:
## 1. Executive Summary
## 2. Thematic Analysis
## 3. Comparative Framework
## 4. Strategic Implications
## 5. Key Takeaways

Use exactly those five section headers. Use bullet points for key details
and include comparison tables where they help.

Now provide a comprehensive, analytical response."#
    )
}

/// One titled section of a synthesis report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSection {
    pub title: String,
    pub body: String,
}

/// Per-source consultation summary attached to a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    pub source_id: String,
    pub excerpts: usize,
}

/// The structured answer produced for one question.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisReport {
    /// The original user question.
    pub question: String,
    /// Parsed sections, in completion order.
    pub sections: Vec<ReportSection>,
    /// Sources consulted, in first-appearance order.
    pub sources: Vec<SourceSummary>,
    /// Whether the context was trimmed to fit the budget.
    pub context_trimmed: bool,
    /// The unparsed completion text.
    pub raw: String,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
}

impl SynthesisReport {
    /// Renders the report as a Markdown document.
    #[must_use]
    pub fn render_markdown(&self) -> String {
        let mut out = format!("# {}\n", self.question);
        for section in &self.sections {
            out.push_str(&format!("\n## {}\n\n{}\n", section.title, section.body));
        }
        if !self.sources.is_empty() {
            out.push_str("\n## Sources Consulted\n\n");
            for source in &self.sources {
                out.push_str(&format!(
                    "- {} ({} excerpts)\n",
                    source.source_id, source.excerpts
                ));
            }
        }
        out
    }
}

/// Drives the single synthesis completion for one question.
pub struct SynthesisBuilder {
    model: Arc<dyn CompletionModel>,
}

impl SynthesisBuilder {
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self { model }
    }

    /// Produces a [`SynthesisReport`] from grouped candidates.
    ///
    /// The completion model is invoked exactly once per call; there is no
    /// internal retry beyond what the model's client provides. A failed
    /// completion surfaces as [`Error::Generation`] naming the sources that
    /// were consulted. The context is trimmed to `context_budget` characters
    /// before prompting.
    pub async fn synthesize(
        &self,
        question: &str,
        groups: &SourceGroups,
        context_budget: usize,
    ) -> Result<SynthesisReport> {
        if groups.is_empty() {
            return Err(Error::invalid_input("no source groups to synthesize from"));
        }

        let built = build_context(groups, context_budget);
        let prompt = construct_prompt(question, &built.text);

        let raw = match self.model.complete(&prompt).await {
            Ok(completion) => completion,
            Err(err) => {
                let attempted = groups.source_ids().join(", ");
                return Err(Error::generation(format!(
                    "{err} (question: {question:?}, sources attempted: {attempted})"
                )));
            }
        };

        let mut sections = parse_sections(&raw);
        if sections.is_empty() {
            sections.push(ReportSection {
                title: "Synthesis".to_string(),
                body: raw.trim().to_string(),
            });
        }

        let sources = groups
            .iter()
            .map(|(source_id, candidates)| SourceSummary {
                source_id: source_id.to_string(),
                excerpts: candidates.len(),
            })
            .collect();

        tracing::debug!(
            sections = sections.len(),
            trimmed = built.trimmed,
            "synthesis complete"
        );

        Ok(SynthesisReport {
            question: question.to_string(),
            sections,
            sources,
            context_trimmed: built.trimmed,
            raw,
            generated_at: Utc::now(),
        })
    }
}

/// Splits a completion into the required report sections.
///
/// Lines before the first recognized header are dropped from the parsed
/// sections; the full completion stays available in
/// [`SynthesisReport::raw`].
fn parse_sections(raw: &str) -> Vec<ReportSection> {
    let mut sections: Vec<ReportSection> = Vec::new();
    let mut current: Option<(&'static str, Vec<&str>)> = None;

    for line in raw.lines() {
        if let Some(title) = match_section_title(line) {
            if let Some((previous, body)) = current.take() {
                sections.push(ReportSection {
                    title: previous.to_string(),
                    body: body.join("\n").trim().to_string(),
                });
            }
            current = Some((title, Vec::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }
    if let Some((previous, body)) = current.take() {
        sections.push(ReportSection {
            title: previous.to_string(),
            body: body.join("\n").trim().to_string(),
        });
    }
    sections
}

/// Matches a line against the required section titles.
///
/// Tolerates Markdown heading markers, bold markers, a leading ordinal
/// such as `1.` or `1)`, and a trailing colon.
fn match_section_title(line: &str) -> Option<&'static str> {
    let mut candidate = line.trim();
    if candidate.is_empty() {
        return None;
    }
    candidate = candidate.trim_start_matches('#').trim_start();
    if let Some(inner) = candidate
        .strip_prefix("**")
        .and_then(|rest| rest.strip_suffix("**"))
    {
        candidate = inner.trim();
    }
    let digits = candidate
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(candidate.len());
    if digits > 0 {
        if let Some(rest) = candidate[digits..]
            .strip_prefix('.')
            .or_else(|| candidate[digits..].strip_prefix(')'))
        {
            candidate = rest.trim_start();
        }
    }
    let candidate = candidate.trim_end_matches(':').trim_end();
    SECTION_TITLES
        .iter()
        .find(|title| candidate.eq_ignore_ascii_case(title))
        .copied()
}
