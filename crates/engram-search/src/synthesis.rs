//! Answer synthesis over an ordered evidence context.
//!
//! Evidence order defines citation numbering, so the evidence list is
//! built once and shared between prompt construction and citation
//! extraction. Generation failure degrades to a deterministic template
//! over the top candidates — ranked results are never blocked on the
//! generator.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use engram_core::{Citation, Generator, Memory};

use crate::citations::extract_citations;

/// Length cap for content-derived fallback summaries.
const SUMMARY_SNIPPET_LEN: usize = 200;

/// How many candidates the deterministic fallback answer cites.
const FALLBACK_TOP_N: usize = 3;

/// One line of evidence; its position (1-based) is its citation label.
#[derive(Debug, Clone)]
pub struct EvidenceItem {
    pub memory_id: Uuid,
    pub title: Option<String>,
    pub url: Option<String>,
    pub date: DateTime<Utc>,
    pub summary: String,
}

impl EvidenceItem {
    /// Build an evidence item from a memory, falling back to a content
    /// snippet when no summary has been extracted yet.
    pub fn from_memory(memory: &Memory) -> Self {
        let summary = memory
            .summary
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| {
                let mut snippet: String =
                    memory.content.chars().take(SUMMARY_SNIPPET_LEN).collect();
                if memory.content.chars().count() > SUMMARY_SNIPPET_LEN {
                    snippet.push('…');
                }
                snippet
            });
        Self {
            memory_id: memory.id,
            title: memory.title.clone(),
            url: memory.url.clone(),
            date: memory.created_at,
            summary,
        }
    }

    fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Untitled capture")
    }
}

/// Build ordered evidence from ranked memories.
pub fn build_evidence(memories: &[Memory]) -> Vec<EvidenceItem> {
    memories.iter().map(EvidenceItem::from_memory).collect()
}

/// Render the numbered evidence block for the prompt.
pub fn evidence_block(evidence: &[EvidenceItem]) -> String {
    evidence
        .iter()
        .enumerate()
        .map(|(i, item)| {
            format!(
                "[{}] {} — {}",
                i + 1,
                item.date.format("%Y-%m-%d"),
                item.summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the generation prompt, optionally prefixed with profile context.
pub fn answer_prompt(query: &str, evidence: &[EvidenceItem], profile: Option<&str>) -> String {
    let mut prompt = String::new();
    if let Some(profile) = profile {
        prompt.push_str("Context about the user:\n");
        prompt.push_str(profile);
        prompt.push_str("\n\n");
    }
    prompt.push_str("Evidence from the user's saved memories:\n");
    prompt.push_str(&evidence_block(evidence));
    prompt.push_str(&format!(
        "\n\nQuestion: {query}\n\
         Answer in 2-4 plain-text sentences using only the evidence above. \
         Cite evidence with bracketed numbers like [1] or [1, 3] referring \
         to the numbering of the evidence lines. No markdown, no preamble."
    ));
    prompt
}

/// Deterministic fallback answer from the top candidates.
///
/// Includes bracketed labels so citation extraction applies to it the
/// same way it applies to generated answers.
pub fn fallback_answer(evidence: &[EvidenceItem]) -> String {
    let mut parts = Vec::new();
    for (i, item) in evidence.iter().take(FALLBACK_TOP_N).enumerate() {
        parts.push(format!("{} [{}]", item.display_title(), i + 1));
    }
    format!("The most relevant saved memories: {}.", parts.join(", "))
}

/// Synthesize an answer over the evidence and extract its citations.
///
/// On generation failure the deterministic fallback is used and citation
/// extraction is re-applied to the fallback text for consistency.
pub async fn synthesize(
    generator: &dyn Generator,
    query: &str,
    evidence: &[EvidenceItem],
    profile: Option<&str>,
) -> (String, Vec<Citation>) {
    let prompt = answer_prompt(query, evidence, profile);

    let answer = match generator.generate(&prompt).await {
        Ok(answer) if !answer.trim().is_empty() => answer,
        Ok(_) => {
            warn!("Generator returned empty answer, using fallback");
            fallback_answer(evidence)
        }
        Err(e) => {
            warn!(error = %e, "Answer generation failed, using fallback");
            fallback_answer(evidence)
        }
    };

    let citations = extract_citations(&answer, evidence);
    (answer, citations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_core::ExtractedMetadata;
    use engram_inference::MockInference;

    fn memory(title: &str, summary: Option<&str>, content: &str) -> Memory {
        Memory {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            content: content.to_string(),
            canonical_hash: "hash".to_string(),
            url: Some("https://example.com".to_string()),
            title: Some(title.to_string()),
            summary: summary.map(String::from),
            memory_type: "page".to_string(),
            source: "browser".to_string(),
            metadata: ExtractedMetadata::default(),
            importance_score: 0.5,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_evidence_prefers_summary() {
        let m = memory("T", Some("A short summary"), "Full content here");
        let item = EvidenceItem::from_memory(&m);
        assert_eq!(item.summary, "A short summary");
    }

    #[test]
    fn test_evidence_falls_back_to_content_snippet() {
        let long_content = "x".repeat(500);
        let m = memory("T", None, &long_content);
        let item = EvidenceItem::from_memory(&m);
        assert!(item.summary.chars().count() <= SUMMARY_SNIPPET_LEN + 1);
        assert!(item.summary.ends_with('…'));
    }

    #[test]
    fn test_evidence_block_numbering() {
        let evidence = build_evidence(&[
            memory("First", Some("alpha"), ""),
            memory("Second", Some("beta"), ""),
        ]);
        let block = evidence_block(&evidence);
        assert!(block.contains("[1]"));
        assert!(block.contains("alpha"));
        assert!(block.contains("[2]"));
        assert!(block.contains("beta"));
    }

    #[test]
    fn test_prompt_includes_profile_prefix() {
        let evidence = build_evidence(&[memory("T", Some("s"), "")]);
        let with = answer_prompt("q", &evidence, Some("Likes Rust"));
        let without = answer_prompt("q", &evidence, None);
        assert!(with.contains("Likes Rust"));
        assert!(!without.contains("Likes Rust"));
    }

    #[test]
    fn test_fallback_answer_cites_top_three() {
        let evidence = build_evidence(&[
            memory("One", Some("a"), ""),
            memory("Two", Some("b"), ""),
            memory("Three", Some("c"), ""),
            memory("Four", Some("d"), ""),
        ]);
        let answer = fallback_answer(&evidence);
        assert!(answer.contains("One [1]"));
        assert!(answer.contains("Three [3]"));
        assert!(!answer.contains("[4]"));
    }

    #[tokio::test]
    async fn test_synthesize_happy_path() {
        let evidence = build_evidence(&[
            memory("One", Some("a"), ""),
            memory("Two", Some("b"), ""),
        ]);
        let generator =
            MockInference::new().with_fixed_response("Both notes agree [2] and [1].");
        let (answer, citations) = synthesize(&generator, "q", &evidence, None).await;
        assert_eq!(answer, "Both notes agree [2] and [1].");
        // First-appearance order, not numeric order.
        assert_eq!(citations[0].label, 2);
        assert_eq!(citations[1].label, 1);
    }

    #[tokio::test]
    async fn test_synthesize_generation_failure_uses_fallback() {
        let evidence = build_evidence(&[
            memory("One", Some("a"), ""),
            memory("Two", Some("b"), ""),
        ]);
        let generator = MockInference::new().with_failing_generation(true);
        let (answer, citations) = synthesize(&generator, "q", &evidence, None).await;
        assert!(answer.contains("One [1]"));
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].label, 1);
        assert_eq!(citations[0].memory_id, evidence[0].memory_id);
    }

    #[tokio::test]
    async fn test_synthesize_empty_answer_uses_fallback() {
        let evidence = build_evidence(&[memory("One", Some("a"), "")]);
        let generator = MockInference::new().with_fixed_response("   ");
        let (answer, _) = synthesize(&generator, "q", &evidence, None).await;
        assert!(answer.contains("One [1]"));
    }
}
