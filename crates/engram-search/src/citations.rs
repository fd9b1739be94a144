//! Citation extraction from synthesized answers.
//!
//! Extraction is algorithmic, never trusted to the generator: the answer
//! text is scanned for `[n]` and `[n, m, …]` groups in reading order,
//! numbers are de-duplicated preserving first appearance, and each is
//! mapped back to its evidence item. Numbers without a matching evidence
//! line are dropped.

use once_cell::sync::Lazy;
use regex::Regex;

use engram_core::Citation;

use crate::synthesis::EvidenceItem;

/// `[3]` or `[1, 4, 2]` — digit groups inside one bracket pair.
static CITATION_GROUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d+(?:\s*,\s*\d+)*)\]").expect("valid citation regex"));

/// Extract ordered citations from answer text.
pub fn extract_citations(answer: &str, evidence: &[EvidenceItem]) -> Vec<Citation> {
    let mut seen: Vec<usize> = Vec::new();

    for group in CITATION_GROUP.captures_iter(answer) {
        for number in group[1].split(',') {
            let Ok(label) = number.trim().parse::<usize>() else {
                continue;
            };
            if label == 0 || label > evidence.len() {
                continue;
            }
            if !seen.contains(&label) {
                seen.push(label);
            }
        }
    }

    seen.into_iter()
        .map(|label| {
            let item = &evidence[label - 1];
            Citation {
                label,
                memory_id: item.memory_id,
                title: item.title.clone(),
                url: item.url.clone(),
            }
        })
        .collect()
}
