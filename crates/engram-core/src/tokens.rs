//! Query token utilities for lexical scoring.
//!
//! Content tokens are the stopword-filtered, length > 2 word tokens of a
//! query. They drive the keyword half of hybrid scoring and the coverage
//! ratio.

use std::collections::HashSet;

use once_cell::sync::Lazy;

/// English stopwords excluded from content tokens.
static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "are", "was", "were", "been", "being", "have", "has", "had", "did",
        "does", "doing", "will", "would", "could", "should", "can", "may", "might", "must",
        "shall", "about", "above", "after", "again", "all", "any", "because", "before", "between",
        "both", "but", "down", "during", "each", "few", "from", "further", "here", "how", "into",
        "its", "itself", "just", "more", "most", "not", "now", "off", "once", "only", "other",
        "our", "out", "over", "own", "same", "some", "such", "than", "that", "their", "them",
        "then", "there", "these", "they", "this", "those", "through", "too", "under", "until",
        "very", "what", "when", "where", "which", "while", "who", "whom", "why", "with", "you",
        "your", "yours",
    ]
    .into_iter()
    .collect()
});

/// Extract content tokens: lowercased, stopword-filtered, length > 2.
pub fn content_tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(t.as_str()))
        .collect()
}

/// Count raw word tokens (no filtering), for query-shape analysis.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Fraction of raw tokens that survive content filtering, in [0, 1].
///
/// Dense-keyword queries ("rust tokio channels backpressure") score near
/// 1.0; chatty natural-language queries score low.
pub fn keyword_density(text: &str) -> f32 {
    let words = word_count(text);
    if words == 0 {
        return 0.0;
    }
    content_tokens(text).len() as f32 / words as f32
}
