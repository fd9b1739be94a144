//! Query shape analysis.
//!
//! Derives the signals the planner needs: token counts, temporal and
//! interrogative markers, a specificity score in [0, 1], and an
//! estimated target age for the memories the query is after.

use once_cell::sync::Lazy;
use regex::Regex;

use engram_core::{content_tokens, keyword_density, word_count, MemoryAge};

/// Relative time expressions like "2 years ago" or "three weeks ago".
static RELATIVE_AGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+|a|an|one|two|three|four|five|six|seven|eight|nine|ten)\s+(day|week|month|year)s?\s+ago\b")
        .expect("valid relative-age regex")
});

/// Words that signal the query cares about *when*.
static TEMPORAL_WORDS: &[&str] = &[
    "yesterday",
    "today",
    "tonight",
    "recently",
    "ago",
    "last",
    "past",
    "earlier",
    "week",
    "month",
    "year",
    "years",
    "old",
    "latest",
    "newest",
];

/// Interrogative openers that make a query a pointed question.
static INTERROGATIVES: &[&str] = &[
    "what", "when", "where", "which", "who", "whose", "how", "why",
];

/// Analysis output consumed by the search planner.
#[derive(Debug, Clone)]
pub struct QueryAnalysis {
    /// Raw whitespace token count.
    pub token_count: usize,
    /// Stopword-filtered content tokens (the scoring vocabulary).
    pub content_tokens: Vec<String>,
    pub has_temporal: bool,
    pub has_interrogative: bool,
    /// Blended specificity in [0, 1]; high means a pointed lookup.
    pub specificity: f32,
    /// Fraction of raw tokens that are content tokens.
    pub keyword_density: f32,
    pub estimated_age: MemoryAge,
}

impl QueryAnalysis {
    /// An exploratory query is short on content and not a pointed
    /// question — the shape of "show me stuff about X".
    pub fn is_exploratory(&self) -> bool {
        self.content_tokens.len() <= 2 && !self.has_interrogative
    }
}

fn parse_count(raw: &str) -> u32 {
    match raw.to_lowercase().as_str() {
        "a" | "an" | "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        n => n.parse().unwrap_or(1),
    }
}

/// Estimate the age of the memories a query targets.
fn estimate_age(lower: &str) -> MemoryAge {
    if let Some(caps) = RELATIVE_AGE.captures(lower) {
        let count = parse_count(&caps[1]);
        return match &caps[2].to_lowercase()[..] {
            "year" => MemoryAge::Old,
            "month" if count >= 6 => MemoryAge::Old,
            "month" => MemoryAge::Medium,
            "week" if count >= 3 => MemoryAge::Medium,
            _ => MemoryAge::Recent,
        };
    }

    if lower.contains("a while back")
        || lower.contains("long ago")
        || lower.contains("back then")
        || lower.contains("a long time")
    {
        return MemoryAge::Old;
    }

    if lower.contains("yesterday")
        || lower.contains("today")
        || lower.contains("this week")
        || lower.contains("recently")
        || lower.contains("just now")
        || lower.contains("latest")
    {
        return MemoryAge::Recent;
    }

    if lower.contains("last month") || lower.contains("a few months") {
        return MemoryAge::Medium;
    }

    MemoryAge::Any
}

/// Analyze a query's shape.
pub fn analyze_query(query: &str) -> QueryAnalysis {
    let lower = query.to_lowercase();
    let token_count = word_count(query);
    let tokens = content_tokens(query);
    let density = keyword_density(query);

    let has_temporal = TEMPORAL_WORDS
        .iter()
        .any(|w| lower.split_whitespace().any(|t| t.trim_matches(|c: char| !c.is_alphanumeric()) == *w))
        || RELATIVE_AGE.is_match(&lower);

    let first_word = lower
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_string();
    let has_interrogative =
        INTERROGATIVES.contains(&first_word.as_str()) || lower.contains("did i");

    // Specificity blends vocabulary volume, keyword density, and the
    // pointed-question signal.
    let token_factor = (tokens.len() as f32 / 6.0).min(1.0) * 0.5;
    let density_factor = density * 0.3;
    let interrogative_factor = if has_interrogative { 0.2 } else { 0.0 };
    let specificity = (token_factor + density_factor + interrogative_factor).clamp(0.0, 1.0);

    QueryAnalysis {
        token_count,
        content_tokens: tokens,
        has_temporal,
        has_interrogative,
        specificity,
        keyword_density: density,
        estimated_age: estimate_age(&lower),
    }
}
