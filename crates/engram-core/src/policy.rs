//! Named retrieval policies.
//!
//! A policy is an immutable weighting profile controlling how semantic,
//! keyword, importance, and recency signals combine in the final ranking
//! pass, plus a result-count cap. Policies are orthogonal to the search
//! strategy: strategy decides how wide to cast the net, policy decides
//! how to value what the net brings back.

use serde::{Deserialize, Serialize};

/// Signal weights for final ranking. Not required to sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyWeights {
    pub semantic: f32,
    pub keyword: f32,
    pub importance: f32,
    pub recency: f32,
}

/// A named, immutable retrieval policy. Selected per request; never
/// mutated at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalPolicy {
    pub name: String,
    pub weights: PolicyWeights,
    pub max_results: usize,
}

impl RetrievalPolicy {
    fn new(name: &str, weights: PolicyWeights, max_results: usize) -> Self {
        Self {
            name: name.to_string(),
            weights,
            max_results,
        }
    }

    /// Default all-round profile.
    pub fn balanced() -> Self {
        Self::new(
            "balanced",
            PolicyWeights {
                semantic: 0.5,
                keyword: 0.2,
                importance: 0.15,
                recency: 0.15,
            },
            10,
        )
    }

    /// Conversational recall: recency matters, few results.
    pub fn chat() -> Self {
        Self::new(
            "chat",
            PolicyWeights {
                semantic: 0.45,
                keyword: 0.15,
                importance: 0.1,
                recency: 0.3,
            },
            5,
        )
    }

    /// Planning: favor important, actionable memories over fresh ones.
    pub fn planning() -> Self {
        Self::new(
            "planning",
            PolicyWeights {
                semantic: 0.4,
                keyword: 0.15,
                importance: 0.35,
                recency: 0.1,
            },
            15,
        )
    }

    /// Profile building: breadth over precision, recency nearly ignored.
    pub fn profile() -> Self {
        Self::new(
            "profile",
            PolicyWeights {
                semantic: 0.35,
                keyword: 0.15,
                importance: 0.45,
                recency: 0.05,
            },
            20,
        )
    }

    /// Recall of a specific remembered item: lexical precision up front.
    pub fn recall() -> Self {
        Self::new(
            "recall",
            PolicyWeights {
                semantic: 0.4,
                keyword: 0.4,
                importance: 0.05,
                recency: 0.15,
            },
            10,
        )
    }

    /// Resolve a policy by name; unknown names fall back to `balanced`.
    pub fn by_name(name: &str) -> Self {
        match name {
            "chat" => Self::chat(),
            "planning" => Self::planning(),
            "profile" => Self::profile(),
            "recall" => Self::recall(),
            "balanced" => Self::balanced(),
            _ => Self::balanced(),
        }
    }

    /// All built-in policy names.
    pub fn builtin_names() -> &'static [&'static str] {
        &["balanced", "chat", "planning", "profile", "recall"]
    }
}
