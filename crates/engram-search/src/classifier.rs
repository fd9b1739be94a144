//! Query intent classification.
//!
//! Fast rule families first: each regex family labels a class with
//! confidence 0.85. When no rule fires, a generator-backed classifier
//! is consulted and its verdict cached for a day. AI failure never
//! blocks classification — the rule-based default ("search", low
//! confidence) always stands in.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use engram_core::{
    cache_get_json, cache_set_json, defaults, Generator, KeyValueCache, QueryClass,
    QueryClassification,
};

/// Confidence assigned to rule matches.
const RULE_CONFIDENCE: f32 = 0.85;

/// Confidence of the fallback default when nothing matched and no AI
/// verdict is available.
const DEFAULT_CONFIDENCE: f32 = 0.3;

struct RuleFamily {
    class: QueryClass,
    pattern: Regex,
    suggested_policy: &'static str,
}

static RULE_FAMILIES: Lazy<Vec<RuleFamily>> = Lazy::new(|| {
    // Metric precedes recall: "how many articles did I save" is a count
    // question even though it contains a recall phrase.
    vec![
        RuleFamily {
            class: QueryClass::Metric,
            pattern: Regex::new(
                r"(?i)\b(how (many|much|often)|count( of)?|number of|total|average|per (day|week|month))\b",
            )
            .expect("valid metric rules"),
            suggested_policy: "balanced",
        },
        RuleFamily {
            class: QueryClass::Recall,
            pattern: Regex::new(
                r"(?i)\b(what did i (read|see|save|capture)|did i (read|see|save)|remember (that|the|when)|recall|i (read|saw|captured|bookmarked) (something|an?|that))\b",
            )
            .expect("valid recall rules"),
            suggested_policy: "recall",
        },
        RuleFamily {
            class: QueryClass::Plan,
            pattern: Regex::new(
                r"(?i)\b(plan(ning)?|should i|what next|next steps?|to-?do|roadmap|prioritize|organize my)\b",
            )
            .expect("valid plan rules"),
            suggested_policy: "planning",
        },
        RuleFamily {
            class: QueryClass::Profile,
            pattern: Regex::new(
                r"(?i)\b(about me|my (interests|preferences|profile|habits|reading)|who am i|what do i (like|care about))\b",
            )
            .expect("valid profile rules"),
            suggested_policy: "profile",
        },
        RuleFamily {
            class: QueryClass::Search,
            pattern: Regex::new(r"(?i)\b(find|search|look (for|up)|show me)\b")
                .expect("valid search rules"),
            suggested_policy: "balanced",
        },
    ]
});

fn default_classification() -> QueryClassification {
    QueryClassification {
        class: QueryClass::Search,
        confidence: DEFAULT_CONFIDENCE,
        suggested_policy: "balanced".to_string(),
    }
}

/// Cache key for a classification: hash of the normalized query.
fn classification_cache_key(query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.trim().to_lowercase().as_bytes());
    let hash = hex::encode(hasher.finalize());
    format!("engram:classify:{}", &hash[..16])
}

/// Query classifier with rule-based fast path and cached AI fallback.
pub struct QueryClassifier {
    cache: Arc<dyn KeyValueCache>,
    generator: Option<Arc<dyn Generator>>,
    cache_ttl: Duration,
}

impl QueryClassifier {
    pub fn new(cache: Arc<dyn KeyValueCache>, generator: Option<Arc<dyn Generator>>) -> Self {
        Self {
            cache,
            generator,
            cache_ttl: Duration::from_secs(defaults::CLASSIFICATION_CACHE_TTL_SECS),
        }
    }

    /// Override the AI-verdict cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Match the rule families in order; first hit wins.
    fn classify_by_rules(query: &str) -> Option<QueryClassification> {
        for family in RULE_FAMILIES.iter() {
            if family.pattern.is_match(query) {
                return Some(QueryClassification {
                    class: family.class,
                    confidence: RULE_CONFIDENCE,
                    suggested_policy: family.suggested_policy.to_string(),
                });
            }
        }
        None
    }

    /// Classify a query. Always returns a classification; never errors,
    /// never blocks on AI failure.
    pub async fn classify(&self, query: &str) -> QueryClassification {
        if let Some(classification) = Self::classify_by_rules(query) {
            debug!(
                class = classification.class.as_str(),
                confidence = classification.confidence,
                "Query classified by rules"
            );
            return classification;
        }

        let key = classification_cache_key(query);
        if let Some(cached) =
            cache_get_json::<QueryClassification>(self.cache.as_ref(), &key).await
        {
            debug!(class = cached.class.as_str(), "Query classification cache hit");
            return cached;
        }

        let Some(generator) = &self.generator else {
            return default_classification();
        };

        match self.classify_by_ai(generator.as_ref(), query).await {
            Some(classification) => {
                cache_set_json(self.cache.as_ref(), &key, &classification, self.cache_ttl).await;
                classification
            }
            None => default_classification(),
        }
    }

    async fn classify_by_ai(
        &self,
        generator: &dyn Generator,
        query: &str,
    ) -> Option<QueryClassification> {
        let prompt = format!(
            "Classify the intent of this query over a personal memory archive.\n\
             Query: {query}\n\
             Respond with JSON only: {{\"class\": one of \
             [\"recall\",\"search\",\"plan\",\"profile\",\"metric\"], \
             \"confidence\": number between 0 and 1}}"
        );

        let raw = match generator.generate_json(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "AI classification failed, using rule-based default");
                return None;
            }
        };

        let parsed = parse_classification(&raw);
        if parsed.is_none() {
            warn!(response_len = raw.len(), "Unparseable classification output");
        }
        parsed
    }
}

/// Best-effort parse of the generator's classification JSON.
fn parse_classification(raw: &str) -> Option<QueryClassification> {
    // Models sometimes wrap JSON in code fences or prose; cut to the
    // outermost object before parsing.
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    let value: serde_json::Value = serde_json::from_str(&raw[start..=end]).ok()?;

    let class = match value.get("class")?.as_str()? {
        "recall" => QueryClass::Recall,
        "search" => QueryClass::Search,
        "plan" => QueryClass::Plan,
        "profile" => QueryClass::Profile,
        "metric" => QueryClass::Metric,
        _ => return None,
    };
    let confidence = value
        .get("confidence")
        .and_then(|c| c.as_f64())
        .unwrap_or(0.5)
        .clamp(0.0, 1.0) as f32;

    let suggested_policy = match class {
        QueryClass::Recall => "recall",
        QueryClass::Plan => "planning",
        QueryClass::Profile => "profile",
        QueryClass::Search | QueryClass::Metric => "balanced",
    };

    Some(QueryClassification {
        class,
        confidence,
        suggested_policy: suggested_policy.to_string(),
    })
}
