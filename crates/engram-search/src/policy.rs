//! Policy-weighted re-ranking.
//!
//! A second ranking pass over the threshold survivors, distinct from
//! hybrid scoring: the strategy decided how wide to cast the net, the
//! policy decides how to value what came back (chat vs. planning vs.
//! profile use cases weigh recency and importance differently).

use chrono::{DateTime, Utc};
use tracing::debug;

use engram_core::{RetrievalPolicy, ScoredCandidate};

/// A candidate with its policy-blended score.
#[derive(Debug, Clone)]
pub struct PolicyRanked {
    pub candidate: ScoredCandidate,
    pub policy_score: f32,
}

/// Recency factor from age in days: 1.0 now, 0.5 at thirty days,
/// decaying toward zero.
pub fn recency_factor(age_days: f32) -> f32 {
    1.0 / (1.0 + age_days.max(0.0) / 30.0)
}

/// Re-score and truncate survivors under a named policy.
pub fn policy_rank(
    candidates: Vec<ScoredCandidate>,
    policy: &RetrievalPolicy,
    now: DateTime<Utc>,
) -> Vec<PolicyRanked> {
    let mut ranked: Vec<PolicyRanked> = candidates
        .into_iter()
        .map(|c| {
            let age_days = (now - c.created_at).num_seconds().max(0) as f32 / 86_400.0;
            let w = &policy.weights;
            let policy_score = w.semantic * c.semantic_score
                + w.keyword * c.keyword_score
                + w.importance * c.importance_score
                + w.recency * recency_factor(age_days);
            PolicyRanked {
                candidate: c,
                policy_score,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.policy_score
            .partial_cmp(&a.policy_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(policy.max_results);

    debug!(
        policy = %policy.name,
        result_count = ranked.len(),
        "Policy re-ranking applied"
    );

    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn candidate(semantic: f32, keyword: f32, importance: f32, age_days: i64) -> ScoredCandidate {
        ScoredCandidate {
            memory_id: Uuid::new_v4(),
            semantic_score: semantic,
            keyword_score: keyword,
            coverage_ratio: 0.5,
            final_score: semantic,
            created_at: Utc::now() - Duration::days(age_days),
            importance_score: importance,
        }
    }

    #[test]
    fn test_recency_factor_shape() {
        assert!((recency_factor(0.0) - 1.0).abs() < 1e-6);
        assert!((recency_factor(30.0) - 0.5).abs() < 1e-6);
        assert!(recency_factor(365.0) < 0.1);
        // Clock skew must not produce factors above 1.
        assert!((recency_factor(-5.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_output_never_exceeds_max_results() {
        let policy = RetrievalPolicy::chat(); // max_results = 5
        let candidates: Vec<_> = (0..20).map(|_| candidate(0.5, 0.5, 0.5, 10)).collect();
        let ranked = policy_rank(candidates, &policy, Utc::now());
        assert_eq!(ranked.len(), policy.max_results);
    }

    #[test]
    fn test_output_sorted_by_policy_score() {
        let policy = RetrievalPolicy::balanced();
        let candidates = vec![
            candidate(0.2, 0.1, 0.1, 100),
            candidate(0.9, 0.8, 0.9, 1),
            candidate(0.5, 0.5, 0.5, 30),
        ];
        let ranked = policy_rank(candidates, &policy, Utc::now());
        for pair in ranked.windows(2) {
            assert!(pair[0].policy_score >= pair[1].policy_score);
        }
    }

    #[test]
    fn test_recency_heavy_policy_reorders() {
        // Same relevance, different ages: the chat policy (recency 0.3)
        // must put the fresh memory first.
        let fresh = candidate(0.5, 0.5, 0.5, 0);
        let fresh_id = fresh.memory_id;
        let stale = candidate(0.5, 0.5, 0.5, 300);

        let ranked = policy_rank(vec![stale, fresh], &RetrievalPolicy::chat(), Utc::now());
        assert_eq!(ranked[0].candidate.memory_id, fresh_id);
    }

    #[test]
    fn test_importance_heavy_policy_reorders() {
        let important = candidate(0.4, 0.3, 0.95, 200);
        let important_id = important.memory_id;
        let fresh_trivial = candidate(0.4, 0.3, 0.05, 1);

        let ranked = policy_rank(
            vec![fresh_trivial, important],
            &RetrievalPolicy::profile(),
            Utc::now(),
        );
        assert_eq!(ranked[0].candidate.memory_id, important_id);
    }

    #[test]
    fn test_empty_input() {
        let ranked = policy_rank(vec![], &RetrievalPolicy::balanced(), Utc::now());
        assert!(ranked.is_empty());
    }
}
