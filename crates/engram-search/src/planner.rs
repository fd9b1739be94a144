//! Query-adaptive search planning.
//!
//! Turns a [`QueryAnalysis`] and the user's corpus size into a concrete
//! retrieval plan: a strategy (how wide to cast the net), a candidate
//! pool size, and acceptance thresholds. This selection is what keeps
//! old/rare memories findable without flooding active corpora with
//! noise.

use tracing::debug;

use engram_core::{defaults, MemoryAge, SearchStrategy};

use crate::analyzer::QueryAnalysis;

/// Acceptance thresholds applied after hybrid scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyThresholds {
    pub semantic: f32,
    pub keyword: f32,
    pub coverage: f32,
    pub min_score: f32,
}

/// Per-strategy tunables. The numbers are hand-tuned; keep them
/// configurable rather than treating them as invariants.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub broad: StrategyThresholds,
    pub narrow: StrategyThresholds,
    pub balanced: StrategyThresholds,
    /// Candidate pool multiplier per strategy (broad, narrow, balanced).
    pub broad_multiplier: usize,
    pub narrow_multiplier: usize,
    pub balanced_multiplier: usize,
    /// Absolute ceiling on the candidate pool.
    pub max_retrieval_limit: usize,
    /// Threshold nudge applied for keyword-density extremes.
    pub density_nudge: f32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            broad: StrategyThresholds {
                semantic: 0.1,
                keyword: 0.2,
                coverage: 0.3,
                min_score: 0.1,
            },
            narrow: StrategyThresholds {
                semantic: 0.2,
                keyword: 0.4,
                coverage: 0.6,
                min_score: 0.2,
            },
            balanced: StrategyThresholds {
                semantic: 0.15,
                keyword: 0.3,
                coverage: 0.5,
                min_score: 0.15,
            },
            broad_multiplier: 10,
            narrow_multiplier: 2,
            balanced_multiplier: 3,
            max_retrieval_limit: defaults::RETRIEVAL_LIMIT_MAX,
            density_nudge: 0.05,
        }
    }
}

/// A concrete plan for one query.
#[derive(Debug, Clone)]
pub struct SearchPlan {
    pub strategy: SearchStrategy,
    /// Candidate pool size to request from the vector index.
    pub retrieval_limit: usize,
    pub thresholds: StrategyThresholds,
    pub requested_limit: usize,
    pub estimated_age: MemoryAge,
}

/// Select a strategy for the analyzed query.
///
/// Precedence matters: an old-age query goes broad regardless of
/// specificity (old memories have drifted away from today's vocabulary),
/// then a highly specific query narrows, then vague or exploratory
/// queries over large corpora widen.
fn select_strategy(analysis: &QueryAnalysis, corpus_size: usize) -> SearchStrategy {
    if analysis.estimated_age == MemoryAge::Old {
        return SearchStrategy::Broad;
    }
    if analysis.specificity > 0.7 {
        return SearchStrategy::Narrow;
    }
    if analysis.specificity < 0.4 {
        return SearchStrategy::Broad;
    }
    if corpus_size > 1000 && analysis.is_exploratory() {
        return SearchStrategy::Broad;
    }
    SearchStrategy::Balanced
}

/// Compute the candidate pool size for a strategy.
///
/// `requested × multiplier`, clamped to `[requested, max]`, then capped
/// relative to corpus size: tiny corpora cap near 50% (no point asking
/// for more than half of everything), very large corpora near 30%.
fn retrieval_limit(
    strategy: SearchStrategy,
    requested: usize,
    corpus_size: usize,
    config: &PlannerConfig,
) -> usize {
    let multiplier = match strategy {
        SearchStrategy::Broad => config.broad_multiplier,
        SearchStrategy::Narrow => config.narrow_multiplier,
        SearchStrategy::Balanced => config.balanced_multiplier,
    };

    let mut limit = requested.saturating_mul(multiplier);

    let corpus_cap = if corpus_size < defaults::SMALL_CORPUS {
        (corpus_size as f64 * defaults::SMALL_CORPUS_POOL_FRACTION) as usize
    } else if corpus_size > defaults::LARGE_CORPUS {
        (corpus_size as f64 * defaults::LARGE_CORPUS_POOL_FRACTION) as usize
    } else {
        usize::MAX
    };
    limit = limit.min(corpus_cap);

    limit.clamp(requested.max(1), config.max_retrieval_limit)
}

/// Nudge thresholds by keyword density: dense-keyword queries relax the
/// keyword gate and tighten the semantic one, chatty queries the
/// reverse.
fn apply_density_nudge(
    mut thresholds: StrategyThresholds,
    density: f32,
    nudge: f32,
) -> StrategyThresholds {
    if density > 0.7 {
        thresholds.keyword = (thresholds.keyword - nudge).max(0.0);
        thresholds.semantic += nudge;
    } else if density < 0.3 {
        thresholds.keyword += nudge;
        thresholds.semantic = (thresholds.semantic - nudge).max(0.0);
    }
    thresholds
}

/// Build the search plan for a query.
pub fn plan_search(
    analysis: &QueryAnalysis,
    corpus_size: usize,
    requested_limit: usize,
    config: &PlannerConfig,
) -> SearchPlan {
    let strategy = select_strategy(analysis, corpus_size);

    let base = match strategy {
        SearchStrategy::Broad => config.broad,
        SearchStrategy::Narrow => config.narrow,
        SearchStrategy::Balanced => config.balanced,
    };
    let thresholds = apply_density_nudge(base, analysis.keyword_density, config.density_nudge);
    let limit = retrieval_limit(strategy, requested_limit, corpus_size, config);

    debug!(
        strategy = ?strategy,
        retrieval_limit = limit,
        specificity = analysis.specificity,
        corpus_size,
        "Search plan selected"
    );

    SearchPlan {
        strategy,
        retrieval_limit: limit,
        thresholds,
        requested_limit,
        estimated_age: analysis.estimated_age,
    }
}
