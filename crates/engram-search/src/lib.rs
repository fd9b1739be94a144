//! # engram-search
//!
//! Query-adaptive retrieval for engram: intent classification, search
//! planning, vector retrieval against the external similarity store,
//! hybrid scoring, policy-weighted re-ranking, and citation-backed
//! answer synthesis.
//!
//! The pipeline entry point is [`SearchPipeline`]; the individual
//! stages are public for reuse and testing.

pub mod analyzer;
pub mod citations;
pub mod classifier;
pub mod pipeline;
pub mod planner;
pub mod policy;
pub mod scorer;
pub mod synthesis;
pub mod vector_client;

pub use analyzer::{analyze_query, QueryAnalysis};
pub use citations::extract_citations;
pub use classifier::QueryClassifier;
pub use pipeline::{
    search_cache_key, SearchPipeline, SearchRequest, SearchResponse, DEFAULT_RESULT_LIMIT,
};
pub use planner::{plan_search, PlannerConfig, SearchPlan, StrategyThresholds};
pub use policy::{policy_rank, recency_factor, PolicyRanked};
pub use scorer::{filter_and_rank, keyword_score, score_candidates, CandidateDoc};
pub use synthesis::{build_evidence, fallback_answer, synthesize, EvidenceItem};
pub use vector_client::{narrow_broad_results, HttpVectorIndex, VectorIndexConfig};

// Re-export core types
pub use engram_core::{MemoryAge, RetrievalPolicy, SearchStrategy};
