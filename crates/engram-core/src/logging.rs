//! Structured logging schema and field name constants for engram.
//!
//! All crates use these constants for consistent structured logging
//! fields, so log aggregation tools can query by standardized names
//! across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data (candidates, tokens) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated across request → job → sub-calls.
/// Format: UUIDv7 (time-ordered).
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "search", "db", "inference", "ingest"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "planner", "scorer", "vector_index", "worker", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "search", "embed", "generate", "claim_next"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Memory UUID being operated on.
pub const MEMORY_ID: &str = "memory_id";

/// Ingestion job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// User UUID scoping the operation.
pub const USER_ID: &str = "user_id";

/// Search query text.
pub const QUERY: &str = "query";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a search or query.
pub const RESULT_COUNT: &str = "result_count";

/// Candidate pool size requested from the vector index.
pub const RETRIEVAL_LIMIT: &str = "retrieval_limit";

/// Byte length of a prompt or response.
pub const PROMPT_LEN: &str = "prompt_len";

// ─── Search-specific fields ────────────────────────────────────────────────

/// Strategy chosen by the planner ("narrow", "balanced", "broad").
pub const STRATEGY: &str = "strategy";

/// Retrieval policy applied in the final ranking pass.
pub const POLICY: &str = "policy";

/// Query specificity score in [0, 1].
pub const SPECIFICITY: &str = "specificity";

/// Number of candidates surviving threshold filtering.
pub const SURVIVORS: &str = "survivors";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for inference.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Slow operation threshold exceeded.
pub const SLOW: &str = "slow";
