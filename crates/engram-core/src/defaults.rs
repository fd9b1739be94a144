//! Tunable defaults for engram.
//!
//! Every constant here can be overridden through the config struct of the
//! component that uses it; these are the values used when no override is
//! supplied. The similarity and strategy thresholds are hand-tuned and
//! pending calibration against a labeled relevance dataset.

// ─── Canonicalization ──────────────────────────────────────────────────────

/// Maximum length (chars) of canonical text before truncation.
pub const CANONICAL_MAX_LEN: usize = 8192;

// ─── Ingestion queue ───────────────────────────────────────────────────────

/// Word-level similarity above which two same-URL captures are one job.
pub const QUEUE_SIMILARITY_THRESHOLD: f64 = 0.9;

/// Retry budget per ingestion job (single retry, then failed).
pub const JOB_MAX_RETRIES: i32 = 1;

/// Delay before a retried job becomes claimable again (seconds).
pub const JOB_RETRY_DELAY_SECS: i64 = 30;

/// Lease duration granted on claim (seconds).
pub const JOB_LEASE_SECS: i64 = 60;

/// How long past lease expiry a job is considered stalled (seconds).
pub const JOB_STALL_AFTER_SECS: i64 = 60;

/// Maximum concurrent jobs per worker process.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Worker polling interval when the queue is empty (milliseconds).
pub const JOB_POLL_INTERVAL_MS: u64 = 500;

/// Interval between lease renewals while a job is running (seconds).
pub const JOB_LEASE_RENEW_SECS: u64 = 20;

/// Hard wall-clock budget for one job execution (seconds).
pub const JOB_TIMEOUT_SECS: u64 = 300;

// ─── Inference ─────────────────────────────────────────────────────────────

/// Default Ollama endpoint.
pub const OLLAMA_URL: &str = "http://localhost:11434";

/// Default embedding model.
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default generation model.
pub const GEN_MODEL: &str = "qwen3:8b";

/// Default embedding dimension for nomic-embed-text.
pub const EMBED_DIMENSION: usize = 768;

/// Timeout for embedding requests (seconds).
pub const EMBED_TIMEOUT_SECS: u64 = 30;

/// Timeout for generation requests (seconds).
pub const GEN_TIMEOUT_SECS: u64 = 120;

// ─── Search planning ───────────────────────────────────────────────────────

/// Ceiling on the candidate pool regardless of strategy.
pub const RETRIEVAL_LIMIT_MAX: usize = 10_000;

/// Corpus-size boundaries for pool capping.
pub const SMALL_CORPUS: usize = 100;
pub const LARGE_CORPUS: usize = 10_000;

/// Pool cap as a fraction of corpus size (small / large corpora).
pub const SMALL_CORPUS_POOL_FRACTION: f64 = 0.5;
pub const LARGE_CORPUS_POOL_FRACTION: f64 = 0.3;

/// Raw similarity above which broad-strategy results form a
/// high-quality subset worth keeping on their own.
pub const BROAD_NARROWING_SCORE: f32 = 0.3;

// ─── Caching ───────────────────────────────────────────────────────────────

/// Search result cache TTL (seconds).
pub const SEARCH_CACHE_TTL_SECS: u64 = 300;

/// Query classification cache TTL (seconds).
pub const CLASSIFICATION_CACHE_TTL_SECS: u64 = 86_400;

/// Async search job record TTL (seconds).
pub const SEARCH_JOB_TTL_SECS: i64 = 900;

// ─── Events ────────────────────────────────────────────────────────────────

/// Broadcast channel capacity for worker events.
pub const EVENT_BUS_CAPACITY: usize = 256;
