//! Error types for engram.

use thiserror::Error;

/// Result type alias using engram's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for engram operations.
///
/// Duplicates are deliberately absent: a duplicate capture or a
/// duplicate-create race is resolved by merging and reported through
/// return types, never as an error.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Memory not found
    #[error("Memory not found: {0}")]
    MemoryNotFound(uuid::Uuid),

    /// An inference call exceeded its time budget.
    /// Transient-retryable: one retry per job, then fallback.
    #[error("{op} timed out after {secs}s")]
    Timeout { op: &'static str, secs: u64 },

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Inference/generation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Search operation failed
    #[error("Search error: {0}")]
    Search(String),

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Job was cancelled via its cancellation token.
    /// Not a failure: the job is discarded, never retried.
    #[error("Job cancelled: {0}")]
    Cancelled(uuid::Uuid),

    /// A required capability (AI provider) is not configured.
    /// Surfaced explicitly rather than returning misleading empty results.
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// Generation returned unparseable output after best-effort extraction.
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is transient and worth a single retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout { .. } | Error::Request(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout {
                op: "http request",
                secs: 0,
            }
        } else {
            Error::Request(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_timeout() {
        let err = Error::Timeout {
            op: "generate",
            secs: 120,
        };
        assert_eq!(err.to_string(), "generate timed out after 120s");
    }

    #[test]
    fn test_error_display_memory_not_found() {
        let id = Uuid::nil();
        let err = Error::MemoryNotFound(id);
        assert_eq!(err.to_string(), format!("Memory not found: {}", id));
    }

    #[test]
    fn test_error_display_cancelled() {
        let id = Uuid::new_v4();
        let err = Error::Cancelled(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_error_display_capability_unavailable() {
        let err = Error::CapabilityUnavailable("no generation backend".to_string());
        assert_eq!(
            err.to_string(),
            "Capability unavailable: no generation backend"
        );
    }

    #[test]
    fn test_error_display_malformed_output() {
        let err = Error::MalformedOutput("expected JSON object".to_string());
        assert_eq!(err.to_string(), "Malformed model output: expected JSON object");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Timeout {
            op: "embed",
            secs: 30
        }
        .is_retryable());
        assert!(Error::Request("connection reset".to_string()).is_retryable());
        assert!(!Error::Cancelled(Uuid::nil()).is_retryable());
        assert!(!Error::MalformedOutput("x".to_string()).is_retryable());
        assert!(!Error::CapabilityUnavailable("x".to_string()).is_retryable());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn test_result_type_ok() {
        fn get_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(get_result().unwrap(), 42);
    }
}
