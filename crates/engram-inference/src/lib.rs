//! # engram-inference
//!
//! Embedding and generation backend abstraction for engram.
//!
//! Backends implement the [`engram_core::Embedder`] and
//! [`engram_core::Generator`] traits and are injected into the pipeline
//! at process start. Every call enforces an explicit timeout; a timed-out
//! call surfaces as a typed timeout error rather than hanging the caller.

pub mod fallback;
pub mod mock;
#[cfg(feature = "ollama")]
pub mod ollama;

pub use fallback::deterministic_embedding;
pub use mock::{MockCall, MockInference};
#[cfg(feature = "ollama")]
pub use ollama::OllamaBackend;

// Re-export core types
pub use engram_core::{Embedder, Generator};
