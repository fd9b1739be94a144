//! # engram-core
//!
//! Core types, traits, and abstractions for the engram pipeline.
//!
//! This crate provides the foundational data structures and trait
//! definitions that other engram crates depend on.

pub mod cache;
pub mod canonical;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod policy;
pub mod tokens;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use cache::{InMemoryCache, NoopCache};
pub use canonical::{
    canonicalize, canonicalize_bounded, content_hash, normalize_text, normalize_url,
    CanonicalContent,
};
pub use error::{Error, Result};
pub use models::*;
pub use policy::{PolicyWeights, RetrievalPolicy};
pub use tokens::{content_tokens, keyword_density, word_count};
pub use traits::*;
pub use uuid_utils::{extract_timestamp, is_v7, new_v7};
