//! # engram-ingest
//!
//! Ingestion worker pool for engram.
//!
//! This crate provides:
//! - The capture state machine (duplicate-aware memory creation,
//!   metadata extraction, background enrichment)
//! - Concurrent workers with lease renewal and stalled-job recovery
//! - Cross-process cancellation tokens checked at defined checkpoints
//!
//! ## Example
//!
//! ```ignore
//! use engram_ingest::{CaptureProcessor, IngestWorker, WorkerConfig};
//! use engram_db::Database;
//!
//! let db = Database::connect("postgres://...").await?;
//! let processor = CaptureProcessor::new(
//!     db.memories.clone(),
//!     embedder,
//!     Some(generator),
//!     vector_index,
//! );
//!
//! let worker = IngestWorker::new(db.jobs.clone(), processor, WorkerConfig::from_env());
//! let handle = worker.start();
//!
//! // Listen for events
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//!
//! // Graceful shutdown
//! handle.shutdown().await?;
//! ```

pub mod cancel;
pub mod capture;
pub mod worker;

// Re-export core types
pub use engram_core::*;

pub use cancel::CancellationToken;
pub use capture::{CaptureOutcome, CaptureProcessor};
pub use worker::{IngestWorker, WorkerConfig, WorkerEvent, WorkerHandle};
