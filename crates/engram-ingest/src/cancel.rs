//! Cross-process cancellation tokens.
//!
//! A token is an explicit handle on one job's cancellation flag, backed
//! by the shared queue store so cancellation requested through any API
//! process is visible to whichever worker holds the job. Handlers check
//! it at defined checkpoints; they never poll it in tight loops.

use std::sync::Arc;

use uuid::Uuid;

use engram_core::{JobRepository, Result};

/// Cancellation handle for a single job.
#[derive(Clone)]
pub struct CancellationToken {
    jobs: Arc<dyn JobRepository>,
    job_id: Uuid,
}

impl CancellationToken {
    pub fn new(jobs: Arc<dyn JobRepository>, job_id: Uuid) -> Self {
        Self { jobs, job_id }
    }

    /// The job this token belongs to.
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Read the shared cancellation flag.
    pub async fn is_cancelled(&self) -> Result<bool> {
        self.jobs.is_cancel_requested(self.job_id).await
    }
}
