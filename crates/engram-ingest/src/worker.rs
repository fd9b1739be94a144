//! Ingestion worker pool.
//!
//! Workers pull from the shared persisted queue, hold a lease per job
//! and renew it while processing, and emit lifecycle events on a
//! broadcast channel. A periodic sweep re-pends stalled jobs (and
//! discards cancelled ones) so a crashed worker never strands work.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use engram_core::{defaults, Error, Job, JobRepository, Result};

use crate::cancel::CancellationToken;
use crate::capture::{CaptureOutcome, CaptureProcessor};

/// Configuration for the ingestion worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds when the queue is empty.
    pub poll_interval_ms: u64,
    /// Maximum number of concurrent jobs.
    pub max_concurrent_jobs: usize,
    /// Whether to enable job processing.
    pub enabled: bool,
    /// Interval between lease renewals while a job runs (seconds).
    pub lease_renew_secs: u64,
    /// Interval between stalled-job sweeps (seconds).
    pub stall_sweep_secs: u64,
    /// Hard wall-clock budget per job (seconds).
    pub job_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::JOB_POLL_INTERVAL_MS,
            max_concurrent_jobs: defaults::JOB_MAX_CONCURRENT,
            enabled: true,
            lease_renew_secs: defaults::JOB_LEASE_RENEW_SECS,
            stall_sweep_secs: 30,
            job_timeout_secs: defaults::JOB_TIMEOUT_SECS,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `INGEST_WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `INGEST_MAX_CONCURRENT` | `4` | Max concurrent jobs |
    /// | `INGEST_POLL_INTERVAL_MS` | `500` | Polling interval when queue is empty |
    /// | `INGEST_STALL_SWEEP_SECS` | `30` | Stalled-job sweep interval |
    pub fn from_env() -> Self {
        let enabled = std::env::var("INGEST_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent_jobs = std::env::var("INGEST_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::JOB_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var("INGEST_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_POLL_INTERVAL_MS);

        let stall_sweep_secs = std::env::var("INGEST_STALL_SWEEP_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        Self {
            poll_interval_ms,
            max_concurrent_jobs,
            enabled,
            stall_sweep_secs,
            ..Default::default()
        }
    }

    /// Create a new config with custom poll interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set maximum concurrent jobs.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    /// Enable or disable job processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the per-job timeout.
    pub fn with_job_timeout(mut self, secs: u64) -> Self {
        self.job_timeout_secs = secs;
        self
    }
}

/// Event emitted by the ingestion worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A job was started.
    JobStarted { job_id: Uuid },
    /// A job completed; the memory it produced, and whether by merge.
    JobCompleted {
        job_id: Uuid,
        memory_id: Uuid,
        merged: bool,
    },
    /// A job observed its cancellation flag and was discarded.
    JobCancelled { job_id: Uuid },
    /// A job failed (it may still be retried by the queue).
    JobFailed { job_id: Uuid, error: String },
    /// Worker started.
    WorkerStarted,
    /// Worker stopped.
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Ingestion worker that processes capture jobs from the queue.
pub struct IngestWorker {
    jobs: Arc<dyn JobRepository>,
    processor: Arc<CaptureProcessor>,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl IngestWorker {
    /// Create a new worker.
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        processor: CaptureProcessor,
        config: WorkerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            jobs,
            processor: Arc::new(processor),
            config,
            event_tx,
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Get the pending job count.
    pub async fn pending_count(&self) -> Result<i64> {
        self.jobs.pending_count().await
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// Run the worker loop with concurrent job processing.
    ///
    /// Claims up to `max_concurrent_jobs` at a time and processes them
    /// concurrently; only sleeps when the queue is empty. The stalled-job
    /// sweep runs on its own interval inside the same loop.
    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Ingestion worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_jobs,
            "Ingestion worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let sweep_interval = Duration::from_secs(self.config.stall_sweep_secs);
        let mut last_sweep = Instant::now();

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Ingestion worker received shutdown signal");
                break;
            }

            if last_sweep.elapsed() >= sweep_interval {
                if let Err(e) = self.jobs.recover_stalled().await {
                    error!(error = ?e, "Stalled-job sweep failed");
                }
                last_sweep = Instant::now();
            }

            let mut claimed = 0;
            let mut tasks = tokio::task::JoinSet::new();

            for _ in 0..self.config.max_concurrent_jobs {
                match self.claim_job().await {
                    Some(job) => {
                        claimed += 1;
                        let worker = self.clone_refs();
                        tasks.spawn(async move {
                            worker.execute_job(job).await;
                        });
                    }
                    None => break,
                }
            }

            if claimed == 0 {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Ingestion worker received shutdown signal");
                        break;
                    }
                    _ = sleep(poll_interval) => {}
                }
            } else {
                debug!(claimed, "Processing concurrent job batch");
                while let Some(result) = tasks.join_next().await {
                    if let Err(e) = result {
                        error!(error = ?e, "Job task panicked");
                    }
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Ingestion worker stopped");
    }

    async fn claim_job(&self) -> Option<Job> {
        match self.jobs.claim_next().await {
            Ok(job) => job,
            Err(e) => {
                error!(error = ?e, "Failed to claim job");
                None
            }
        }
    }

    fn clone_refs(&self) -> WorkerRef {
        WorkerRef {
            jobs: self.jobs.clone(),
            processor: self.processor.clone(),
            event_tx: self.event_tx.clone(),
            lease_renew_secs: self.config.lease_renew_secs,
            job_timeout_secs: self.config.job_timeout_secs,
        }
    }
}

/// Lightweight reference bundle for executing a single job in a spawned
/// task.
struct WorkerRef {
    jobs: Arc<dyn JobRepository>,
    processor: Arc<CaptureProcessor>,
    event_tx: broadcast::Sender<WorkerEvent>,
    lease_renew_secs: u64,
    job_timeout_secs: u64,
}

impl WorkerRef {
    /// Execute one claimed job: renew its lease in the background, run
    /// the capture state machine under the job timeout, and record the
    /// terminal state.
    async fn execute_job(self, job: Job) {
        let start = Instant::now();
        let job_id = job.id;

        info!(job_id = %job_id, "Processing job");
        let _ = self.event_tx.send(WorkerEvent::JobStarted { job_id });

        let renew_jobs = self.jobs.clone();
        let renew_secs = self.lease_renew_secs;
        let renewal = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(renew_secs.max(1)));
            interval.tick().await; // first tick fires immediately
            loop {
                interval.tick().await;
                if let Err(e) = renew_jobs.renew_lease(job_id).await {
                    warn!(job_id = %job_id, error = %e, "Lease renewal failed");
                }
            }
        });

        let cancel = CancellationToken::new(self.jobs.clone(), job_id);
        let timeout = Duration::from_secs(self.job_timeout_secs);
        let outcome = tokio::time::timeout(timeout, self.processor.process(&job, &cancel)).await;

        renewal.abort();

        match outcome {
            Ok(Ok(CaptureOutcome::Completed { memory_id, merged })) => {
                if let Err(e) = self.jobs.complete(job_id).await {
                    error!(job_id = %job_id, error = ?e, "Failed to mark job as completed");
                } else {
                    info!(
                        job_id = %job_id,
                        memory_id = %memory_id,
                        merged,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Job completed"
                    );
                    let _ = self.event_tx.send(WorkerEvent::JobCompleted {
                        job_id,
                        memory_id,
                        merged,
                    });
                }
            }
            Ok(Ok(CaptureOutcome::Cancelled)) | Ok(Err(Error::Cancelled(_))) => {
                if let Err(e) = self.jobs.mark_cancelled(job_id).await {
                    error!(job_id = %job_id, error = ?e, "Failed to mark job as cancelled");
                } else {
                    info!(job_id = %job_id, "Job cancelled, discarded without retry");
                    let _ = self.event_tx.send(WorkerEvent::JobCancelled { job_id });
                }
            }
            Ok(Err(e)) => self.record_failure(job_id, e.to_string(), start).await,
            Err(_) => {
                warn!(
                    job_id = %job_id,
                    "Job exceeded timeout of {}s",
                    self.job_timeout_secs
                );
                self.record_failure(
                    job_id,
                    format!("Job exceeded timeout of {}s", self.job_timeout_secs),
                    start,
                )
                .await;
            }
        }
    }

    async fn record_failure(&self, job_id: Uuid, error: String, start: Instant) {
        if let Err(e) = self.jobs.fail(job_id, &error).await {
            error!(job_id = %job_id, error = ?e, "Failed to mark job as failed");
        } else {
            warn!(
                job_id = %job_id,
                %error,
                duration_ms = start.elapsed().as_millis() as u64,
                "Job failed"
            );
            let _ = self.event_tx.send(WorkerEvent::JobFailed { job_id, error });
        }
    }
}
