//! The claim/process loop run by each worker.

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use solver_db::repositories::JobRepo;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::processor::{JobOutcome, JobProcessor};

/// One worker: repeatedly claims the oldest pending job and drives it to a
/// terminal state.
///
/// Any number of runners, in one process or many, may share a database;
/// the claim protocol keeps them from ever processing the same job.
pub struct JobRunner {
    name: String,
    pool: PgPool,
    config: WorkerConfig,
    processor: JobProcessor,
}

impl JobRunner {
    pub fn new(name: impl Into<String>, pool: PgPool, config: WorkerConfig) -> Self {
        let processor = JobProcessor::new(pool.clone(), &config);
        Self {
            name: name.into(),
            pool,
            config,
            processor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Claim and process a single job.
    ///
    /// Returns `Ok(None)` when no job is pending.
    pub async fn run_once(&self) -> WorkerResult<Option<JobOutcome>> {
        let Some(job) = JobRepo::claim_next(&self.pool).await? else {
            return Ok(None);
        };

        tracing::info!(
            worker = %self.name,
            job_id = %job.id,
            kind = %job.kind,
            "Claimed job",
        );
        let job_id = job.id;
        let outcome = self.processor.process(job).await?;
        tracing::debug!(worker = %self.name, job_id = %job_id, ?outcome, "Job finished");
        Ok(Some(outcome))
    }

    /// Run until `cancel` fires.
    ///
    /// A job already being processed is finished before the loop observes
    /// the token; only the idle and back-off sleeps are cut short.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(worker = %self.name, "Worker started");

        while !cancel.is_cancelled() {
            let pause = match self.run_once().await {
                Ok(Some(_)) => continue,
                Ok(None) => self.config.idle_interval,
                Err(e) => {
                    tracing::error!(worker = %self.name, error = %e, "Worker iteration failed");
                    self.config.error_backoff
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        tracing::info!(worker = %self.name, "Worker stopped");
    }
}
