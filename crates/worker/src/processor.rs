//! Per-job lifecycle: pre-start cancel check, strategy execution with
//! progress and cancel polling, post-computation check, terminal write.
//!
//! The strategy runs on tokio's blocking pool. Its progress reports cross
//! an unbounded channel to this task, which persists them; meanwhile the
//! job row is re-read every `cancel_poll_interval` and the strategy's
//! [`CancellationToken`] fires once a cancel request is seen.
//!
//! A store error after the claim must not strand the job in `PROCESSING`:
//! the processor keeps trying to record it as `ERROR`, sleeping
//! `error_backoff` between attempts, before handing the error back.

use std::time::Duration;

use solver_core::compute::ComputeError;
use solver_core::error::CoreError;
use solver_core::job_input::JobInput;
use solver_core::types::DbId;
use solver_db::models::job::Job;
use solver_db::models::status::JobStatus;
use solver_db::repositories::JobRepo;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Attempts at recording `ERROR` after a store error interrupted a job.
const FINALIZE_ATTEMPTS: u32 = 5;

/// Terminal state a processed job ended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Done,
    Failed,
    Cancelled,
    /// Another writer already finalized the job; nothing was written.
    Superseded,
}

/// Drives one claimed job to a terminal state.
#[derive(Debug, Clone)]
pub struct JobProcessor {
    pool: PgPool,
    cancel_poll_interval: Duration,
    error_backoff: Duration,
}

impl JobProcessor {
    pub fn new(pool: PgPool, config: &WorkerConfig) -> Self {
        Self {
            pool,
            cancel_poll_interval: config.cancel_poll_interval,
            error_backoff: config.error_backoff,
        }
    }

    /// Run the lifecycle protocol for a job this worker has claimed.
    ///
    /// Computation failures are recorded on the job and reported as
    /// [`JobOutcome::Failed`]; only store errors are returned as `Err`,
    /// after the job itself has been moved to a terminal state if the
    /// store came back in time.
    pub async fn process(&self, job: Job) -> WorkerResult<JobOutcome> {
        let id = job.id;
        match self.drive(job).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "Store error while processing job");
                self.abandon(id, &e).await;
                Err(e)
            }
        }
    }

    async fn drive(&self, job: Job) -> WorkerResult<JobOutcome> {
        let id = job.id;

        if self.cancel_requested(id).await? {
            JobRepo::mark_cancelled(&self.pool, id, true, None).await?;
            tracing::warn!(job_id = %id, "Job cancelled before computation start");
            return Ok(JobOutcome::Cancelled);
        }

        let parsed = JobInput::from_parts(&job.kind, &job.input)
            .and_then(|input| input.validate().map(|()| input));
        let input = match parsed {
            Ok(input) => input,
            Err(e) => {
                tracing::error!(job_id = %id, kind = %job.kind, error = %e, "Job input rejected");
                let detail = match e {
                    CoreError::Validation(detail) => detail,
                    other => other.to_string(),
                };
                let reason = ComputeError::InvalidInput(detail);
                return self.finish_failed(id, &reason.to_string()).await;
            }
        };

        tracing::info!(job_id = %id, kind = %job.kind, "Computation started");
        let computed = self.execute(id, input).await;

        if self.cancel_requested(id).await? {
            JobRepo::mark_cancelled(&self.pool, id, false, None).await?;
            tracing::warn!(job_id = %id, "Job cancelled during computation");
            return Ok(JobOutcome::Cancelled);
        }

        match computed {
            Ok(value) => self.finish_done(id, &value).await,
            Err(ComputeError::Cancelled) => {
                let message = ComputeError::Cancelled.to_string();
                self.finish_cancelled(id, &message).await
            }
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "Computation failed");
                self.finish_failed(id, &e.to_string()).await
            }
        }
    }

    /// Run the strategy on the blocking pool while persisting progress and
    /// watching for a cancel request.
    async fn execute(&self, id: DbId, input: JobInput) -> Result<serde_json::Value, ComputeError> {
        let token = CancellationToken::new();
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<u8>();

        let strategy_token = token.clone();
        let mut handle = tokio::task::spawn_blocking(move || {
            let mut sink = |percent: u8| {
                // The receiver only goes away once this task has finished.
                let _ = progress_tx.send(percent);
            };
            let cancel = || strategy_token.is_cancelled();
            input.execute(&mut sink, &cancel)
        });

        let mut poll = tokio::time::interval(self.cancel_poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        poll.tick().await;

        let joined = loop {
            tokio::select! {
                joined = &mut handle => break joined,
                Some(percent) = progress_rx.recv() => {
                    self.record_progress(id, percent).await;
                }
                _ = poll.tick(), if !token.is_cancelled() => {
                    match self.cancel_requested(id).await {
                        Ok(true) => {
                            tracing::info!(job_id = %id, "Cancel request observed, stopping computation");
                            token.cancel();
                        }
                        Ok(false) => {}
                        Err(e) => {
                            tracing::warn!(job_id = %id, error = %e, "Cancel poll failed");
                        }
                    }
                }
            }
        };

        // Persist whatever the strategy reported after the last poll.
        let mut last = None;
        while let Ok(percent) = progress_rx.try_recv() {
            last = Some(percent);
        }
        if let Some(percent) = last {
            self.record_progress(id, percent).await;
        }

        joined.unwrap_or_else(|e| {
            tracing::error!(job_id = %id, error = %e, "Computation task panicked");
            Err(ComputeError::Panicked(e.to_string()))
        })
    }

    /// Progress writes are best-effort; the terminal write reports failures.
    async fn record_progress(&self, id: DbId, percent: u8) {
        match JobRepo::update_progress(&self.pool, id, i16::from(percent)).await {
            Ok(_) => tracing::debug!(job_id = %id, percent, "Progress recorded"),
            Err(e) => tracing::warn!(job_id = %id, percent, error = %e, "Progress write failed"),
        }
    }

    async fn cancel_requested(&self, id: DbId) -> WorkerResult<bool> {
        let status = JobRepo::find_by_id(&self.pool, id)
            .await?
            .and_then(|job| job.status());
        Ok(status == Some(JobStatus::CancelRequested))
    }

    async fn finish_done(&self, id: DbId, result: &serde_json::Value) -> WorkerResult<JobOutcome> {
        if JobRepo::complete(&self.pool, id, result).await? {
            tracing::info!(job_id = %id, "Job completed successfully");
            return Ok(JobOutcome::Done);
        }
        self.resolve_lost_race(id).await
    }

    async fn finish_failed(&self, id: DbId, message: &str) -> WorkerResult<JobOutcome> {
        if JobRepo::fail(&self.pool, id, message).await? {
            tracing::info!(job_id = %id, message, "Job marked as failed");
            return Ok(JobOutcome::Failed);
        }
        self.resolve_lost_race(id).await
    }

    async fn finish_cancelled(&self, id: DbId, message: &str) -> WorkerResult<JobOutcome> {
        if JobRepo::mark_cancelled(&self.pool, id, false, Some(message)).await? {
            tracing::warn!(job_id = %id, "Computation stopped by cancellation signal");
            return Ok(JobOutcome::Cancelled);
        }
        tracing::error!(job_id = %id, "Job was finalized by another writer");
        Ok(JobOutcome::Superseded)
    }

    /// Record `ERROR` for a job whose protocol was cut short by a store
    /// error, retrying until the store answers or attempts run out.
    ///
    /// A job that has meanwhile moved to `CANCEL_REQUESTED` resolves to
    /// `CANCELLED`; one that is already terminal is left alone.
    async fn abandon(&self, id: DbId, cause: &WorkerError) {
        let message = format!("Job aborted: {cause}");
        for attempt in 1..=FINALIZE_ATTEMPTS {
            let settled = match JobRepo::fail(&self.pool, id, &message).await {
                Ok(true) => Ok(Some(JobStatus::Error)),
                Ok(false) => JobRepo::mark_cancelled(&self.pool, id, false, None)
                    .await
                    .map(|changed| changed.then_some(JobStatus::Cancelled)),
                Err(e) => Err(e),
            };
            match settled {
                Ok(Some(status)) => {
                    tracing::warn!(job_id = %id, %status, attempt, "Interrupted job finalized");
                    return;
                }
                Ok(None) => {
                    tracing::debug!(job_id = %id, "Interrupted job was already terminal");
                    return;
                }
                Err(e) => {
                    tracing::warn!(job_id = %id, attempt, error = %e, "Could not finalize interrupted job");
                }
            }
            if attempt < FINALIZE_ATTEMPTS {
                tokio::time::sleep(self.error_backoff).await;
            }
        }
        tracing::error!(job_id = %id, "Giving up on interrupted job, it stays PROCESSING");
    }

    /// A terminal write found the job no longer `PROCESSING`. A cancel
    /// request must have landed after the last check, so honour it.
    async fn resolve_lost_race(&self, id: DbId) -> WorkerResult<JobOutcome> {
        if JobRepo::mark_cancelled(&self.pool, id, false, None).await? {
            tracing::warn!(job_id = %id, "Cancel request arrived while finalizing");
            return Ok(JobOutcome::Cancelled);
        }
        tracing::error!(job_id = %id, "Job was finalized by another writer");
        Ok(JobOutcome::Superseded)
    }
}
