//! Submission, status, history, cancellation and admin views over the
//! job queue.
//!
//! The service owns no state beyond the pool and the submission policy;
//! every call reads or writes the store directly.

use serde::Serialize;
use solver_core::error::CoreError;
use solver_core::job_input::JobInput;
use solver_core::queue_estimate::{estimate_wait_secs, format_wait, median_execution_secs};
use solver_core::submission::SubmitPolicy;
use solver_core::types::{DbId, Timestamp};
use solver_db::models::job::{Job, JobListQuery, JobSummary};
use solver_db::models::status::JobStatus;
use solver_db::repositories::JobRepo;
use sqlx::PgPool;

use crate::error::WorkerResult;

/// Completed jobs sampled for the median execution time.
const DURATION_SAMPLE_SIZE: i64 = 1000;

/// Status of a single job as shown to its owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    pub id: DbId,
    pub status: Option<JobStatus>,
    pub progress_percent: i16,
    /// The computed payload once `DONE`; the failure description once
    /// `ERROR`; otherwise `None`.
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub finished_at: Option<Timestamp>,
}

impl From<Job> for JobStatusView {
    fn from(job: Job) -> Self {
        let status = job.status();
        let result = match status {
            Some(JobStatus::Done) => job.result,
            Some(JobStatus::Error) => job.error_message.clone().map(serde_json::Value::String),
            _ => None,
        };
        Self {
            id: job.id,
            status,
            progress_percent: job.progress_percent,
            result,
            error: job.error_message,
            created_at: job.created_at,
            finished_at: job.finished_at,
        }
    }
}

/// Job counts per status across the whole queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub pending: i64,
    pub processing: i64,
    pub cancel_requested: i64,
    pub done: i64,
    pub cancelled: i64,
    pub error: i64,
    pub total: i64,
}

/// Queue depth and estimated wait for a newly submitted job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueInfo {
    pub pending_jobs: i64,
    pub processing_jobs: i64,
    pub median_execution_secs: f64,
    pub estimated_wait_secs: i64,
    /// e.g. `~ 2 min 5 sec`.
    pub estimated_wait: String,
}

/// Entry point for everything that is not a worker.
#[derive(Debug, Clone)]
pub struct JobService {
    pool: PgPool,
    policy: SubmitPolicy,
}

impl JobService {
    pub fn new(pool: PgPool, policy: SubmitPolicy) -> Self {
        Self { pool, policy }
    }

    // -----------------------------------------------------------------------
    // Submit
    // -----------------------------------------------------------------------

    /// Validate `input` and queue it as a `PENDING` job owned by `owner_id`.
    ///
    /// Invalid input and owners at their active-job cap are rejected
    /// before anything is written.
    pub async fn submit(&self, owner_id: DbId, input: JobInput) -> WorkerResult<DbId> {
        input.validate()?;

        let active = JobRepo::count_active_for_owner(&self.pool, owner_id).await?;
        self.policy.check_active_jobs(active)?;

        let job = JobRepo::save(&self.pool, &Job::new_pending(owner_id, &input)).await?;

        tracing::info!(
            job_id = %job.id,
            kind = %job.kind,
            owner_id = %owner_id,
            "Job submitted",
        );
        Ok(job.id)
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    pub async fn get_status(&self, job_id: DbId) -> WorkerResult<Option<JobStatusView>> {
        let job = JobRepo::find_by_id(&self.pool, job_id).await?;
        Ok(job.map(JobStatusView::from))
    }

    /// Like [`get_status`](Self::get_status), but only for the job's owner.
    ///
    /// Returns `NotFound` if the job does not exist and `Forbidden` if it
    /// belongs to someone else.
    pub async fn get_status_for_owner(
        &self,
        owner_id: DbId,
        job_id: DbId,
    ) -> WorkerResult<JobStatusView> {
        let job = JobRepo::find_by_id(&self.pool, job_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Job",
                id: job_id,
            })?;

        if job.owner_id != owner_id {
            return Err(CoreError::Forbidden("Cannot view another owner's job".into()).into());
        }

        Ok(job.into())
    }

    /// An owner's jobs, newest first.
    pub async fn list_history(
        &self,
        owner_id: DbId,
        query: &JobListQuery,
    ) -> WorkerResult<Vec<JobSummary>> {
        let jobs = JobRepo::list_by_owner(&self.pool, owner_id, query).await?;
        Ok(jobs.iter().map(JobSummary::from).collect())
    }

    // -----------------------------------------------------------------------
    // Cancel
    // -----------------------------------------------------------------------

    /// Ask the worker running `job_id` to stop.
    ///
    /// Only a `PROCESSING` job can be cancelled; returns `false` for any
    /// other state, including a missing job.
    pub async fn request_cancel(&self, job_id: DbId) -> WorkerResult<bool> {
        let accepted = JobRepo::request_cancel(&self.pool, job_id).await?;
        if accepted {
            tracing::info!(job_id = %job_id, "Cancel requested");
        } else {
            tracing::debug!(job_id = %job_id, "Cancel request ignored, job not processing");
        }
        Ok(accepted)
    }

    // -----------------------------------------------------------------------
    // Admin
    // -----------------------------------------------------------------------

    pub async fn admin_list_all(&self, query: &JobListQuery) -> WorkerResult<Vec<Job>> {
        Ok(JobRepo::list_all(&self.pool, query).await?)
    }

    pub async fn stats(&self) -> WorkerResult<JobStats> {
        let mut stats = JobStats::default();
        for row in JobRepo::count_by_status(&self.pool).await? {
            let slot = match JobStatus::from_id(row.status_id) {
                Some(JobStatus::Pending) => &mut stats.pending,
                Some(JobStatus::Processing) => &mut stats.processing,
                Some(JobStatus::CancelRequested) => &mut stats.cancel_requested,
                Some(JobStatus::Done) => &mut stats.done,
                Some(JobStatus::Cancelled) => &mut stats.cancelled,
                Some(JobStatus::Error) => &mut stats.error,
                None => {
                    tracing::warn!(status_id = row.status_id, "Unknown job status in stats");
                    stats.total += row.count;
                    continue;
                }
            };
            *slot += row.count;
            stats.total += row.count;
        }
        Ok(stats)
    }

    /// Queue depth plus a wait estimate assuming `active_workers` runners.
    pub async fn queue_info(&self, active_workers: u32) -> WorkerResult<QueueInfo> {
        let stats = self.stats().await?;
        let durations = JobRepo::completed_durations(&self.pool, DURATION_SAMPLE_SIZE).await?;

        let median = median_execution_secs(&durations);
        let wait = estimate_wait_secs(stats.pending, stats.processing, active_workers, median);

        Ok(QueueInfo {
            pending_jobs: stats.pending,
            processing_jobs: stats.processing,
            median_execution_secs: median,
            estimated_wait_secs: wait,
            estimated_wait: format_wait(wait),
        })
    }
}
