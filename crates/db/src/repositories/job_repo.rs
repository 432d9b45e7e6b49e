//! Repository for the `jobs` table.
//!
//! Every status change is a conditional `UPDATE` keyed on the current
//! status, so concurrent workers and cancel requests cannot move a job
//! backwards through its lifecycle.

use solver_core::types::DbId;
use sqlx::PgPool;

use crate::models::job::{Job, JobListQuery, StatusCount};
use crate::models::status::{JobStatus, ACTIVE_STATUSES};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, owner_id, kind, input, status_id, progress_percent, \
    result, error_message, created_at, finished_at";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Provides the job store operations used by submitters and workers.
pub struct JobRepo;

impl JobRepo {
    /// Atomically claim the oldest pending job.
    ///
    /// The candidate row is selected with `FOR UPDATE SKIP LOCKED`, so
    /// concurrent claimers each walk past rows another transaction holds
    /// and never wait on each other. The flip to `PROCESSING` commits in
    /// the same transaction; any error drops the transaction uncommitted
    /// and the job stays `PENDING`.
    pub async fn claim_next(pool: &PgPool) -> Result<Option<Job>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let select = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE status_id = $1 \
             ORDER BY created_at ASC \
             LIMIT 1 \
             FOR UPDATE SKIP LOCKED"
        );
        let candidate = sqlx::query_as::<_, Job>(&select)
            .bind(JobStatus::Pending.id())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(candidate) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        let update = format!(
            "UPDATE jobs SET status_id = $2 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let claimed = sqlx::query_as::<_, Job>(&update)
            .bind(candidate.id)
            .bind(JobStatus::Processing.id())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::debug!(job_id = %claimed.id, "Claimed pending job");
        Ok(Some(claimed))
    }

    /// Insert the job, or update its mutable fields if it already exists.
    ///
    /// Identity, owner, kind, input and `created_at` are never touched on
    /// conflict, and a `finished_at` already recorded is kept.
    pub async fn save(pool: &PgPool, job: &Job) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs \
                 (id, owner_id, kind, input, status_id, progress_percent, \
                  result, error_message, created_at, finished_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO UPDATE SET \
                 status_id = EXCLUDED.status_id, \
                 progress_percent = EXCLUDED.progress_percent, \
                 result = EXCLUDED.result, \
                 error_message = EXCLUDED.error_message, \
                 finished_at = COALESCE(jobs.finished_at, EXCLUDED.finished_at) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(job.id)
            .bind(job.owner_id)
            .bind(&job.kind)
            .bind(&job.input)
            .bind(job.status_id)
            .bind(job.progress_percent)
            .bind(&job.result)
            .bind(&job.error_message)
            .bind(job.created_at)
            .bind(job.finished_at)
            .fetch_one(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Ask the owning worker to stop a running job.
    ///
    /// Compare-and-set: only a `PROCESSING` job moves to
    /// `CANCEL_REQUESTED`. Returns `false` and leaves the row untouched in
    /// every other state.
    pub async fn request_cancel(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET status_id = $2 \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(JobStatus::CancelRequested.id())
        .bind(JobStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Raise the job's progress to `percent` (never lowers it).
    ///
    /// Only applies while the job is running; the status column is left
    /// alone so a concurrent cancel request survives.
    pub async fn update_progress(pool: &PgPool, id: DbId, percent: i16) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET progress_percent = GREATEST(progress_percent, $2) \
             WHERE id = $1 AND status_id IN ($3, $4)",
        )
        .bind(id)
        .bind(percent.clamp(0, 100))
        .bind(JobStatus::Processing.id())
        .bind(JobStatus::CancelRequested.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a running job as done with its result payload.
    ///
    /// Returns `false` if the job is no longer `PROCESSING` (e.g. a cancel
    /// request landed first).
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        result: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let outcome = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, result = $3, error_message = NULL, \
                 progress_percent = 100, finished_at = COALESCE(finished_at, NOW()) \
             WHERE id = $1 AND status_id = $4",
        )
        .bind(id)
        .bind(JobStatus::Done.id())
        .bind(result)
        .bind(JobStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(outcome.rows_affected() > 0)
    }

    /// Mark a running job as failed with a human-readable description.
    ///
    /// Returns `false` if the job is no longer `PROCESSING`.
    pub async fn fail(pool: &PgPool, id: DbId, message: &str) -> Result<bool, sqlx::Error> {
        let outcome = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, error_message = $3, \
                 finished_at = COALESCE(finished_at, NOW()) \
             WHERE id = $1 AND status_id = $4",
        )
        .bind(id)
        .bind(JobStatus::Error.id())
        .bind(message)
        .bind(JobStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(outcome.rows_affected() > 0)
    }

    /// Resolve a running or cancel-requested job to `CANCELLED`.
    ///
    /// With `reset_progress` the progress drops to 0 (cancelled before any
    /// work ran); otherwise the value reached so far is kept.
    pub async fn mark_cancelled(
        pool: &PgPool,
        id: DbId,
        reset_progress: bool,
        message: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let outcome = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, \
                 progress_percent = CASE WHEN $3 THEN 0 ELSE progress_percent END, \
                 error_message = $4, \
                 finished_at = COALESCE(finished_at, NOW()) \
             WHERE id = $1 AND status_id IN ($5, $6)",
        )
        .bind(id)
        .bind(JobStatus::Cancelled.id())
        .bind(reset_progress)
        .bind(message)
        .bind(JobStatus::Processing.id())
        .bind(JobStatus::CancelRequested.id())
        .execute(pool)
        .await?;
        Ok(outcome.rows_affected() > 0)
    }

    /// List jobs for one owner, newest first.
    pub async fn list_by_owner(
        pool: &PgPool,
        owner_id: DbId,
        params: &JobListQuery,
    ) -> Result<Vec<Job>, sqlx::Error> {
        Self::list_jobs(pool, Some(owner_id), params).await
    }

    /// List all jobs (admin view), newest first.
    pub async fn list_all(pool: &PgPool, params: &JobListQuery) -> Result<Vec<Job>, sqlx::Error> {
        Self::list_jobs(pool, None, params).await
    }

    /// Number of jobs per status. Statuses with no jobs are absent.
    pub async fn count_by_status(pool: &PgPool) -> Result<Vec<StatusCount>, sqlx::Error> {
        sqlx::query_as::<_, StatusCount>(
            "SELECT status_id, COUNT(*) AS count FROM jobs \
             GROUP BY status_id ORDER BY status_id",
        )
        .fetch_all(pool)
        .await
    }

    /// Number of unfinished jobs an owner has queued or running.
    pub async fn count_active_for_owner(pool: &PgPool, owner_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM jobs WHERE owner_id = $1 AND status_id = ANY($2)",
        )
        .bind(owner_id)
        .bind(&ACTIVE_STATUSES[..])
        .fetch_one(pool)
        .await
    }

    /// Seconds from creation to completion of the most recent `DONE` jobs.
    pub async fn completed_durations(pool: &PgPool, limit: i64) -> Result<Vec<f64>, sqlx::Error> {
        sqlx::query_scalar::<_, f64>(
            "SELECT EXTRACT(EPOCH FROM finished_at - created_at)::DOUBLE PRECISION \
             FROM jobs \
             WHERE status_id = $1 AND finished_at IS NOT NULL \
             ORDER BY finished_at DESC \
             LIMIT $2",
        )
        .bind(JobStatus::Done.id())
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Newest-first page of jobs, optionally scoped to one owner and one
    /// status. A `NULL` filter matches every row.
    async fn list_jobs(
        pool: &PgPool,
        owner_id: Option<DbId>,
        params: &JobListQuery,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE ($1::UUID IS NULL OR owner_id = $1) \
               AND ($2::SMALLINT IS NULL OR status_id = $2) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(owner_id)
            .bind(params.status_id)
            .bind(params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT))
            .bind(params.offset.unwrap_or(0).max(0))
            .fetch_all(pool)
            .await
    }
}
