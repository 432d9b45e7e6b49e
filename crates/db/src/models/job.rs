//! Job entity models and DTOs for the solver queue.

use chrono::{SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use solver_core::job_input::JobInput;
use solver_core::types::{DbId, Timestamp};
use sqlx::FromRow;

use super::status::{JobStatus, StatusId};

/// A row from the `jobs` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub owner_id: DbId,
    pub kind: String,
    pub input: serde_json::Value,
    pub status_id: StatusId,
    pub progress_percent: i16,
    /// Success payload, present once `DONE`.
    pub result: Option<serde_json::Value>,
    /// Failure description for `ERROR`, or why a computation was cut short.
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub finished_at: Option<Timestamp>,
}

impl Job {
    /// Build a fresh `PENDING` job for `owner_id`.
    ///
    /// `created_at` is truncated to microseconds, the precision PostgreSQL
    /// stores, so a saved job compares equal to its reloaded row.
    pub fn new_pending(owner_id: DbId, input: &JobInput) -> Self {
        Self {
            id: uuid::Uuid::now_v7(),
            owner_id,
            kind: input.kind().to_string(),
            input: input.parameters(),
            status_id: JobStatus::Pending.id(),
            progress_percent: 0,
            result: None,
            error_message: None,
            created_at: Utc::now().trunc_subsecs(6),
            finished_at: None,
        }
    }

    /// Typed status; `None` only if the row holds an unknown status id.
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::from_id(self.status_id)
    }
}

/// History entry returned by owner listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub id: DbId,
    pub kind: String,
    pub status: Option<JobStatus>,
    pub progress_percent: i16,
    pub created_at: Timestamp,
    pub finished_at: Option<Timestamp>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            kind: job.kind.clone(),
            status: job.status(),
            progress_percent: job.progress_percent,
            created_at: job.created_at,
            finished_at: job.finished_at,
        }
    }
}

/// Query parameters for job listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobListQuery {
    /// Filter by status ID (e.g. 1 = pending, 6 = error).
    pub status_id: Option<StatusId>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

/// Row count for one status, from `GROUP BY status_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct StatusCount {
    pub status_id: StatusId,
    pub count: i64,
}
