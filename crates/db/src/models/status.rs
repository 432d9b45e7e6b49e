//! Job status enum mapping to the `job_statuses` SMALLINT lookup table.
//!
//! Each variant's discriminant matches the seed data (1-based) in
//! `20260101000001_create_job_statuses_table.sql`.
//!
//! ```text
//! PENDING ──claim──▶ PROCESSING ──▶ DONE | ERROR | CANCELLED
//!                        │
//!                 request_cancel
//!                        ▼
//!                 CANCEL_REQUESTED ──▶ CANCELLED
//! ```

use serde::Serialize;

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

/// Job lifecycle status.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending = 1,
    Processing = 2,
    CancelRequested = 3,
    Done = 4,
    Cancelled = 5,
    Error = 6,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::CancelRequested,
        JobStatus::Done,
        JobStatus::Cancelled,
        JobStatus::Error,
    ];

    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Look up a status by its database ID.
    pub fn from_id(id: StatusId) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }

    /// The `job_statuses.name` seed value.
    pub fn name(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::CancelRequested => "CANCEL_REQUESTED",
            Self::Done => "DONE",
            Self::Cancelled => "CANCELLED",
            Self::Error => "ERROR",
        }
    }

    /// `DONE`, `CANCELLED` and `ERROR` are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Error)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, CancelRequested)
                | (Processing, Done)
                | (Processing, Error)
                | (Processing, Cancelled)
                | (CancelRequested, Cancelled)
        )
    }
}

impl From<JobStatus> for StatusId {
    fn from(value: JobStatus) -> Self {
        value as StatusId
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Statuses counted against an owner's active-job cap.
pub const ACTIVE_STATUSES: [StatusId; 3] = [
    JobStatus::Pending as StatusId,
    JobStatus::Processing as StatusId,
    JobStatus::CancelRequested as StatusId,
];
