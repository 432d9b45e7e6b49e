//! Limits applied when an owner submits a job.

use crate::error::CoreError;

/// Default cap on jobs an owner may have queued or running at once.
pub const DEFAULT_MAX_ACTIVE_JOBS_PER_OWNER: i64 = 5;

/// Submission limits enforced by the job service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitPolicy {
    pub max_active_jobs_per_owner: i64,
}

impl Default for SubmitPolicy {
    fn default() -> Self {
        Self {
            max_active_jobs_per_owner: DEFAULT_MAX_ACTIVE_JOBS_PER_OWNER,
        }
    }
}

impl SubmitPolicy {
    /// Reject a submission when the owner already has `active` unfinished jobs
    /// at or above the cap.
    pub fn check_active_jobs(&self, active: i64) -> Result<(), CoreError> {
        if active >= self.max_active_jobs_per_owner {
            return Err(CoreError::Conflict(format!(
                "Maximum number of active jobs ({}) reached; wait for existing jobs to finish",
                self.max_active_jobs_per_owner
            )));
        }
        Ok(())
    }
}
