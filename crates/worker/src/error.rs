use solver_core::error::CoreError;

/// Error type for the job service and worker loop.
///
/// Computation failures never appear here: they are recorded on the job
/// itself. What remains is rejected submissions and store failures.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// A domain-level error from `solver_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Convenience type alias for service and worker return values.
pub type WorkerResult<T> = Result<T, WorkerError>;
