//! Queue wait estimation from recent execution times.
//!
//! Pure functions used by the job service's queue-info view.

/// Assumed execution time when no job has completed yet.
pub const DEFAULT_EXECUTION_SECS: f64 = 5.0;

/// Median of completed-job execution times, in seconds.
///
/// Uses the upper median for even-length input. Falls back to
/// [`DEFAULT_EXECUTION_SECS`] when `durations` is empty.
pub fn median_execution_secs(durations: &[f64]) -> f64 {
    if durations.is_empty() {
        return DEFAULT_EXECUTION_SECS;
    }
    let mut sorted = durations.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted[sorted.len() / 2]
}

/// Estimated seconds until a newly submitted job starts.
///
/// Queued and running jobs are split evenly across `active_workers`
/// (integer division), each taking `median_secs`.
pub fn estimate_wait_secs(pending: i64, processing: i64, active_workers: u32, median_secs: f64) -> i64 {
    let workers = i64::from(active_workers.max(1));
    let per_worker = (pending + processing).max(0) / workers;
    (per_worker as f64 * median_secs) as i64
}

/// Human-readable wait, e.g. `~ 2 min 5 sec` or `~ 40 sec`.
pub fn format_wait(secs: i64) -> String {
    if secs > 60 {
        format!("~ {} min {} sec", secs / 60, secs % 60)
    } else {
        format!("~ {secs} sec")
    }
}
