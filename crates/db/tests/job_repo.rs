//! Integration tests for the job store.
//!
//! Exercises `JobRepo` against a real database:
//! - Exclusive, FIFO, skip-locked claiming
//! - Cancel-request compare-and-set
//! - Idempotent upsert and once-only `finished_at`
//! - Conditional terminal writes and monotonic progress
//! - Listings and aggregate counts

use std::collections::HashSet;

use solver_core::job_input::{JobInput, NQueensInput};
use solver_core::types::DbId;
use solver_db::models::job::{Job, JobListQuery};
use solver_db::models::status::JobStatus;
use solver_db::repositories::JobRepo;
use sqlx::PgPool;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn queens(n: u32) -> JobInput {
    JobInput::NQueens(NQueensInput { n })
}

async fn submit(pool: &PgPool, owner_id: DbId, n: u32) -> Job {
    JobRepo::save(pool, &Job::new_pending(owner_id, &queens(n)))
        .await
        .unwrap()
}

async fn status_of(pool: &PgPool, id: DbId) -> JobStatus {
    JobRepo::find_by_id(pool, id)
        .await
        .unwrap()
        .and_then(|job| job.status())
        .expect("job should exist with a known status")
}

// ---------------------------------------------------------------------------
// Claiming
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_on_empty_queue_returns_none(pool: PgPool) {
    assert!(JobRepo::claim_next(&pool).await.unwrap().is_none());
    assert!(JobRepo::claim_next(&pool).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_flips_oldest_pending_to_processing(pool: PgPool) {
    let owner = Uuid::new_v4();
    let first = submit(&pool, owner, 4).await;
    let second = submit(&pool, owner, 5).await;

    let claimed = JobRepo::claim_next(&pool).await.unwrap().unwrap();
    assert_eq!(claimed.id, first.id);
    assert_eq!(claimed.status(), Some(JobStatus::Processing));
    assert_eq!(status_of(&pool, first.id).await, JobStatus::Processing);
    assert_eq!(status_of(&pool, second.id).await, JobStatus::Pending);

    let next = JobRepo::claim_next(&pool).await.unwrap().unwrap();
    assert_eq!(next.id, second.id);
    assert!(JobRepo::claim_next(&pool).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn concurrent_claims_never_share_a_job(pool: PgPool) {
    let owner = Uuid::new_v4();
    let mut submitted = HashSet::new();
    for n in 1..=10 {
        submitted.insert(submit(&pool, owner, n).await.id);
    }

    let mut handles = Vec::new();
    for _ in 0..25 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            JobRepo::claim_next(&pool).await.unwrap().map(|job| job.id)
        }));
    }

    let mut claimed = Vec::new();
    for handle in handles {
        if let Some(id) = handle.await.unwrap() {
            claimed.push(id);
        }
    }

    let unique: HashSet<_> = claimed.iter().copied().collect();
    assert_eq!(claimed.len(), unique.len(), "a job was claimed twice");
    assert_eq!(unique, submitted);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_skips_rows_locked_by_another_transaction(pool: PgPool) {
    let owner = Uuid::new_v4();
    let locked = submit(&pool, owner, 4).await;
    let free = submit(&pool, owner, 5).await;

    let mut other = pool.begin().await.unwrap();
    sqlx::query("SELECT id FROM jobs WHERE id = $1 FOR UPDATE")
        .bind(locked.id)
        .execute(&mut *other)
        .await
        .unwrap();

    let claimed = JobRepo::claim_next(&pool).await.unwrap().unwrap();
    assert_eq!(claimed.id, free.id);

    other.rollback().await.unwrap();
    assert_eq!(status_of(&pool, locked.id).await, JobStatus::Pending);
}

// ---------------------------------------------------------------------------
// Cancel requests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn cancel_request_rejected_while_pending(pool: PgPool) {
    let job = submit(&pool, Uuid::new_v4(), 8).await;

    assert!(!JobRepo::request_cancel(&pool, job.id).await.unwrap());

    let reloaded = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(reloaded, job);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn cancel_request_accepted_while_processing(pool: PgPool) {
    let job = submit(&pool, Uuid::new_v4(), 8).await;
    JobRepo::claim_next(&pool).await.unwrap().unwrap();

    assert!(JobRepo::request_cancel(&pool, job.id).await.unwrap());
    assert_eq!(status_of(&pool, job.id).await, JobStatus::CancelRequested);

    // A second request finds it no longer PROCESSING.
    assert!(!JobRepo::request_cancel(&pool, job.id).await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn cancel_request_rejected_once_done(pool: PgPool) {
    let job = submit(&pool, Uuid::new_v4(), 8).await;
    JobRepo::claim_next(&pool).await.unwrap().unwrap();
    assert!(JobRepo::complete(&pool, job.id, &serde_json::json!(92)).await.unwrap());
    let done = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();

    assert!(!JobRepo::request_cancel(&pool, job.id).await.unwrap());
    assert_eq!(JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap(), done);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn cancel_request_on_missing_job_is_false(pool: PgPool) {
    assert!(!JobRepo::request_cancel(&pool, Uuid::new_v4()).await.unwrap());
}

// ---------------------------------------------------------------------------
// Save
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn save_is_idempotent(pool: PgPool) {
    let job = Job::new_pending(Uuid::new_v4(), &queens(6));

    let first = JobRepo::save(&pool, &job).await.unwrap();
    let second = JobRepo::save(&pool, &job).await.unwrap();

    assert_eq!(first, job);
    assert_eq!(second, job);
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn save_updates_mutable_fields_only(pool: PgPool) {
    let job = submit(&pool, Uuid::new_v4(), 6).await;

    let mut changed = job.clone();
    changed.progress_percent = 40;
    changed.kind = "linear_system".to_string();
    changed.owner_id = Uuid::new_v4();

    let saved = JobRepo::save(&pool, &changed).await.unwrap();
    assert_eq!(saved.progress_percent, 40);
    assert_eq!(saved.kind, job.kind);
    assert_eq!(saved.owner_id, job.owner_id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn finished_at_is_set_once(pool: PgPool) {
    let job = submit(&pool, Uuid::new_v4(), 6).await;
    JobRepo::claim_next(&pool).await.unwrap().unwrap();
    JobRepo::complete(&pool, job.id, &serde_json::json!(4)).await.unwrap();
    let done = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    let finished_at = done.finished_at.expect("finished_at set on completion");

    let mut resaved = done.clone();
    resaved.finished_at = Some(finished_at + chrono::Duration::hours(1));
    let after = JobRepo::save(&pool, &resaved).await.unwrap();
    assert_eq!(after.finished_at, Some(finished_at));
}

// ---------------------------------------------------------------------------
// Progress and terminal writes
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn progress_never_decreases(pool: PgPool) {
    let job = submit(&pool, Uuid::new_v4(), 8).await;
    JobRepo::claim_next(&pool).await.unwrap().unwrap();

    assert!(JobRepo::update_progress(&pool, job.id, 40).await.unwrap());
    assert!(JobRepo::update_progress(&pool, job.id, 20).await.unwrap());

    let reloaded = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(reloaded.progress_percent, 40);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn progress_ignored_unless_running(pool: PgPool) {
    let job = submit(&pool, Uuid::new_v4(), 8).await;
    assert!(!JobRepo::update_progress(&pool, job.id, 30).await.unwrap());
    assert_eq!(
        JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap().progress_percent,
        0
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn progress_write_keeps_cancel_request(pool: PgPool) {
    let job = submit(&pool, Uuid::new_v4(), 8).await;
    JobRepo::claim_next(&pool).await.unwrap().unwrap();
    JobRepo::request_cancel(&pool, job.id).await.unwrap();

    assert!(JobRepo::update_progress(&pool, job.id, 60).await.unwrap());
    assert_eq!(status_of(&pool, job.id).await, JobStatus::CancelRequested);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn complete_sets_result_and_full_progress(pool: PgPool) {
    let job = submit(&pool, Uuid::new_v4(), 8).await;
    JobRepo::claim_next(&pool).await.unwrap().unwrap();

    assert!(JobRepo::complete(&pool, job.id, &serde_json::json!(92)).await.unwrap());

    let done = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(done.status(), Some(JobStatus::Done));
    assert_eq!(done.progress_percent, 100);
    assert_eq!(done.result, Some(serde_json::json!(92)));
    assert!(done.finished_at.is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn complete_loses_to_cancel_request(pool: PgPool) {
    let job = submit(&pool, Uuid::new_v4(), 8).await;
    JobRepo::claim_next(&pool).await.unwrap().unwrap();
    JobRepo::request_cancel(&pool, job.id).await.unwrap();

    assert!(!JobRepo::complete(&pool, job.id, &serde_json::json!(92)).await.unwrap());
    assert!(!JobRepo::fail(&pool, job.id, "boom").await.unwrap());
    assert_eq!(status_of(&pool, job.id).await, JobStatus::CancelRequested);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn fail_records_message(pool: PgPool) {
    let job = submit(&pool, Uuid::new_v4(), 8).await;
    JobRepo::claim_next(&pool).await.unwrap().unwrap();

    assert!(JobRepo::fail(&pool, job.id, "Matrix is singular").await.unwrap());

    let failed = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(failed.status(), Some(JobStatus::Error));
    assert_eq!(failed.error_message.as_deref(), Some("Matrix is singular"));
    assert!(failed.result.is_none());
    assert!(failed.finished_at.is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn mark_cancelled_resets_or_keeps_progress(pool: PgPool) {
    let owner = Uuid::new_v4();
    let early = submit(&pool, owner, 8).await;
    let late = submit(&pool, owner, 9).await;
    JobRepo::claim_next(&pool).await.unwrap().unwrap();
    JobRepo::claim_next(&pool).await.unwrap().unwrap();
    JobRepo::update_progress(&pool, early.id, 30).await.unwrap();
    JobRepo::update_progress(&pool, late.id, 30).await.unwrap();

    assert!(JobRepo::mark_cancelled(&pool, early.id, true, None).await.unwrap());
    assert!(JobRepo::mark_cancelled(&pool, late.id, false, Some("stopped")).await.unwrap());

    let early = JobRepo::find_by_id(&pool, early.id).await.unwrap().unwrap();
    let late = JobRepo::find_by_id(&pool, late.id).await.unwrap().unwrap();
    assert_eq!(early.status(), Some(JobStatus::Cancelled));
    assert_eq!(early.progress_percent, 0);
    assert_eq!(late.progress_percent, 30);
    assert_eq!(late.error_message.as_deref(), Some("stopped"));

    // Terminal: a second cancellation is a no-op.
    assert!(!JobRepo::mark_cancelled(&pool, late.id, true, None).await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn mark_cancelled_rejected_while_pending(pool: PgPool) {
    let job = submit(&pool, Uuid::new_v4(), 8).await;
    assert!(!JobRepo::mark_cancelled(&pool, job.id, true, None).await.unwrap());
    assert_eq!(status_of(&pool, job.id).await, JobStatus::Pending);
}

// ---------------------------------------------------------------------------
// Listings and aggregates
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn list_by_owner_is_newest_first_and_scoped(pool: PgPool) {
    let owner = Uuid::new_v4();
    let other = Uuid::new_v4();
    let a = submit(&pool, owner, 4).await;
    let b = submit(&pool, owner, 5).await;
    submit(&pool, other, 6).await;

    let jobs = JobRepo::list_by_owner(&pool, owner, &JobListQuery::default())
        .await
        .unwrap();
    let ids: Vec<_> = jobs.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![b.id, a.id]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn list_by_owner_combines_owner_and_status_filters(pool: PgPool) {
    let owner = Uuid::new_v4();
    let other = Uuid::new_v4();
    let running = submit(&pool, owner, 4).await;
    submit(&pool, other, 5).await;
    submit(&pool, owner, 6).await;
    // Claims `running` (owner) then the other owner's job.
    JobRepo::claim_next(&pool).await.unwrap().unwrap();
    JobRepo::claim_next(&pool).await.unwrap().unwrap();

    let jobs = JobRepo::list_by_owner(
        &pool,
        owner,
        &JobListQuery {
            status_id: Some(JobStatus::Processing.id()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let ids: Vec<_> = jobs.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![running.id]);

    let clamped = JobRepo::list_by_owner(
        &pool,
        owner,
        &JobListQuery {
            limit: Some(0),
            offset: Some(-5),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(clamped.len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn list_all_filters_and_paginates(pool: PgPool) {
    let owner = Uuid::new_v4();
    for n in 1..=4 {
        submit(&pool, owner, n).await;
    }
    JobRepo::claim_next(&pool).await.unwrap().unwrap();

    let all = JobRepo::list_all(&pool, &JobListQuery::default()).await.unwrap();
    assert_eq!(all.len(), 4);
    assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));

    let processing = JobRepo::list_all(
        &pool,
        &JobListQuery {
            status_id: Some(JobStatus::Processing.id()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(processing.len(), 1);

    let page = JobRepo::list_all(
        &pool,
        &JobListQuery {
            limit: Some(2),
            offset: Some(1),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].id, all[1].id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn counts_by_status_and_active_for_owner(pool: PgPool) {
    let owner = Uuid::new_v4();
    let first = submit(&pool, owner, 4).await;
    submit(&pool, owner, 5).await;
    submit(&pool, Uuid::new_v4(), 6).await;
    JobRepo::claim_next(&pool).await.unwrap().unwrap();
    JobRepo::complete(&pool, first.id, &serde_json::json!(2)).await.unwrap();

    let counts = JobRepo::count_by_status(&pool).await.unwrap();
    let count_for = |status: JobStatus| {
        counts
            .iter()
            .find(|c| c.status_id == status.id())
            .map_or(0, |c| c.count)
    };
    assert_eq!(count_for(JobStatus::Pending), 2);
    assert_eq!(count_for(JobStatus::Done), 1);
    assert_eq!(count_for(JobStatus::Processing), 0);

    assert_eq!(JobRepo::count_active_for_owner(&pool, owner).await.unwrap(), 1);

    let durations = JobRepo::completed_durations(&pool, 10).await.unwrap();
    assert_eq!(durations.len(), 1);
    assert!(durations[0] >= 0.0);
}
