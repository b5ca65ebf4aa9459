//! Integration tests for queue lifecycle operations: claiming,
//! cancellation, retry, and event-log replay.

mod common;

use std::sync::Arc;

use common::{assignment_params, services, MockGenerator};
use coursecraft_core::job_events::KIND_STEP;
use coursecraft_db::models::event::NewJobEvent;
use coursecraft_db::models::status::JobStatus;
use coursecraft_db::repositories::{EventRepo, JobRepo};
use coursecraft_worker::queue::CANCELLED_MESSAGE;
use coursecraft_worker::JobQueue;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Test: concurrent claims are mutually exclusive
// ---------------------------------------------------------------------------

/// Two workers racing to claim the same job: exactly one wins, the other
/// gets `None` and must skip.
#[sqlx::test(migrations = "../../db/migrations")]
async fn concurrent_claims_allow_exactly_one_winner(pool: PgPool) {
    let queue_a = JobQueue::new(pool.clone());
    let queue_b = JobQueue::new(pool.clone());

    let job = queue_a.enqueue(1, &assignment_params()).await.unwrap();

    let (a, b) = tokio::join!(
        queue_a.claim(job.id, "worker-a"),
        queue_b.claim(job.id, "worker-b"),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert!(a.is_some() != b.is_some(), "exactly one claim must succeed");

    let row = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(row.status_id, JobStatus::Processing.id());
    assert!(row.locked_by.is_some());
}

// ---------------------------------------------------------------------------
// Test: claims on terminal jobs are rejected
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_on_terminal_job_returns_none(pool: PgPool) {
    let queue = JobQueue::new(pool.clone());
    let job = queue.enqueue(1, &assignment_params()).await.unwrap();

    JobRepo::update_status(&pool, job.id, JobStatus::Completed)
        .await
        .unwrap();

    let claimed = queue.claim(job.id, "worker-a").await.unwrap();
    assert!(claimed.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_on_already_locked_job_returns_none(pool: PgPool) {
    let queue = JobQueue::new(pool.clone());
    let job = queue.enqueue(1, &assignment_params()).await.unwrap();

    assert!(queue.claim(job.id, "worker-a").await.unwrap().is_some());
    // Still `Processing` and locked: a second claim must skip.
    assert!(queue.claim(job.id, "worker-b").await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Test: cancellation
// ---------------------------------------------------------------------------

/// Cancelling a queued job marks it failed with the cancellation message
/// and releases any lock; a second cancel is a no-op.
#[sqlx::test(migrations = "../../db/migrations")]
async fn cancel_marks_job_failed_with_message(pool: PgPool) {
    let queue = JobQueue::new(pool.clone());
    let job = queue.enqueue(1, &assignment_params()).await.unwrap();

    assert!(queue.cancel_job(job.id).await.unwrap());

    let row = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(row.status_id, JobStatus::Failed.id());
    assert_eq!(row.error_message.as_deref(), Some(CANCELLED_MESSAGE));
    assert!(row.locked_by.is_none());

    // Already terminal: nothing left to cancel.
    assert!(!queue.cancel_job(job.id).await.unwrap());
}

/// Cancelling a claimed job trips the process-local token so the running
/// driver observes it at its next event boundary.
#[sqlx::test(migrations = "../../db/migrations")]
async fn cancel_trips_the_local_token(pool: PgPool) {
    let queue = JobQueue::new(pool.clone());
    let job = queue.enqueue(1, &assignment_params()).await.unwrap();
    queue.claim(job.id, "worker-a").await.unwrap().unwrap();

    let token = queue.cancellation_for(job.id);
    assert!(!token.is_cancelled());

    queue.cancel_job(job.id).await.unwrap();
    assert!(token.is_cancelled());
}

// ---------------------------------------------------------------------------
// Test: retry
// ---------------------------------------------------------------------------

/// Retry resets status/step/lock/error but keeps previously generated
/// content for the next run to overwrite.
#[sqlx::test(migrations = "../../db/migrations")]
async fn retry_resets_job_but_keeps_content(pool: PgPool) {
    let queue = JobQueue::new(pool.clone());
    let job = queue.enqueue(1, &assignment_params()).await.unwrap();
    queue.claim(job.id, "worker-a").await.unwrap().unwrap();

    sqlx::query("UPDATE jobs SET content = 'partial draft', current_step = 2 WHERE id = $1")
        .bind(job.id)
        .execute(&pool)
        .await
        .unwrap();
    JobRepo::mark_failed(&pool, job.id, "generation backend unavailable")
        .await
        .unwrap();

    assert!(queue.retry_job(job.id).await.unwrap());

    let row = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(row.status_id, JobStatus::Queued.id());
    assert_eq!(row.current_step, 0);
    assert!(row.locked_by.is_none());
    assert!(row.error_message.is_none());
    assert_eq!(row.content.as_deref(), Some("partial draft"));
}

/// Retry refuses jobs that are not terminal.
#[sqlx::test(migrations = "../../db/migrations")]
async fn retry_rejects_non_terminal_jobs(pool: PgPool) {
    let queue = JobQueue::new(pool.clone());
    let job = queue.enqueue(1, &assignment_params()).await.unwrap();
    assert!(!queue.retry_job(job.id).await.unwrap());
}

// ---------------------------------------------------------------------------
// Test: staleness sweep contract
// ---------------------------------------------------------------------------

/// An abandoned `processing` job is returned to the queue once its last
/// write falls behind the cutoff; the conditional update leaves fresher
/// rows alone.
#[sqlx::test(migrations = "../../db/migrations")]
async fn stale_processing_job_can_be_requeued(pool: PgPool) {
    let queue = JobQueue::new(pool.clone());
    let job = queue.enqueue(1, &assignment_params()).await.unwrap();
    queue.claim(job.id, "worker-a").await.unwrap().unwrap();

    // Cutoff in the past: the job is fresh, nothing to do.
    let old_cutoff = chrono::Utc::now() - chrono::Duration::minutes(15);
    assert!(!JobRepo::requeue_stale(&pool, job.id, old_cutoff).await.unwrap());

    // Cutoff ahead of the row's last write: the job counts as stale.
    let future_cutoff = chrono::Utc::now() + chrono::Duration::seconds(5);
    assert!(JobRepo::requeue_stale(&pool, job.id, future_cutoff).await.unwrap());

    let row = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(row.status_id, JobStatus::Queued.id());
    assert!(row.locked_by.is_none());
}

// ---------------------------------------------------------------------------
// Test: event-log replay
// ---------------------------------------------------------------------------

/// Progress is reconstructed from the ordered event log: the highest
/// step over the mode's plan length, and the agent of the last event.
#[sqlx::test(migrations = "../../db/migrations")]
async fn job_status_replays_the_event_log(pool: PgPool) {
    let generator = Arc::new(MockGenerator::default());
    let (queue, _runner) = services(pool.clone(), generator);
    let job = queue.enqueue(1, &assignment_params()).await.unwrap();

    for (step, agent) in [(1, "analyzer"), (2, "drafter")] {
        EventRepo::insert(
            &pool,
            job.id,
            &NewJobEvent::new(KIND_STEP, agent, "step_started", format!("{agent} started"))
                .with_metadata(serde_json::json!({ "step": step, "cost_usd": 0.02 })),
        )
        .await
        .unwrap();
    }

    let progress = queue.job_status(job.id).await.unwrap().unwrap();
    // 2 of 5 assignment steps.
    assert_eq!(progress.progress_percent, 40);
    assert_eq!(progress.current_agent.as_deref(), Some("drafter"));
    assert!((progress.estimated_cost - 0.04).abs() < 1e-9);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn job_status_for_unknown_job_is_none(pool: PgPool) {
    let queue = JobQueue::new(pool);
    assert!(queue.job_status(424242).await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Test: owner-scoped listing
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn listing_filters_by_owner_and_status(pool: PgPool) {
    let queue = JobQueue::new(pool.clone());
    let mine = queue.enqueue(1, &assignment_params()).await.unwrap();
    queue.enqueue(2, &assignment_params()).await.unwrap();

    let all_mine = JobRepo::list_by_owner(&pool, 1, &Default::default())
        .await
        .unwrap();
    assert_eq!(all_mine.len(), 1);
    assert_eq!(all_mine[0].id, mine.id);

    let failed_mine = JobRepo::list_by_owner(
        &pool,
        1,
        &coursecraft_db::models::job::JobListQuery {
            status_id: Some(JobStatus::Failed.id()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(failed_mine.is_empty());
}
