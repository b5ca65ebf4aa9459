//! Repository for the `jobs` table.
//!
//! Uses `JobStatus` from `models::status` for all status transitions.
//! The conditional claim update is the sole cross-process concurrency
//! control: there is no lock service and no lease renewal.

use coursecraft_core::content::JobParams;
use coursecraft_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::job::{Job, JobListQuery, JobResult};
use crate::models::status::JobStatus;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, owner_id, topic, subtopics, mode, transcript, assignment_counts, \
    status_id, current_step, locked_by, \
    content, side_results, gap_analysis, estimated_cost, error_message, \
    created_at, updated_at";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Provides CRUD and lifecycle operations for content-generation jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new queued job at step 0, returning the created row.
    ///
    /// When item counts were requested, `side_results` starts in the
    /// pre-run `{"counts": ...}` shape; a successful format step later
    /// replaces it with the post-run `{"formatted": ...}` shape.
    pub async fn enqueue(
        pool: &PgPool,
        owner_id: DbId,
        params: &JobParams,
    ) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs \
                 (owner_id, topic, subtopics, mode, transcript, assignment_counts, \
                  side_results, status_id, current_step) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(owner_id)
            .bind(&params.topic)
            .bind(serde_json::json!(params.subtopics))
            .bind(params.mode.as_str())
            .bind(&params.transcript)
            .bind(params.assignment_counts.map(|c| serde_json::json!(c)))
            .bind(
                params
                    .assignment_counts
                    .map(|c| serde_json::json!({ "counts": c })),
            )
            .bind(JobStatus::Queued.id())
            .fetch_one(pool)
            .await
    }

    /// Atomically claim a job for a worker.
    ///
    /// The update only succeeds when the row is still `Queued` or
    /// `Processing` AND unlocked; anything else returns `None`, which
    /// callers must treat as "skip, not an error". Two concurrent claims
    /// on the same id cannot both match the `locked_by IS NULL` guard.
    pub async fn claim(
        pool: &PgPool,
        job_id: DbId,
        worker: &str,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status_id = $2, locked_by = $3, updated_at = NOW() \
             WHERE id = $1 \
               AND status_id IN ($4, $5) \
               AND locked_by IS NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(job_id)
            .bind(JobStatus::Processing.id())
            .bind(worker)
            .bind(JobStatus::Queued.id())
            .bind(JobStatus::Processing.id())
            .fetch_optional(pool)
            .await
    }

    /// Update a job's status.
    ///
    /// Terminal statuses unconditionally clear `locked_by` so a normal
    /// completion or failure never leaves the row permanently locked.
    pub async fn update_status(
        pool: &PgPool,
        job_id: DbId,
        status: JobStatus,
    ) -> Result<(), sqlx::Error> {
        let query = if status.is_terminal() {
            "UPDATE jobs SET status_id = $2, locked_by = NULL, updated_at = NOW() WHERE id = $1"
        } else {
            "UPDATE jobs SET status_id = $2, updated_at = NOW() WHERE id = $1"
        };
        sqlx::query(query)
            .bind(job_id)
            .bind(status.id())
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Update the current step number.
    pub async fn update_step(pool: &PgPool, job_id: DbId, step: i32) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE jobs SET current_step = $2, updated_at = NOW() WHERE id = $1")
            .bind(job_id)
            .bind(step)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Write the terminal result payload in a single update.
    ///
    /// Persists final content, structured side-results, gap analysis,
    /// cost, and the error message (if any) together.
    pub async fn save_result(
        pool: &PgPool,
        job_id: DbId,
        result: &JobResult,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs \
             SET content = $2, side_results = $3, gap_analysis = $4, \
                 estimated_cost = $5, error_message = $6, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(&result.content)
        .bind(&result.side_results)
        .bind(&result.gap_analysis)
        .bind(result.estimated_cost)
        .bind(&result.error_message)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark a job failed with a non-null error message and release the lock.
    pub async fn mark_failed(
        pool: &PgPool,
        job_id: DbId,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, error_message = $3, locked_by = NULL, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(JobStatus::Failed.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Fail a non-terminal job with a cancellation (or other) message.
    ///
    /// Returns `true` if the job was still cancellable, `false` if it had
    /// already reached a terminal state.
    pub async fn cancel(
        pool: &PgPool,
        job_id: DbId,
        message: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, error_message = $3, locked_by = NULL, updated_at = NOW() \
             WHERE id = $1 AND status_id NOT IN ($4, $5)",
        )
        .bind(job_id)
        .bind(JobStatus::Failed.id())
        .bind(message)
        .bind(JobStatus::Completed.id())
        .bind(JobStatus::Failed.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Reset a terminal job back to `Queued` for another attempt.
    ///
    /// Clears the error and lock and resets the step counter, but keeps
    /// previously generated content (a later run may overwrite it).
    /// Returns `false` if the job was not in a terminal state.
    pub async fn retry(pool: &PgPool, job_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, current_step = 0, locked_by = NULL, \
                 error_message = NULL, updated_at = NOW() \
             WHERE id = $1 AND status_id IN ($3, $4)",
        )
        .bind(job_id)
        .bind(JobStatus::Queued.id())
        .bind(JobStatus::Completed.id())
        .bind(JobStatus::Failed.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Ids of queued jobs, oldest first, for the dispatcher to attempt
    /// claiming one by one.
    pub async fn find_queued(pool: &PgPool, limit: i64) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT id FROM jobs WHERE status_id = $1 ORDER BY created_at ASC LIMIT $2",
        )
        .bind(JobStatus::Queued.id())
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Return a stuck `Processing` job to the queue.
    ///
    /// Only matches when the row has not been touched since `cutoff`, so
    /// an actively progressing job (which bumps `updated_at` on every
    /// write) is never requeued. Returns `true` if the row changed.
    pub async fn requeue_stale(
        pool: &PgPool,
        job_id: DbId,
        cutoff: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, locked_by = NULL, updated_at = NOW() \
             WHERE id = $1 AND status_id = $3 AND updated_at < $4",
        )
        .bind(job_id)
        .bind(JobStatus::Queued.id())
        .bind(JobStatus::Processing.id())
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Ids of `Processing` jobs whose last write predates `cutoff`.
    pub async fn find_stale_processing(
        pool: &PgPool,
        cutoff: Timestamp,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT id FROM jobs WHERE status_id = $1 AND updated_at < $2 ORDER BY updated_at ASC",
        )
        .bind(JobStatus::Processing.id())
        .bind(cutoff)
        .fetch_all(pool)
        .await
    }

    /// List jobs for an owner with optional status filter and pagination.
    pub async fn list_by_owner(
        pool: &PgPool,
        owner_id: DbId,
        params: &JobListQuery,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = params.offset.unwrap_or(0);

        let query = match params.status_id {
            Some(_) => format!(
                "SELECT {COLUMNS} FROM jobs \
                 WHERE owner_id = $1 AND status_id = $2 \
                 ORDER BY created_at DESC LIMIT $3 OFFSET $4"
            ),
            None => format!(
                "SELECT {COLUMNS} FROM jobs \
                 WHERE owner_id = $1 \
                 ORDER BY created_at DESC LIMIT $2 OFFSET $3"
            ),
        };

        let mut q = sqlx::query_as::<_, Job>(&query).bind(owner_id);
        if let Some(sid) = params.status_id {
            q = q.bind(sid);
        }
        q.bind(limit).bind(offset).fetch_all(pool).await
    }
}
