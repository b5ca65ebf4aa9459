//! Repository for the append-only `job_events` table.
//!
//! Rows are inserted and read back in creation order; nothing here
//! mutates or deletes.

use coursecraft_core::types::DbId;
use sqlx::PgPool;

use crate::models::event::{JobEvent, NewJobEvent};

/// Column list for `job_events` queries.
const COLUMNS: &str = "id, job_id, kind, agent, action, message, metadata, created_at";

/// Provides append/replay operations for the per-job event log.
pub struct EventRepo;

impl EventRepo {
    /// Append one event, returning the generated ID.
    pub async fn insert(
        pool: &PgPool,
        job_id: DbId,
        event: &NewJobEvent,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO job_events (job_id, kind, agent, action, message, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id",
        )
        .bind(job_id)
        .bind(&event.kind)
        .bind(&event.agent)
        .bind(&event.action)
        .bind(&event.message)
        .bind(&event.metadata)
        .fetch_one(pool)
        .await
    }

    /// Full ordered event log for a job, oldest first.
    ///
    /// The id tiebreak keeps replay deterministic when two events share
    /// a creation timestamp.
    pub async fn list_by_job(pool: &PgPool, job_id: DbId) -> Result<Vec<JobEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM job_events \
             WHERE job_id = $1 ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, JobEvent>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }

}
