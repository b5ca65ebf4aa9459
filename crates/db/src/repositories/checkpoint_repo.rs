//! Repository for the `checkpoints` table.
//!
//! Checkpoints snapshot accumulated content at step boundaries and are
//! consumed only by retry; successful completion deletes them.

use coursecraft_core::types::DbId;
use sqlx::PgPool;

use crate::models::checkpoint::{Checkpoint, CreateCheckpoint};

/// Column list for `checkpoints` queries.
const COLUMNS: &str = "id, job_id, step_number, step_name, content, created_at, updated_at";

/// Provides CRUD operations for pipeline checkpoints.
pub struct CheckpointRepo;

impl CheckpointRepo {
    /// Create a checkpoint for a step boundary.
    ///
    /// Uses `ON CONFLICT` to upsert: a rerun of the same step replaces
    /// the earlier snapshot rather than duplicating it.
    pub async fn create(
        pool: &PgPool,
        job_id: DbId,
        input: &CreateCheckpoint,
    ) -> Result<Checkpoint, sqlx::Error> {
        let query = format!(
            "INSERT INTO checkpoints (job_id, step_number, step_name, content) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (job_id, step_number) DO UPDATE SET \
                 step_name = EXCLUDED.step_name, \
                 content = EXCLUDED.content, \
                 updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Checkpoint>(&query)
            .bind(job_id)
            .bind(input.step_number)
            .bind(&input.step_name)
            .bind(&input.content)
            .fetch_one(pool)
            .await
    }

    /// List all checkpoints for a job, ordered by step number ascending.
    pub async fn list_by_job(pool: &PgPool, job_id: DbId) -> Result<Vec<Checkpoint>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM checkpoints \
             WHERE job_id = $1 ORDER BY step_number ASC"
        );
        sqlx::query_as::<_, Checkpoint>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }

    /// Find the latest (highest step_number) checkpoint for a job.
    pub async fn find_latest_for_job(
        pool: &PgPool,
        job_id: DbId,
    ) -> Result<Option<Checkpoint>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM checkpoints \
             WHERE job_id = $1 ORDER BY step_number DESC LIMIT 1"
        );
        sqlx::query_as::<_, Checkpoint>(&query)
            .bind(job_id)
            .fetch_optional(pool)
            .await
    }

    /// Delete all checkpoints for a job (after successful completion).
    ///
    /// Returns the number of rows deleted.
    pub async fn delete_by_job(pool: &PgPool, job_id: DbId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM checkpoints WHERE job_id = $1")
            .bind(job_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
