//! Repository for the `cumulative_feedback` and `feedback_history` tables.
//!
//! The live table holds exactly one row per content mode (upsert on
//! conflict); history rows are append-only and retained indefinitely.

use coursecraft_core::feedback::FeedbackRecord;
use sqlx::PgPool;

use crate::models::feedback::{CumulativeFeedback, FeedbackHistoryEntry};

/// Column list for `cumulative_feedback` queries.
const COLUMNS: &str = "\
    id, mode, scores, previous_scores, trends, issue_clusters, \
    strengths, summary, generation_count, updated_at";

/// Column list for `feedback_history` queries.
const HISTORY_COLUMNS: &str = "id, mode, snapshot, acknowledged_by, created_at";

/// Provides rolling-feedback persistence keyed by content mode.
pub struct FeedbackRepo;

impl FeedbackRepo {
    /// Find the live feedback row for a mode.
    pub async fn find_by_mode(
        pool: &PgPool,
        mode: &str,
    ) -> Result<Option<CumulativeFeedback>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM cumulative_feedback WHERE mode = $1");
        sqlx::query_as::<_, CumulativeFeedback>(&query)
            .bind(mode)
            .fetch_optional(pool)
            .await
    }

    /// Upsert the live feedback row for a mode.
    ///
    /// The unique key on `mode` guarantees one row per mode no matter
    /// how many workers aggregate concurrently.
    pub async fn upsert(
        pool: &PgPool,
        mode: &str,
        record: &FeedbackRecord,
    ) -> Result<CumulativeFeedback, sqlx::Error> {
        let query = format!(
            "INSERT INTO cumulative_feedback \
                 (mode, scores, previous_scores, trends, issue_clusters, \
                  strengths, summary, generation_count) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (mode) DO UPDATE SET \
                 scores = EXCLUDED.scores, \
                 previous_scores = EXCLUDED.previous_scores, \
                 trends = EXCLUDED.trends, \
                 issue_clusters = EXCLUDED.issue_clusters, \
                 strengths = EXCLUDED.strengths, \
                 summary = EXCLUDED.summary, \
                 generation_count = EXCLUDED.generation_count, \
                 updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CumulativeFeedback>(&query)
            .bind(mode)
            .bind(serde_json::json!(record.scores))
            .bind(serde_json::json!(record.previous_scores))
            .bind(serde_json::json!(record.trends))
            .bind(serde_json::json!(record.issue_clusters))
            .bind(serde_json::json!(record.strengths))
            .bind(&record.summary)
            .bind(record.generation_count)
            .fetch_one(pool)
            .await
    }

    /// Archive the live record to history and reset it to the empty state.
    ///
    /// The snapshot is copied verbatim before the reset, in the same
    /// transaction, so an acknowledgment can never lose the record it
    /// acknowledges. Returns `false` when the mode has no live row.
    pub async fn clear(
        pool: &PgPool,
        mode: &str,
        acknowledged_by: &str,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!("SELECT {COLUMNS} FROM cumulative_feedback WHERE mode = $1");
        let Some(live) = sqlx::query_as::<_, CumulativeFeedback>(&query)
            .bind(mode)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(false);
        };

        sqlx::query(
            "INSERT INTO feedback_history (mode, snapshot, acknowledged_by) \
             VALUES ($1, $2, $3)",
        )
        .bind(mode)
        .bind(serde_json::json!(live))
        .bind(acknowledged_by)
        .execute(&mut *tx)
        .await?;

        let reset = FeedbackRecord::reset();
        sqlx::query(
            "UPDATE cumulative_feedback \
             SET scores = $2, previous_scores = $3, trends = $4, \
                 issue_clusters = $5, strengths = $6, summary = $7, \
                 generation_count = 0, updated_at = NOW() \
             WHERE mode = $1",
        )
        .bind(mode)
        .bind(serde_json::json!(reset.scores))
        .bind(serde_json::json!(reset.previous_scores))
        .bind(serde_json::json!(reset.trends))
        .bind(serde_json::json!(reset.issue_clusters))
        .bind(serde_json::json!(reset.strengths))
        .bind(&reset.summary)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// List archived records for a mode, newest first.
    pub async fn list_history(
        pool: &PgPool,
        mode: &str,
        limit: i64,
    ) -> Result<Vec<FeedbackHistoryEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {HISTORY_COLUMNS} FROM feedback_history \
             WHERE mode = $1 ORDER BY created_at DESC LIMIT $2"
        );
        sqlx::query_as::<_, FeedbackHistoryEntry>(&query)
            .bind(mode)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Number of archived records for a mode.
    pub async fn count_history(pool: &PgPool, mode: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM feedback_history WHERE mode = $1")
            .bind(mode)
            .fetch_one(pool)
            .await
    }
}
