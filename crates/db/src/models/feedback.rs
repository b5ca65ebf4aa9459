//! Cumulative feedback models.
//!
//! One live row per content mode plus an append-only history of
//! acknowledged (cleared) records.

use coursecraft_core::error::CoreError;
use coursecraft_core::feedback::{FeedbackRecord, IssueCluster, QualityScores, ScoreTrends};
use coursecraft_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `cumulative_feedback` table (one per mode).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CumulativeFeedback {
    pub id: DbId,
    pub mode: String,
    pub scores: serde_json::Value,
    pub previous_scores: serde_json::Value,
    pub trends: serde_json::Value,
    pub issue_clusters: serde_json::Value,
    pub strengths: serde_json::Value,
    pub summary: String,
    pub generation_count: i32,
    pub updated_at: Timestamp,
}

impl CumulativeFeedback {
    /// Decode the JSONB columns back into the domain record.
    pub fn to_record(&self) -> Result<FeedbackRecord, CoreError> {
        Ok(FeedbackRecord {
            scores: serde_json::from_value::<QualityScores>(self.scores.clone())?,
            previous_scores: serde_json::from_value::<QualityScores>(
                self.previous_scores.clone(),
            )?,
            trends: serde_json::from_value::<ScoreTrends>(self.trends.clone())?,
            issue_clusters: serde_json::from_value::<Vec<IssueCluster>>(
                self.issue_clusters.clone(),
            )?,
            strengths: serde_json::from_value(self.strengths.clone())?,
            summary: self.summary.clone(),
            generation_count: self.generation_count,
        })
    }
}

/// A row from the `feedback_history` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FeedbackHistoryEntry {
    pub id: DbId,
    pub mode: String,
    /// Verbatim copy of the live record at acknowledgment time.
    pub snapshot: serde_json::Value,
    /// Who acknowledged (and thereby reset) the record.
    pub acknowledged_by: String,
    pub created_at: Timestamp,
}
