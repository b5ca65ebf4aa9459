//! Job entity models and DTOs for the content-generation queue.

use coursecraft_core::content::{ContentMode, JobParams};
use coursecraft_core::error::CoreError;
use coursecraft_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub owner_id: DbId,
    pub topic: String,
    /// JSON array of subtopic strings.
    pub subtopics: serde_json::Value,
    pub mode: String,
    pub transcript: Option<String>,
    pub assignment_counts: Option<serde_json::Value>,
    pub status_id: StatusId,
    pub current_step: i32,
    /// Worker identity holding the optimistic lock, if any.
    pub locked_by: Option<String>,
    /// Final generated content.
    pub content: Option<String>,
    /// Structured side-results (pre-run `{counts}` or post-run `{formatted}`).
    pub side_results: Option<serde_json::Value>,
    pub gap_analysis: Option<serde_json::Value>,
    pub estimated_cost: f64,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// Parse the stored mode string back into a [`ContentMode`].
    pub fn content_mode(&self) -> Result<ContentMode, CoreError> {
        ContentMode::parse(&self.mode)
    }

    /// Reassemble the submission parameters from the row's columns.
    pub fn params(&self) -> Result<JobParams, CoreError> {
        Ok(JobParams {
            topic: self.topic.clone(),
            subtopics: serde_json::from_value(self.subtopics.clone())?,
            mode: self.content_mode()?,
            transcript: self.transcript.clone(),
            assignment_counts: match &self.assignment_counts {
                Some(value) => serde_json::from_value(value.clone())?,
                None => None,
            },
        })
    }
}

/// Terminal result payload written in a single update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobResult {
    pub content: Option<String>,
    pub side_results: Option<serde_json::Value>,
    pub gap_analysis: Option<serde_json::Value>,
    pub estimated_cost: f64,
    pub error_message: Option<String>,
}

/// Query parameters for owner-scoped job listing.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    /// Filter by status ID (e.g. 1 = queued, 9 = failed).
    pub status_id: Option<StatusId>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}
