//! Pipeline checkpoint models.
//!
//! A checkpoint snapshots the accumulated content at a step boundary so
//! a retried job can resume without regenerating earlier steps.

use coursecraft_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `checkpoints` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Checkpoint {
    pub id: DbId,
    pub job_id: DbId,
    /// Strictly increasing per job.
    pub step_number: i32,
    pub step_name: String,
    /// Accumulated content at this boundary.
    pub content: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Payload for creating (or replacing) a checkpoint.
#[derive(Debug, Clone)]
pub struct CreateCheckpoint {
    pub step_number: i32,
    pub step_name: String,
    pub content: String,
}
