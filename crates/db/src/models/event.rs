//! Job event log models.
//!
//! Events are append-only; rows are never mutated or deleted and
//! ordering is by creation time (id as tiebreak).

use coursecraft_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `job_events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobEvent {
    pub id: DbId,
    pub job_id: DbId,
    /// Event kind, one of the `coursecraft_core::job_events::KIND_*` values.
    pub kind: String,
    /// Agent the event is attributed to.
    pub agent: String,
    pub action: String,
    pub message: String,
    /// Token counts, cost, and arbitrary structured data.
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
}

/// Payload for appending one event.
#[derive(Debug, Clone, Serialize)]
pub struct NewJobEvent {
    pub kind: String,
    pub agent: String,
    pub action: String,
    pub message: String,
    pub metadata: serde_json::Value,
}

impl NewJobEvent {
    /// Create an event with an empty metadata object.
    pub fn new(
        kind: impl Into<String>,
        agent: impl Into<String>,
        action: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            agent: agent.into(),
            action: action.into(),
            message: message.into(),
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    /// Attach structured metadata (token counts, cost, payloads).
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
