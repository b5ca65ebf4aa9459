//! Meta-feedback aggregation service.
//!
//! Folds each completed job's quality analysis into the rolling
//! per-mode record; the merge math lives in `coursecraft_core::feedback`
//! and persistence in `FeedbackRepo`.

use coursecraft_core::feedback::{merge_analysis, QualityAnalysis};
use coursecraft_db::models::feedback::CumulativeFeedback;
use coursecraft_db::repositories::FeedbackRepo;
use coursecraft_db::DbPool;

use crate::queue::QueueError;

/// Maintains one cumulative feedback record per content mode.
pub struct FeedbackAggregator {
    pool: DbPool,
}

impl FeedbackAggregator {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Fold one job's analysis into the mode's rolling record.
    ///
    /// The first analysis for a mode initializes the record; later ones
    /// update the rolling averages, trends, issue clusters, and
    /// strengths. The merged record is upserted keyed by mode.
    pub async fn aggregate(
        &self,
        mode: &str,
        analysis: &QualityAnalysis,
    ) -> Result<CumulativeFeedback, QueueError> {
        let existing = FeedbackRepo::find_by_mode(&self.pool, mode).await?;
        let existing_record = match &existing {
            Some(row) => Some(row.to_record()?),
            None => None,
        };

        let merged = merge_analysis(existing_record.as_ref(), analysis);
        let row = FeedbackRepo::upsert(&self.pool, mode, &merged).await?;
        tracing::debug!(
            mode,
            generation_count = merged.generation_count,
            "Feedback aggregated",
        );
        Ok(row)
    }

    /// Archive the mode's record to history and reset it.
    ///
    /// This is the only path that empties a feedback record; the archived
    /// snapshot is retained indefinitely. Returns `false` when the mode
    /// has no record yet.
    pub async fn clear(&self, mode: &str, acknowledged_by: &str) -> Result<bool, QueueError> {
        let cleared = FeedbackRepo::clear(&self.pool, mode, acknowledged_by).await?;
        if cleared {
            tracing::info!(mode, acknowledged_by, "Feedback record acknowledged and reset");
        }
        Ok(cleared)
    }
}
