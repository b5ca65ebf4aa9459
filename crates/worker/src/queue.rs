//! Job queue service: lifecycle operations plus the process-local
//! cancellation-token map.
//!
//! One instance is constructed per process and shared via `Arc`. Every
//! cross-process guarantee comes from the repositories' conditional
//! updates; the token map only reaches jobs running in this process, so
//! cross-process cancellation is best-effort and observed at the job's
//! next status read.

use std::collections::HashMap;
use std::sync::Mutex;

use coursecraft_core::content::JobParams;
use coursecraft_core::error::CoreError;
use coursecraft_core::job_events::{
    ACTION_CANCELLED, ACTION_CLAIMED, ACTION_ENQUEUED, ACTION_RETRIED, KIND_STEP,
};
use coursecraft_core::types::DbId;
use coursecraft_db::models::event::NewJobEvent;
use coursecraft_db::models::job::{Job, JobResult};
use coursecraft_db::models::status::{JobStatus, StatusId};
use coursecraft_db::repositories::{EventRepo, JobRepo};
use coursecraft_db::DbPool;
use tokio_util::sync::CancellationToken;

/// Message persisted when a job is cancelled.
pub const CANCELLED_MESSAGE: &str = "Job cancelled by user request";

/// Agent name used for queue-originated lifecycle events.
pub const QUEUE_AGENT: &str = "queue";

/// Errors from queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Progress view reconstructed from the event log.
///
/// Eventually consistent with the underlying writes, never
/// transactionally exact.
#[derive(Debug, Clone, serde::Serialize)]
pub struct JobProgress {
    pub job_id: DbId,
    pub status_id: StatusId,
    /// `current_step / total_steps_for_mode`, as a percentage.
    pub progress_percent: u8,
    /// Agent of the last logged event.
    pub current_agent: Option<String>,
    /// Sum of advisory per-event costs seen so far.
    pub estimated_cost: f64,
    pub error_message: Option<String>,
}

/// Owns job lifecycle operations and per-job cancellation tokens.
pub struct JobQueue {
    pool: DbPool,
    cancellations: Mutex<HashMap<DbId, CancellationToken>>,
}

impl JobQueue {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            cancellations: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying pool, for collaborating services.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    // -- lifecycle ----------------------------------------------------------

    /// Validate and insert a new queued job, appending the enqueue event.
    pub async fn enqueue(&self, owner_id: DbId, params: &JobParams) -> Result<Job, QueueError> {
        params.validate_submission()?;
        let job = JobRepo::enqueue(&self.pool, owner_id, params).await?;
        self.log_event(
            job.id,
            NewJobEvent::new(KIND_STEP, QUEUE_AGENT, ACTION_ENQUEUED, "Job enqueued")
                .with_metadata(serde_json::json!({ "mode": params.mode.as_str() })),
        )
        .await?;
        tracing::info!(job_id = job.id, mode = %params.mode.as_str(), "Job enqueued");
        Ok(job)
    }

    /// Claim a job for this worker.
    ///
    /// `None` means the job is already owned or terminal; callers must
    /// treat that as "skip, not an error". A successful claim registers
    /// a fresh cancellation token for the job.
    pub async fn claim(&self, job_id: DbId, worker: &str) -> Result<Option<Job>, QueueError> {
        let Some(job) = JobRepo::claim(&self.pool, job_id, worker).await? else {
            return Ok(None);
        };

        self.cancellations
            .lock()
            .expect("cancellation map lock poisoned")
            .insert(job_id, CancellationToken::new());

        self.log_event(
            job.id,
            NewJobEvent::new(KIND_STEP, QUEUE_AGENT, ACTION_CLAIMED, "Job claimed")
                .with_metadata(serde_json::json!({ "worker": worker })),
        )
        .await?;
        Ok(Some(job))
    }

    /// Update a job's status (terminal statuses also release the lock).
    pub async fn update_status(&self, job_id: DbId, status: JobStatus) -> Result<(), QueueError> {
        JobRepo::update_status(&self.pool, job_id, status).await?;
        Ok(())
    }

    /// Update the current step counter.
    pub async fn update_step(&self, job_id: DbId, step: i32) -> Result<(), QueueError> {
        JobRepo::update_step(&self.pool, job_id, step).await?;
        Ok(())
    }

    /// Append one immutable event to the job's log.
    pub async fn log_event(&self, job_id: DbId, event: NewJobEvent) -> Result<(), QueueError> {
        EventRepo::insert(&self.pool, job_id, &event).await?;
        Ok(())
    }

    /// Terminal write of content, side-results, cost, and error message.
    pub async fn save_result(&self, job_id: DbId, result: &JobResult) -> Result<(), QueueError> {
        JobRepo::save_result(&self.pool, job_id, result).await?;
        Ok(())
    }

    /// Cancel a job.
    ///
    /// Signals the process-local token when this worker holds the job;
    /// otherwise the status write is the only effect and a worker in
    /// another process notices at its next step boundary. Returns `true`
    /// when the job was still cancellable.
    pub async fn cancel_job(&self, job_id: DbId) -> Result<bool, QueueError> {
        if let Some(token) = self
            .cancellations
            .lock()
            .expect("cancellation map lock poisoned")
            .get(&job_id)
        {
            token.cancel();
        }

        let cancelled = JobRepo::cancel(&self.pool, job_id, CANCELLED_MESSAGE).await?;
        if cancelled {
            self.log_event(
                job_id,
                NewJobEvent::new(KIND_STEP, QUEUE_AGENT, ACTION_CANCELLED, CANCELLED_MESSAGE),
            )
            .await?;
            tracing::info!(job_id, "Job cancelled");
        }
        Ok(cancelled)
    }

    /// Reset a terminal job to `Queued` for another run.
    ///
    /// Previously generated content is kept; a subsequent run may
    /// overwrite it. Returns `false` if the job was not terminal.
    pub async fn retry_job(&self, job_id: DbId) -> Result<bool, QueueError> {
        let retried = JobRepo::retry(&self.pool, job_id).await?;
        if retried {
            self.log_event(
                job_id,
                NewJobEvent::new(KIND_STEP, QUEUE_AGENT, ACTION_RETRIED, "Job requeued for retry"),
            )
            .await?;
            tracing::info!(job_id, "Job requeued for retry");
        }
        Ok(retried)
    }

    // -- cancellation tokens ------------------------------------------------

    /// Token for a job this process is running. Creates one on demand so
    /// a cancel arriving before the runner starts is still observed.
    pub fn cancellation_for(&self, job_id: DbId) -> CancellationToken {
        self.cancellations
            .lock()
            .expect("cancellation map lock poisoned")
            .entry(job_id)
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    /// Drop the token once a job reaches a terminal state.
    pub fn release_cancellation(&self, job_id: DbId) {
        self.cancellations
            .lock()
            .expect("cancellation map lock poisoned")
            .remove(&job_id);
    }

    // -- read model ---------------------------------------------------------

    /// Reconstruct a job's progress by replaying its ordered event log.
    ///
    /// Progress is `highest step seen / total steps for the mode`; the
    /// current agent is the agent of the last event. Terminal statuses
    /// pin progress to 100%.
    pub async fn job_status(&self, job_id: DbId) -> Result<Option<JobProgress>, QueueError> {
        let Some(job) = JobRepo::find_by_id(&self.pool, job_id).await? else {
            return Ok(None);
        };
        let mode = job.content_mode()?;
        let events = EventRepo::list_by_job(&self.pool, job_id).await?;

        let mut current_step: u32 = 0;
        let mut estimated_cost = 0.0;
        for event in &events {
            if let Some(step) = event.metadata["step"].as_u64() {
                current_step = current_step.max(step as u32);
            }
            if let Some(cost) = event.metadata["cost_usd"].as_f64() {
                estimated_cost += cost;
            }
        }

        let status = job.status_id;
        let progress_percent = if JobStatus::Completed.id() == status {
            100
        } else {
            (current_step * 100 / mode.total_steps().max(1)).min(100) as u8
        };

        Ok(Some(JobProgress {
            job_id,
            status_id: status,
            progress_percent,
            current_agent: events.last().map(|e| e.agent.clone()),
            estimated_cost,
            error_message: job.error_message,
        }))
    }
}
