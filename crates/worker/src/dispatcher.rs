//! Polling job dispatcher.
//!
//! Discovers queued jobs with an ordered query and claims them one by
//! one through the optimistic-update contract; a failed claim means
//! another worker got there first and is silently skipped. Also runs
//! the staleness sweep that returns abandoned `processing` jobs to the
//! queue.

use std::sync::Arc;
use std::time::Duration;

use coursecraft_core::job_events::{ACTION_REQUEUED_STALE, KIND_STEP};
use coursecraft_db::models::event::NewJobEvent;
use coursecraft_db::repositories::JobRepo;
use tokio_util::sync::CancellationToken;

use crate::queue::{JobQueue, QueueError, QUEUE_AGENT};
use crate::runner::JobRunner;

/// Queued-job candidates fetched per dispatch cycle.
const CLAIM_BATCH: i64 = 10;

/// Long-lived task that claims queued jobs and runs them sequentially.
///
/// Workers are uncoordinated: any number of dispatchers may poll the
/// same database, and the conditional claim decides ownership.
pub struct JobDispatcher {
    queue: Arc<JobQueue>,
    runner: Arc<JobRunner>,
    /// Identity recorded as the lock owner of claimed jobs.
    worker_id: String,
    poll_interval: Duration,
    stale_after: chrono::Duration,
}

impl JobDispatcher {
    pub fn new(
        queue: Arc<JobQueue>,
        runner: Arc<JobRunner>,
        poll_interval: Duration,
        stale_after: Duration,
    ) -> Self {
        Self {
            queue,
            runner,
            worker_id: format!("worker-{}", uuid::Uuid::new_v4()),
            poll_interval,
            stale_after: chrono::Duration::from_std(stale_after)
                .unwrap_or_else(|_| chrono::Duration::seconds(900)),
        }
    }

    /// This dispatcher's lock-owner identity.
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run the dispatch loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(
            worker_id = %self.worker_id,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Job dispatcher started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(worker_id = %self.worker_id, "Job dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.try_dispatch().await {
                        tracing::error!(error = %e, "Dispatch cycle failed");
                    }
                }
            }
        }
    }

    /// One dispatch cycle: sweep stale jobs, then claim and run queued ones.
    async fn try_dispatch(&self) -> Result<(), QueueError> {
        self.requeue_stale().await?;

        let candidates = JobRepo::find_queued(self.queue.pool(), CLAIM_BATCH).await?;
        for job_id in candidates {
            // A None claim means another worker owns the job: skip it.
            let Some(job) = self.queue.claim(job_id, &self.worker_id).await? else {
                continue;
            };
            tracing::info!(job_id, worker_id = %self.worker_id, "Job claimed");

            // Job failures must never take the dispatcher down.
            if let Err(e) = self.runner.run_job(job).await {
                tracing::error!(job_id, error = %e, "Job run aborted");
            }
        }
        Ok(())
    }

    /// Return `processing` jobs that stopped making progress to the queue.
    ///
    /// A crashed worker leaves its job locked forever otherwise; any row
    /// untouched for the staleness window is assumed abandoned. The
    /// requeue re-checks the condition inside the update, so a job that
    /// resumed progress in the meantime is left alone.
    async fn requeue_stale(&self) -> Result<(), QueueError> {
        let cutoff = chrono::Utc::now() - self.stale_after;
        let stale = JobRepo::find_stale_processing(self.queue.pool(), cutoff).await?;

        for job_id in stale {
            if JobRepo::requeue_stale(self.queue.pool(), job_id, cutoff).await? {
                self.queue
                    .log_event(
                        job_id,
                        NewJobEvent::new(
                            KIND_STEP,
                            QUEUE_AGENT,
                            ACTION_REQUEUED_STALE,
                            "Stale processing job returned to queue",
                        ),
                    )
                    .await?;
                tracing::warn!(job_id, "Requeued stale processing job");
            }
        }
        Ok(())
    }
}
