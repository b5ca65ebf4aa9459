//! Driver loop for one claimed job.
//!
//! Consumes pipeline events and translates them into queue updates,
//! event-log rows, and checkpoint writes. Cancellation is cooperative:
//! the shared token is checked between events, never inside an in-flight
//! generation call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use coursecraft_core::feedback::QualityAnalysis;
use coursecraft_core::job_events::{
    ACTION_COMPLETED, ACTION_FAILED, ACTION_STEP_STARTED, KIND_CHECKPOINT, KIND_CHUNK, KIND_ERROR,
    KIND_REASONING, KIND_STEP,
};
use coursecraft_core::quality_gate::QualityGate;
use coursecraft_db::models::checkpoint::CreateCheckpoint;
use coursecraft_db::models::event::NewJobEvent;
use coursecraft_db::models::job::{Job, JobResult};
use coursecraft_db::models::status::JobStatus;
use coursecraft_db::repositories::{CheckpointRepo, JobRepo};
use coursecraft_generator::Generator;
use coursecraft_pipeline::{ContentPipeline, PipelineEvent, StepMetrics};

use crate::feedback::FeedbackAggregator;
use crate::queue::{JobQueue, QueueError, CANCELLED_MESSAGE, QUEUE_AGENT};

/// How one job run ended.
enum RunOutcome {
    Succeeded,
    Failed(String),
    Cancelled,
}

/// Mutable state accumulated while draining pipeline events.
#[derive(Default)]
struct RunState {
    content: String,
    gap_analysis: Option<serde_json::Value>,
    formatted: Option<serde_json::Value>,
    analysis: Option<QualityAnalysis>,
    cost: f64,
    current_agent: &'static str,
    agent_metrics: HashMap<&'static str, AgentTotals>,
}

/// Advisory per-agent totals; upstream events may omit any counter.
#[derive(Default, serde::Serialize)]
struct AgentTotals {
    prompt_tokens: u64,
    completion_tokens: u64,
    cost_usd: f64,
    attempts: u32,
}

impl AgentTotals {
    fn fold(&mut self, metrics: &StepMetrics) {
        self.prompt_tokens += u64::from(metrics.prompt_tokens.unwrap_or(0));
        self.completion_tokens += u64::from(metrics.completion_tokens.unwrap_or(0));
        self.cost_usd += metrics.cost_usd.unwrap_or(0.0);
        self.attempts += metrics.attempts;
    }
}

/// Drives one claimed job through its pipeline to a terminal state.
pub struct JobRunner {
    queue: Arc<JobQueue>,
    generator: Arc<dyn Generator>,
    gate: Arc<QualityGate>,
    aggregator: Arc<FeedbackAggregator>,
    max_step_retries: u32,
}

impl JobRunner {
    pub fn new(
        queue: Arc<JobQueue>,
        generator: Arc<dyn Generator>,
        gate: Arc<QualityGate>,
        aggregator: Arc<FeedbackAggregator>,
        max_step_retries: u32,
    ) -> Self {
        Self {
            queue,
            generator,
            gate,
            aggregator,
            max_step_retries,
        }
    }

    /// Run an already-claimed job to a terminal state.
    ///
    /// Every exit path persists the accumulated content, writes a
    /// non-null error message on failure, and releases the job's lock.
    pub async fn run_job(&self, job: Job) -> Result<(), QueueError> {
        let started = Instant::now();
        let result = self.run_job_inner(&job, started).await;
        self.queue.release_cancellation(job.id);
        result
    }

    async fn run_job_inner(&self, job: &Job, started: Instant) -> Result<(), QueueError> {
        let params = job.params()?;
        let cancel = self.queue.cancellation_for(job.id);
        let mut state = RunState {
            current_agent: QUEUE_AGENT,
            ..Default::default()
        };

        // Resume from the latest checkpoint when a retry left one behind.
        let mut pipeline = match CheckpointRepo::find_latest_for_job(self.queue.pool(), job.id)
            .await?
        {
            Some(cp) => {
                tracing::info!(
                    job_id = job.id,
                    step_number = cp.step_number,
                    step_name = %cp.step_name,
                    "Resuming job from checkpoint",
                );
                state.content = cp.content.clone();
                ContentPipeline::resume(
                    params,
                    Arc::clone(&self.generator),
                    Arc::clone(&self.gate),
                    self.max_step_retries,
                    cp.step_number as u32,
                    cp.content,
                )
            }
            None => ContentPipeline::new(
                params,
                Arc::clone(&self.generator),
                Arc::clone(&self.gate),
                self.max_step_retries,
            ),
        };

        let outcome = loop {
            // Cooperative cancellation: checked only at event boundaries.
            if cancel.is_cancelled() {
                break RunOutcome::Cancelled;
            }
            match pipeline.next_event().await {
                Ok(Some(event)) => {
                    // A signal raised during the in-flight call must stop
                    // the run before this event produces any further writes.
                    if cancel.is_cancelled() {
                        break RunOutcome::Cancelled;
                    }
                    // A cancel issued from another process only shows up in
                    // the row itself; look once per step boundary.
                    if matches!(event, PipelineEvent::Step { .. })
                        && self.row_already_failed(job.id).await?
                    {
                        break RunOutcome::Cancelled;
                    }
                    self.apply_event(job.id, event, &mut state).await?;
                }
                Ok(None) => break RunOutcome::Succeeded,
                Err(e) => break RunOutcome::Failed(e.to_string()),
            }
        };

        self.finalize(job, state, outcome, started).await
    }

    async fn row_already_failed(&self, job_id: i64) -> Result<bool, QueueError> {
        let current = JobRepo::find_by_id(self.queue.pool(), job_id).await?;
        Ok(current.is_some_and(|j| j.status_id == JobStatus::Failed.id()))
    }

    /// Translate one pipeline event into queue/log updates.
    async fn apply_event(
        &self,
        job_id: i64,
        event: PipelineEvent,
        state: &mut RunState,
    ) -> Result<(), QueueError> {
        match event {
            PipelineEvent::Step {
                number,
                name,
                agent,
                message,
            } => {
                state.current_agent = agent;
                self.queue.update_step(job_id, number as i32).await?;
                self.queue
                    .update_status(job_id, JobStatus::for_step(name))
                    .await?;
                self.queue
                    .log_event(
                        job_id,
                        NewJobEvent::new(KIND_STEP, agent, ACTION_STEP_STARTED, message)
                            .with_metadata(serde_json::json!({
                                "step": number,
                                "step_name": name,
                            })),
                    )
                    .await?;
            }
            PipelineEvent::Chunk { text } => {
                state.content.push_str(&text);
                self.queue
                    .log_event(
                        job_id,
                        NewJobEvent::new(
                            KIND_CHUNK,
                            state.current_agent,
                            "append",
                            format!("{} chars appended", text.len()),
                        )
                        .with_metadata(serde_json::json!({ "chars": text.len() })),
                    )
                    .await?;
            }
            PipelineEvent::Replace { text } => {
                self.queue
                    .log_event(
                        job_id,
                        NewJobEvent::new(
                            KIND_CHUNK,
                            state.current_agent,
                            "replace",
                            format!("content replaced ({} chars)", text.len()),
                        )
                        .with_metadata(serde_json::json!({ "chars": text.len() })),
                    )
                    .await?;
                state.content = text;
            }
            PipelineEvent::Reasoning { agent, text } => {
                self.queue
                    .log_event(
                        job_id,
                        NewJobEvent::new(KIND_REASONING, agent, "summary", text),
                    )
                    .await?;
            }
            PipelineEvent::GapAnalysis { data } => {
                state.gap_analysis = Some(data);
            }
            PipelineEvent::Formatted { data } => {
                state.formatted = Some(data);
            }
            PipelineEvent::Checkpoint {
                step_number,
                step_name,
                content,
            } => {
                CheckpointRepo::create(
                    self.queue.pool(),
                    job_id,
                    &CreateCheckpoint {
                        step_number: step_number as i32,
                        step_name: step_name.to_string(),
                        content,
                    },
                )
                .await?;
                self.queue
                    .log_event(
                        job_id,
                        NewJobEvent::new(
                            KIND_CHECKPOINT,
                            state.current_agent,
                            "snapshot",
                            format!("checkpoint after {step_name}"),
                        )
                        .with_metadata(serde_json::json!({ "step": step_number })),
                    )
                    .await?;
            }
            PipelineEvent::StepDone {
                name,
                agent,
                metrics,
            } => {
                state.agent_metrics.entry(agent).or_default().fold(&metrics);
                self.queue
                    .log_event(
                        job_id,
                        NewJobEvent::new(
                            KIND_STEP,
                            agent,
                            "step_completed",
                            format!("{name} finished"),
                        )
                        .with_metadata(serde_json::json!({
                            "step_name": name,
                            "prompt_tokens": metrics.prompt_tokens,
                            "completion_tokens": metrics.completion_tokens,
                            "cost_usd": metrics.cost_usd,
                            "attempts": metrics.attempts,
                        })),
                    )
                    .await?;
            }
            PipelineEvent::Complete {
                content,
                cost_usd,
                analysis,
            } => {
                if let Some(text) = content {
                    state.content = text;
                }
                state.cost = cost_usd;
                state.analysis = analysis;
            }
        }
        Ok(())
    }

    /// Persist the terminal result for whichever way the run ended.
    async fn finalize(
        &self,
        job: &Job,
        state: RunState,
        outcome: RunOutcome,
        started: Instant,
    ) -> Result<(), QueueError> {
        let duration_ms = started.elapsed().as_millis() as u64;
        let metrics = serde_json::json!({
            "duration_ms": duration_ms,
            "cost_usd": state.cost,
            "agents": state.agent_metrics,
        });

        match outcome {
            RunOutcome::Succeeded => {
                self.queue
                    .save_result(
                        job.id,
                        &JobResult {
                            content: Some(state.content),
                            side_results: state
                                .formatted
                                .map(|f| serde_json::json!({ "formatted": f })),
                            gap_analysis: state.gap_analysis,
                            estimated_cost: state.cost,
                            error_message: None,
                        },
                    )
                    .await?;
                self.queue.update_status(job.id, JobStatus::Completed).await?;
                self.queue
                    .log_event(
                        job.id,
                        NewJobEvent::new(KIND_STEP, QUEUE_AGENT, ACTION_COMPLETED, "Job completed")
                            .with_metadata(metrics),
                    )
                    .await?;
                CheckpointRepo::delete_by_job(self.queue.pool(), job.id).await?;

                if let Some(analysis) = &state.analysis {
                    self.aggregator.aggregate(&job.mode, analysis).await?;
                }
                tracing::info!(job_id = job.id, duration_ms, "Job completed");
            }
            RunOutcome::Failed(error) => {
                // Partial output is preserved alongside the failure; the
                // error message is never left null.
                self.queue
                    .log_event(
                        job.id,
                        NewJobEvent::new(
                            KIND_ERROR,
                            state.current_agent,
                            ACTION_FAILED,
                            error.clone(),
                        )
                        .with_metadata(metrics),
                    )
                    .await?;
                self.queue
                    .save_result(
                        job.id,
                        &JobResult {
                            content: Some(state.content),
                            side_results: None,
                            gap_analysis: state.gap_analysis,
                            estimated_cost: state.cost,
                            error_message: Some(error.clone()),
                        },
                    )
                    .await?;
                self.queue.update_status(job.id, JobStatus::Failed).await?;
                tracing::warn!(job_id = job.id, error = %error, "Job failed");
            }
            RunOutcome::Cancelled => {
                self.queue
                    .save_result(
                        job.id,
                        &JobResult {
                            content: Some(state.content),
                            side_results: None,
                            gap_analysis: state.gap_analysis,
                            estimated_cost: state.cost,
                            error_message: Some(CANCELLED_MESSAGE.to_string()),
                        },
                    )
                    .await?;
                self.queue.update_status(job.id, JobStatus::Failed).await?;
                tracing::info!(job_id = job.id, "Job stopped by cancellation");
            }
        }
        Ok(())
    }
}
