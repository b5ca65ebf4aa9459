//! Event kind and action constants for the per-job event log.
//!
//! Kinds match the `job_events.kind` column; actions are free-form but
//! the lifecycle ones used by the queue live here so readers can match
//! on them during replay.

/// A pipeline step boundary was reached.
pub const KIND_STEP: &str = "step";
/// An incremental content fragment was produced.
pub const KIND_CHUNK: &str = "chunk";
/// Model reasoning surfaced for telemetry.
pub const KIND_REASONING: &str = "reasoning";
/// A hard failure occurred.
pub const KIND_ERROR: &str = "error";
/// A resumable content snapshot was saved.
pub const KIND_CHECKPOINT: &str = "checkpoint";

/// Job accepted into the queue.
pub const ACTION_ENQUEUED: &str = "enqueued";
/// Job claimed by a worker.
pub const ACTION_CLAIMED: &str = "claimed";
/// A pipeline step started.
pub const ACTION_STEP_STARTED: &str = "step_started";
/// Job finished successfully.
pub const ACTION_COMPLETED: &str = "completed";
/// Job failed terminally.
pub const ACTION_FAILED: &str = "failed";
/// Job cancelled on request.
pub const ACTION_CANCELLED: &str = "cancelled";
/// Job reset for another attempt.
pub const ACTION_RETRIED: &str = "retried";
/// Stuck job returned to the queue by the staleness sweep.
pub const ACTION_REQUEUED_STALE: &str = "requeued_stale";
