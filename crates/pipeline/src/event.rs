//! Pipeline events consumed by the worker driver.
//!
//! Each variant carries only the fields relevant to that case; the
//! driver translates them into queue status updates, event-log rows,
//! and accumulated content.

use coursecraft_core::feedback::QualityAnalysis;
use serde::Serialize;

/// Advisory token/cost counters for one completed step.
///
/// Upstream backends may omit any of these.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StepMetrics {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub cost_usd: Option<f64>,
    /// Gate attempts consumed (1 = passed first try).
    pub attempts: u32,
}

/// One event in a job's pipeline run.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A pipeline step started. Drives step/status updates.
    Step {
        /// 1-based position in the step plan.
        number: u32,
        name: &'static str,
        agent: &'static str,
        message: String,
    },
    /// Incremental content appended to the accumulated output.
    Chunk { text: String },
    /// Accumulated content replaced wholesale.
    Replace { text: String },
    /// Model reasoning surfaced for telemetry; never merged into content.
    Reasoning { agent: &'static str, text: String },
    /// Side-channel gap analysis from the analyze step.
    GapAnalysis { data: serde_json::Value },
    /// Side-channel structured output from the format step.
    Formatted { data: serde_json::Value },
    /// A resumable content snapshot at a step boundary.
    Checkpoint {
        step_number: u32,
        step_name: &'static str,
        content: String,
    },
    /// A step finished; carries that step's advisory metrics.
    StepDone {
        name: &'static str,
        agent: &'static str,
        metrics: StepMetrics,
    },
    /// The pipeline finished successfully.
    ///
    /// When `content` is present it supersedes the accumulated value.
    Complete {
        content: Option<String>,
        cost_usd: f64,
        analysis: Option<QualityAnalysis>,
    },
}
