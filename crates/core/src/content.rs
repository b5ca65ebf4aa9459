//! Content modes, step plans, and submission parameter validation.
//!
//! A job's `mode` selects a fixed ordered plan of generation steps.
//! Step names are stable identifiers shared between the pipeline, the
//! event log, and progress reconstruction.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Step names and agents
// ---------------------------------------------------------------------------

/// Topic/transcript analysis, including gap detection.
pub const STEP_ANALYZE: &str = "analyze";
/// Primary content drafting.
pub const STEP_DRAFT: &str = "draft";
/// Quality review of the draft.
pub const STEP_REVIEW: &str = "review";
/// Targeted rewrite driven by review findings.
pub const STEP_REFINE: &str = "refine";
/// Structured extraction / output sanitization.
pub const STEP_FORMAT: &str = "format";
/// Human approval hold (not scheduled by any default plan).
pub const STEP_APPROVAL: &str = "approval";

/// Agent that analyzes the topic and transcript.
pub const AGENT_ANALYZER: &str = "analyzer";
/// Agent that drafts the content body.
pub const AGENT_DRAFTER: &str = "drafter";
/// Agent that reviews and scores a draft.
pub const AGENT_REVIEWER: &str = "reviewer";
/// Agent that rewrites a draft after a weak review.
pub const AGENT_REFINER: &str = "refiner";
/// Agent that extracts the structured final output.
pub const AGENT_FORMATTER: &str = "formatter";

/// Map a step name to the agent that executes it.
///
/// Unknown step names fall back to the drafter, mirroring the queue's
/// generic-status fallback for unrecognized steps.
pub fn agent_for_step(step: &str) -> &'static str {
    match step {
        STEP_ANALYZE => AGENT_ANALYZER,
        STEP_DRAFT => AGENT_DRAFTER,
        STEP_REVIEW => AGENT_REVIEWER,
        STEP_REFINE => AGENT_REFINER,
        STEP_FORMAT => AGENT_FORMATTER,
        _ => AGENT_DRAFTER,
    }
}

// ---------------------------------------------------------------------------
// Content modes
// ---------------------------------------------------------------------------

/// The kind of educational content a job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentMode {
    /// Long-form lecture notes.
    Notes,
    /// Graded assignment with extractable items.
    Assignment,
    /// Multiple-choice quiz with extractable items.
    Quiz,
}

/// All valid content mode names.
pub const VALID_MODES: &[&str] = &["notes", "assignment", "quiz"];

impl ContentMode {
    /// Stable string form used in job rows and feedback keys.
    pub fn as_str(self) -> &'static str {
        match self {
            ContentMode::Notes => "notes",
            ContentMode::Assignment => "assignment",
            ContentMode::Quiz => "quiz",
        }
    }

    /// Parse a mode name, rejecting anything outside [`VALID_MODES`].
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "notes" => Ok(ContentMode::Notes),
            "assignment" => Ok(ContentMode::Assignment),
            "quiz" => Ok(ContentMode::Quiz),
            other => Err(CoreError::Validation(format!(
                "Unknown content mode '{other}'. Must be one of: {}",
                VALID_MODES.join(", ")
            ))),
        }
    }

    /// The ordered step plan for this mode.
    ///
    /// The refine step is conditional at runtime (skipped when the review
    /// score is high enough) but always counts toward the plan length so
    /// progress percentages stay monotonic.
    pub fn step_plan(self) -> &'static [&'static str] {
        match self {
            ContentMode::Notes => &[STEP_ANALYZE, STEP_DRAFT, STEP_REVIEW, STEP_REFINE],
            ContentMode::Assignment | ContentMode::Quiz => {
                &[STEP_ANALYZE, STEP_DRAFT, STEP_REVIEW, STEP_REFINE, STEP_FORMAT]
            }
        }
    }

    /// Total number of steps in this mode's plan.
    pub fn total_steps(self) -> u32 {
        self.step_plan().len() as u32
    }

    /// Whether this mode ends with a structured extraction step.
    pub fn has_format_step(self) -> bool {
        self.step_plan().contains(&STEP_FORMAT)
    }
}

// ---------------------------------------------------------------------------
// Submission parameters
// ---------------------------------------------------------------------------

/// Requested item counts for assignment-style modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct AssignmentCounts {
    /// Number of multiple-choice questions.
    #[validate(range(min = 0, max = 50))]
    pub mcq: i32,
    /// Number of short-answer questions.
    #[validate(range(min = 0, max = 50))]
    pub short_answer: i32,
    /// Number of long-form / essay questions.
    #[validate(range(min = 0, max = 20))]
    pub essay: i32,
}

impl AssignmentCounts {
    /// Total requested items across all kinds.
    pub fn total(self) -> i32 {
        self.mcq + self.short_answer + self.essay
    }
}

/// User-supplied input parameters for a content-generation job.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JobParams {
    /// Main topic of the content.
    #[validate(length(min = 1, max = 500))]
    pub topic: String,
    /// Subtopics to cover, in order.
    #[validate(length(max = 50))]
    pub subtopics: Vec<String>,
    /// Content mode selecting the step plan.
    pub mode: ContentMode,
    /// Optional source transcript to ground the content in.
    pub transcript: Option<String>,
    /// Optional item counts; only meaningful for assignment/quiz modes.
    #[validate(nested)]
    pub assignment_counts: Option<AssignmentCounts>,
}

impl JobParams {
    /// Validate submission parameters beyond the derive-level field rules.
    ///
    /// Assignment and quiz jobs must request at least one item when counts
    /// are supplied.
    pub fn validate_submission(&self) -> Result<(), CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;

        if let Some(counts) = self.assignment_counts {
            if !matches!(self.mode, ContentMode::Assignment | ContentMode::Quiz) {
                return Err(CoreError::Validation(format!(
                    "assignment_counts is not valid for mode '{}'",
                    self.mode.as_str()
                )));
            }
            if counts.total() == 0 {
                return Err(CoreError::Validation(
                    "assignment_counts must request at least one item".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
