//! Output validation for generation steps.
//!
//! Every step's raw output passes through [`QualityGate::validate`]
//! before the pipeline accepts it. Confidence starts at 1.0 and is only
//! ever multiplied down; the per-category thresholds decide whether the
//! output is acceptable or should be regenerated.

use regex::Regex;

use crate::content::{STEP_ANALYZE, STEP_FORMAT, STEP_REVIEW};

// ---------------------------------------------------------------------------
// Step categories and thresholds
// ---------------------------------------------------------------------------

/// Validation category of a pipeline step.
///
/// The category decides the acceptance threshold and whether the step is
/// expected to produce a structured (JSON) payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepCategory {
    /// Analysis/classification steps (gap detection, topic mapping).
    Classifier,
    /// Free-form content generation steps (draft, refine).
    Generator,
    /// Structured extraction steps (final formatting).
    Formatter,
    /// Review/scoring steps.
    Validator,
}

impl StepCategory {
    /// Minimum confidence for a step of this category to pass validation.
    ///
    /// Sized via [`required_step_accuracy`] so a full five-step chain
    /// keeps its end-to-end accuracy above ~0.75.
    pub fn threshold(self) -> f64 {
        match self {
            StepCategory::Classifier => 0.90,
            StepCategory::Generator => 0.95,
            StepCategory::Formatter => 0.98,
            StepCategory::Validator => 0.90,
        }
    }

    /// Whether outputs of this category must contain a parseable JSON span.
    pub fn expects_structured(self) -> bool {
        matches!(
            self,
            StepCategory::Classifier | StepCategory::Formatter | StepCategory::Validator
        )
    }
}

/// Map a step name to its validation category.
///
/// Unknown steps validate as generators (the most common case).
pub fn category_for_step(step: &str) -> StepCategory {
    match step {
        STEP_ANALYZE => StepCategory::Classifier,
        STEP_REVIEW => StepCategory::Validator,
        STEP_FORMAT => StepCategory::Formatter,
        _ => StepCategory::Generator,
    }
}

// ---------------------------------------------------------------------------
// Penalty constants
// ---------------------------------------------------------------------------

/// Multiplier when an expected JSON span is missing entirely.
const PENALTY_MISSING_STRUCTURE: f64 = 0.6;
/// Multiplier when a JSON span is present but does not parse.
const PENALTY_INVALID_STRUCTURE: f64 = 0.5;
/// Multiplier per matched refusal/capability-limitation phrase.
const PENALTY_REFUSAL: f64 = 0.7;
/// One-time multiplier once filler phrases exceed the tolerance.
const PENALTY_FILLER: f64 = 0.9;
/// Multiplier when the estimated token count is below the floor.
const PENALTY_LOW_TOKENS: f64 = 0.7;

/// Distinct filler phrases tolerated before any penalty applies.
const FILLER_TOLERANCE: usize = 2;

/// Rough characters-per-token divisor for the token sanity floor.
const CHARS_PER_TOKEN: usize = 4;

/// Refusal and capability-limitation phrases. Any occurrence is a strong
/// signal the model did not produce usable content.
const REFUSAL_PATTERNS: &[&str] = &[
    r"(?i)\bI cannot\b",
    r"(?i)\bI can't\b",
    r"(?i)\bI'?m unable to\b",
    r"(?i)\bI am unable to\b",
    r"(?i)\bas an AI\b",
    r"(?i)\bI apologize,? but\b",
    r"(?i)\bbeyond my capabilities\b",
];

/// Generic filler phrases. A couple are tolerated as noise; beyond that
/// the output is likely padded.
const FILLER_PATTERNS: &[&str] = &[
    r"(?i)\bit is important to note\b",
    r"(?i)\bin today's fast-paced world\b",
    r"(?i)\blet's delve into\b",
    r"(?i)\bat the end of the day\b",
    r"(?i)\bneedless to say\b",
    r"(?i)\bwhen it comes to\b",
];

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Tunable limits for the quality gate.
#[derive(Debug, Clone, Copy)]
pub struct QualityGateConfig {
    /// Outputs shorter than this many characters hard-fail.
    pub min_length: usize,
    /// Estimated token counts below this multiply confidence down.
    pub min_tokens: usize,
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            min_length: 50,
            min_tokens: 10,
        }
    }
}

/// Result of validating one step output.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    /// Whether the confidence met the category threshold.
    pub is_valid: bool,
    /// Final confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Human-readable problems found, in check order.
    pub issues: Vec<String>,
    /// Suggested follow-up actions (e.g. retry hints).
    pub suggestions: Vec<String>,
}

/// Validates step outputs against length, structure, and phrasing checks.
///
/// Construct once per process and share by reference; pattern compilation
/// happens in [`QualityGate::new`].
pub struct QualityGate {
    config: QualityGateConfig,
    refusal: Vec<Regex>,
    filler: Vec<Regex>,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(QualityGateConfig::default())
    }
}

impl QualityGate {
    /// Compile the phrase pattern sets with the given limits.
    pub fn new(config: QualityGateConfig) -> Self {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns
                .iter()
                .map(|p| Regex::new(p).expect("static pattern must compile"))
                .collect()
        };
        Self {
            config,
            refusal: compile(REFUSAL_PATTERNS),
            filler: compile(FILLER_PATTERNS),
        }
    }

    /// Validate one step output.
    ///
    /// Checks run in a fixed order and only multiply confidence down:
    ///
    /// 1. Minimum length: below the floor forces confidence to 0 and
    ///    returns immediately.
    /// 2. Structural validity: only for categories that expect JSON.
    /// 3. Refusal phrase detection.
    /// 4. Filler phrase detection (tolerates a couple of occurrences).
    /// 5. Estimated token-count sanity floor.
    pub fn validate(&self, output: &str, agent: &str, category: StepCategory) -> ValidationReport {
        let mut confidence: f64 = 1.0;
        let mut issues = Vec::new();
        let mut suggestions = Vec::new();

        if output.len() < self.config.min_length {
            issues.push(format!(
                "{agent} output is {} chars, below the {} minimum",
                output.len(),
                self.config.min_length
            ));
            return ValidationReport {
                is_valid: false,
                confidence: 0.0,
                issues,
                suggestions,
            };
        }

        if category.expects_structured() {
            match extract_json_span(output) {
                None => {
                    confidence *= PENALTY_MISSING_STRUCTURE;
                    issues.push(format!("{agent} output contains no JSON payload"));
                }
                Some(span) => {
                    if serde_json::from_str::<serde_json::Value>(span).is_err() {
                        confidence *= PENALTY_INVALID_STRUCTURE;
                        issues.push(format!("{agent} output contains malformed JSON"));
                    }
                }
            }
        }

        for pattern in &self.refusal {
            if pattern.is_match(output) {
                confidence *= PENALTY_REFUSAL;
                issues.push(format!(
                    "{agent} output contains a refusal phrase ({})",
                    pattern.as_str()
                ));
                suggestions.push(format!("Retry {agent} with a rephrased prompt"));
            }
        }

        let filler_hits = self.filler.iter().filter(|p| p.is_match(output)).count();
        if filler_hits > FILLER_TOLERANCE {
            confidence *= PENALTY_FILLER;
            issues.push(format!(
                "{agent} output contains {filler_hits} distinct filler phrases"
            ));
        }

        if estimate_tokens(output) < self.config.min_tokens {
            confidence *= PENALTY_LOW_TOKENS;
            issues.push(format!("{agent} output token estimate is suspiciously low"));
        }

        ValidationReport {
            is_valid: confidence >= category.threshold(),
            confidence,
            issues,
            suggestions,
        }
    }
}

/// Locate the outermost JSON-like span (first `{` through last `}`).
pub fn extract_json_span(output: &str) -> Option<&str> {
    let start = output.find('{')?;
    let end = output.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&output[start..=end])
}

/// Rough token estimate from character length.
pub fn estimate_tokens(output: &str) -> usize {
    output.len() / CHARS_PER_TOKEN
}

// ---------------------------------------------------------------------------
// Chain accuracy
// ---------------------------------------------------------------------------

/// End-to-end accuracy of an `n`-step sequential chain where every step
/// independently succeeds with probability `per_step`.
pub fn chain_accuracy(per_step: f64, steps: u32) -> f64 {
    per_step.powi(steps as i32)
}

/// Per-step accuracy required for an `n`-step chain to reach `target`
/// end-to-end accuracy. Returns 1.0 for a zero-length chain.
pub fn required_step_accuracy(target: f64, steps: u32) -> f64 {
    if steps == 0 {
        return 1.0;
    }
    target.powf(1.0 / f64::from(steps))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
