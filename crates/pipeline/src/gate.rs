//! Bounded blind-retry wrapper around step execution.
//!
//! Validation failures are soft: after the retry budget is spent the
//! most recent output is returned together with its failing report, and
//! the caller decides what to do with it. Generation failures are hard
//! and propagate immediately.

use std::future::Future;

use coursecraft_core::quality_gate::{QualityGate, StepCategory, ValidationReport};
use coursecraft_generator::{GenerationOutput, GeneratorError};

/// Output of one gated execution.
#[derive(Debug)]
pub struct GateOutcome {
    /// The accepted (or last-attempted) generation output.
    pub output: GenerationOutput,
    /// The validation report for that output.
    pub report: ValidationReport,
    /// Total executor invocations performed.
    pub attempts: u32,
}

/// Invoke `executor`, validate its output, and retry on validation
/// failure up to `max_retries` additional times.
///
/// Retries are fresh, independent attempts: the specific validation
/// issues are NOT fed back into the regenerated attempt; that feedback
/// loop, if wanted, belongs to the caller. The returned outcome always
/// contains an output: a failing final report is a signal, not an error.
pub async fn execute_with_validation<F, Fut>(
    gate: &QualityGate,
    agent: &str,
    category: StepCategory,
    max_retries: u32,
    mut executor: F,
) -> Result<GateOutcome, GeneratorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<GenerationOutput, GeneratorError>>,
{
    let mut last: Option<(GenerationOutput, ValidationReport)> = None;

    for attempt in 1..=max_retries + 1 {
        let output = executor().await?;
        let report = gate.validate(&output.text, agent, category);

        if report.is_valid {
            return Ok(GateOutcome {
                output,
                report,
                attempts: attempt,
            });
        }

        tracing::debug!(
            agent,
            attempt,
            confidence = report.confidence,
            "Step output failed validation"
        );
        last = Some((output, report));
    }

    // Every attempt failed; surface the most recent result as data.
    let (output, report) = last.expect("at least one attempt always runs");
    Ok(GateOutcome {
        output,
        report,
        attempts: max_retries + 1,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use coursecraft_core::quality_gate::QualityGate;

    use super::*;

    const GOOD_OUTPUT: &str = "The Calvin cycle fixes carbon dioxide into sugar using the \
        ATP and NADPH produced by the light reactions of photosynthesis.";

    fn output(text: &str) -> GenerationOutput {
        GenerationOutput {
            text: text.to_string(),
            prompt_tokens: Some(100),
            completion_tokens: Some(50),
            cost_usd: Some(0.01),
        }
    }

    #[tokio::test]
    async fn passing_output_returns_after_one_attempt() {
        let gate = QualityGate::default();
        let calls = AtomicU32::new(0);

        let outcome = execute_with_validation(&gate, "drafter", StepCategory::Generator, 3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(output(GOOD_OUTPUT)) }
        })
        .await
        .unwrap();

        assert!(outcome.report.is_valid);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_return_last_failing_result() {
        let gate = QualityGate::default();
        let calls = AtomicU32::new(0);

        // Too short to ever pass, so every attempt fails validation.
        let outcome = execute_with_validation(&gate, "drafter", StepCategory::Generator, 2, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(output("nope")) }
        })
        .await
        .unwrap();

        assert!(!outcome.report.is_valid);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.output.text, "nope");
    }

    #[tokio::test]
    async fn generation_error_propagates_immediately() {
        let gate = QualityGate::default();
        let calls = AtomicU32::new(0);

        let result = execute_with_validation(&gate, "drafter", StepCategory::Generator, 5, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GeneratorError::Backend("gpu on fire".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_retries_means_single_attempt() {
        let gate = QualityGate::default();
        let calls = AtomicU32::new(0);

        let outcome = execute_with_validation(&gate, "drafter", StepCategory::Generator, 0, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(output("nope")) }
        })
        .await
        .unwrap();

        assert!(!outcome.report.is_valid);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
