//! Checkpoint-resumable pipeline iterator.
//!
//! [`ContentPipeline`] owns the step cursor and the accumulated content
//! and yields one [`PipelineEvent`] at a time. The driver loop that
//! consumes it decides persistence and cancellation; this type knows
//! nothing about the queue.

use std::collections::VecDeque;
use std::sync::Arc;

use coursecraft_core::content::{
    agent_for_step, ContentMode, JobParams, STEP_ANALYZE, STEP_DRAFT, STEP_FORMAT, STEP_REFINE,
    STEP_REVIEW,
};
use coursecraft_core::feedback::QualityAnalysis;
use coursecraft_core::quality_gate::{category_for_step, extract_json_span, QualityGate};
use coursecraft_generator::{GenerationRequest, Generator, GeneratorError};

use crate::event::{PipelineEvent, StepMetrics};
use crate::gate::{execute_with_validation, GateOutcome};
use crate::prompts::{self, PromptPair};

/// Review score (0-10 average) at or above which the refine step is skipped.
const REFINE_SCORE_THRESHOLD: f64 = 7.0;

/// Token budgets per stage.
const MAX_TOKENS_ANALYZE: u32 = 1024;
const MAX_TOKENS_DRAFT: u32 = 4096;
const MAX_TOKENS_REVIEW: u32 = 2048;
const MAX_TOKENS_REFINE: u32 = 4096;
const MAX_TOKENS_FORMAT: u32 = 2048;

/// Hard pipeline failures. Soft validation failures never appear here;
/// they ride along as data on the accepted output.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The generation backend failed; terminates the job.
    #[error(transparent)]
    Generation(#[from] GeneratorError),

    /// The provided transcript does not cover the requested topic.
    #[error("Transcript does not match topic: {0}")]
    TopicMismatch(String),
}

/// Walks a job's step plan, yielding events until `Complete`.
///
/// The iterator is finite and resumable: [`ContentPipeline::resume`]
/// fast-forwards past steps already covered by a checkpoint snapshot.
pub struct ContentPipeline {
    params: JobParams,
    generator: Arc<dyn Generator>,
    gate: Arc<QualityGate>,
    max_step_retries: u32,
    plan: &'static [&'static str],
    /// Index of the next step to run.
    cursor: usize,
    /// Content accumulated across chunk/replace events.
    content: String,
    gap_analysis: Option<serde_json::Value>,
    review: Option<QualityAnalysis>,
    skip_refine: bool,
    total_cost: f64,
    queued: VecDeque<PipelineEvent>,
    finished: bool,
}

impl ContentPipeline {
    /// Start a fresh pipeline at step 0.
    pub fn new(
        params: JobParams,
        generator: Arc<dyn Generator>,
        gate: Arc<QualityGate>,
        max_step_retries: u32,
    ) -> Self {
        let plan = params.mode.step_plan();
        Self {
            params,
            generator,
            gate,
            max_step_retries,
            plan,
            cursor: 0,
            content: String::new(),
            gap_analysis: None,
            review: None,
            skip_refine: false,
            total_cost: 0.0,
            queued: VecDeque::new(),
            finished: false,
        }
    }

    /// Resume after `completed_steps` steps with the checkpointed content.
    ///
    /// Side-channel results from the skipped steps (gap analysis, review)
    /// are not part of the snapshot and will be absent from the final
    /// result of a resumed run.
    pub fn resume(
        params: JobParams,
        generator: Arc<dyn Generator>,
        gate: Arc<QualityGate>,
        max_step_retries: u32,
        completed_steps: u32,
        content: String,
    ) -> Self {
        let mut pipeline = Self::new(params, generator, gate, max_step_retries);
        pipeline.cursor = (completed_steps as usize).min(pipeline.plan.len());
        pipeline.content = content;
        pipeline
    }

    /// Content mode this pipeline was built for.
    pub fn mode(&self) -> ContentMode {
        self.params.mode
    }

    /// Yield the next pipeline event, running steps as needed.
    ///
    /// Returns `Ok(None)` once the `Complete` event has been consumed.
    /// Any `Err` is a hard failure: the caller must persist whatever
    /// content accumulated so far together with the error.
    pub async fn next_event(&mut self) -> Result<Option<PipelineEvent>, PipelineError> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                return Ok(Some(event));
            }
            if self.finished {
                return Ok(None);
            }
            if self.cursor >= self.plan.len() {
                self.queued.push_back(PipelineEvent::Complete {
                    content: None,
                    cost_usd: self.total_cost,
                    analysis: self.review.clone(),
                });
                self.finished = true;
                continue;
            }

            let index = self.cursor;
            let step = self.plan[index];
            self.cursor += 1;

            if step == STEP_REFINE && self.skip_refine {
                // Strong review; the plan slot is consumed without work.
                continue;
            }

            self.run_step(step, (index + 1) as u32).await?;
        }
    }

    /// Run one step and queue its events.
    async fn run_step(&mut self, step: &'static str, number: u32) -> Result<(), PipelineError> {
        let agent = agent_for_step(step);
        self.queued.push_back(PipelineEvent::Step {
            number,
            name: step,
            agent,
            message: format!("{agent} started"),
        });

        match step {
            STEP_ANALYZE => self.run_analyze(number).await?,
            STEP_DRAFT => self.run_draft(number).await?,
            STEP_REVIEW => self.run_review(number).await?,
            STEP_REFINE => self.run_refine(number).await?,
            STEP_FORMAT => self.run_format(number).await?,
            // Plans only contain the steps above; treat anything else as
            // a plain generation step appended to the content.
            other => {
                let pair = prompts::draft(&self.params, self.gap_analysis.as_ref());
                let outcome = self.generate(other, pair, MAX_TOKENS_DRAFT).await?;
                self.append_chunk(outcome.output.text.clone());
                self.push_step_done(other, &outcome);
            }
        }
        Ok(())
    }

    async fn run_analyze(&mut self, _number: u32) -> Result<(), PipelineError> {
        let pair = prompts::analyze(&self.params);
        let outcome = self.generate(STEP_ANALYZE, pair, MAX_TOKENS_ANALYZE).await?;

        if let Some(span) = extract_json_span(&outcome.output.text) {
            if let Ok(data) = serde_json::from_str::<serde_json::Value>(span) {
                if self.params.transcript.is_some()
                    && data["transcript_matches_topic"] == serde_json::Value::Bool(false)
                {
                    return Err(PipelineError::TopicMismatch(format!(
                        "analyzer found the transcript unrelated to '{}'",
                        self.params.topic
                    )));
                }
                self.gap_analysis = Some(data.clone());
                self.queued.push_back(PipelineEvent::GapAnalysis { data });
            }
        }
        self.push_step_done(STEP_ANALYZE, &outcome);
        Ok(())
    }

    async fn run_draft(&mut self, number: u32) -> Result<(), PipelineError> {
        let pair = prompts::draft(&self.params, self.gap_analysis.as_ref());
        let outcome = self.generate(STEP_DRAFT, pair, MAX_TOKENS_DRAFT).await?;

        self.append_chunk(outcome.output.text.clone());
        self.queued.push_back(PipelineEvent::Checkpoint {
            step_number: number,
            step_name: STEP_DRAFT,
            content: self.content.clone(),
        });
        self.push_step_done(STEP_DRAFT, &outcome);
        Ok(())
    }

    async fn run_review(&mut self, _number: u32) -> Result<(), PipelineError> {
        let pair = prompts::review(&self.content);
        let outcome = self.generate(STEP_REVIEW, pair, MAX_TOKENS_REVIEW).await?;

        match extract_json_span(&outcome.output.text)
            .and_then(|span| serde_json::from_str::<QualityAnalysis>(span).ok())
        {
            Some(analysis) => {
                self.skip_refine = analysis.scores.average() >= REFINE_SCORE_THRESHOLD;
                self.queued.push_back(PipelineEvent::Reasoning {
                    agent: agent_for_step(STEP_REVIEW),
                    text: analysis.summary.clone(),
                });
                self.review = Some(analysis);
            }
            None => {
                // An unreadable review is not fatal; refine runs to be safe.
                tracing::warn!("Review output was not parseable; scheduling refine");
                self.skip_refine = false;
            }
        }
        self.push_step_done(STEP_REVIEW, &outcome);
        Ok(())
    }

    async fn run_refine(&mut self, number: u32) -> Result<(), PipelineError> {
        let summary = self
            .review
            .as_ref()
            .map(|r| r.summary.clone())
            .unwrap_or_else(|| "No structured review was available.".to_string());
        let pair = prompts::refine(&self.content, &summary);
        let outcome = self.generate(STEP_REFINE, pair, MAX_TOKENS_REFINE).await?;

        self.content = outcome.output.text.clone();
        self.queued.push_back(PipelineEvent::Replace {
            text: outcome.output.text.clone(),
        });
        self.queued.push_back(PipelineEvent::Checkpoint {
            step_number: number,
            step_name: STEP_REFINE,
            content: self.content.clone(),
        });
        self.push_step_done(STEP_REFINE, &outcome);
        Ok(())
    }

    async fn run_format(&mut self, _number: u32) -> Result<(), PipelineError> {
        let pair = prompts::format(self.params.mode, &self.content);
        let outcome = self.generate(STEP_FORMAT, pair, MAX_TOKENS_FORMAT).await?;

        // A formatter that fails to produce JSON must not discard the
        // generated content: fall back to an explicit raw payload.
        let data = match extract_json_span(&outcome.output.text)
            .and_then(|span| serde_json::from_str::<serde_json::Value>(span).ok())
        {
            Some(value) => value,
            None => serde_json::json!({
                "raw": outcome.output.text,
                "error": "formatter output was not parseable JSON",
            }),
        };
        self.queued.push_back(PipelineEvent::Formatted { data });
        self.push_step_done(STEP_FORMAT, &outcome);
        Ok(())
    }

    /// Run one gated generation call for a step.
    async fn generate(
        &mut self,
        step: &'static str,
        pair: PromptPair,
        max_tokens: u32,
    ) -> Result<GateOutcome, PipelineError> {
        let agent = agent_for_step(step);
        let request = GenerationRequest {
            agent: agent.to_string(),
            system: pair.system,
            prompt: pair.prompt,
            max_tokens,
        };
        let generator = Arc::clone(&self.generator);

        let outcome = execute_with_validation(
            &self.gate,
            agent,
            category_for_step(step),
            self.max_step_retries,
            move || {
                let generator = Arc::clone(&generator);
                let request = request.clone();
                async move { generator.generate(&request).await }
            },
        )
        .await?;

        if let Some(cost) = outcome.output.cost_usd {
            self.total_cost += cost;
        }
        if !outcome.report.is_valid {
            // Validation exhaustion is a soft signal: accept the output,
            // surface the report through logs, and keep going.
            tracing::warn!(
                agent,
                step,
                confidence = outcome.report.confidence,
                attempts = outcome.attempts,
                "Accepting step output despite failed validation"
            );
        }
        Ok(outcome)
    }

    fn append_chunk(&mut self, text: String) {
        self.queued.push_back(PipelineEvent::Chunk { text: text.clone() });
        self.content.push_str(&text);
    }

    fn push_step_done(&mut self, step: &'static str, outcome: &GateOutcome) {
        self.queued.push_back(PipelineEvent::StepDone {
            name: step,
            agent: agent_for_step(step),
            metrics: StepMetrics {
                prompt_tokens: outcome.output.prompt_tokens,
                completion_tokens: outcome.output.completion_tokens,
                cost_usd: outcome.output.cost_usd,
                attempts: outcome.attempts,
            },
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use coursecraft_core::content::{AssignmentCounts, ContentMode};
    use coursecraft_generator::GenerationOutput;

    use super::*;

    const DRAFT_TEXT: &str = "Assignment: Photosynthesis.\n\
        1. Which pigment absorbs light? (a) chlorophyll (b) keratin. Answer: (a).\n\
        2. Describe the role of water in the light reactions in one sentence.\n\
        3. Explain how the Calvin cycle uses ATP and NADPH across a paragraph.";

    const REFINED_TEXT: &str = "Assignment (revised): Photosynthesis.\n\
        1. Which pigment absorbs light energy? (a) chlorophyll (b) keratin. Answer: (a).\n\
        2. Describe the role of water splitting in the light reactions.\n\
        3. Explain how the Calvin cycle consumes ATP and NADPH to fix carbon.";

    fn analyzer_json(matches_topic: bool) -> String {
        format!(
            "{{\"transcript_matches_topic\": {matches_topic}, \
             \"covered_subtopics\": [\"Light reactions\"], \
             \"gaps\": [{{\"subtopic\": \"Calvin cycle\", \"detail\": \"not covered\"}}]}}"
        )
    }

    fn reviewer_json(score: f64) -> String {
        format!(
            "{{\"scores\": {{\"accuracy\": {score}, \"clarity\": {score}, \
             \"completeness\": {score}, \"relevance\": {score}, \
             \"structure\": {score}, \"engagement\": {score}}}, \
             \"issues\": [], \"strengths\": [\"Clear questions\"], \
             \"summary\": \"Well-structured assignment covering the topic.\"}}"
        )
    }

    fn formatter_json() -> String {
        "{\"items\": [\
          {\"kind\": \"mcq\", \"question\": \"Which pigment absorbs light?\", \"answer\": \"chlorophyll\"}, \
          {\"kind\": \"short_answer\", \"question\": \"Role of water?\", \"answer\": \"electron source\"}, \
          {\"kind\": \"essay\", \"question\": \"Explain the Calvin cycle.\", \"answer\": \"uses ATP and NADPH\"}\
         ]}"
            .to_string()
    }

    /// Scripted backend answering by agent name; optionally fails a
    /// specific agent with a hard error.
    struct ScriptedGenerator {
        review_score: f64,
        transcript_matches: bool,
        fail_agent: Option<&'static str>,
        formatter_gibberish: bool,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new() -> Self {
            Self {
                review_score: 9.0,
                transcript_matches: true,
                fail_agent: None,
                formatter_gibberish: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn agents_called(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> Result<GenerationOutput, GeneratorError> {
            self.calls.lock().unwrap().push(request.agent.clone());
            if self.fail_agent == Some(request.agent.as_str()) {
                return Err(GeneratorError::Backend("backend exploded".to_string()));
            }
            let text = match request.agent.as_str() {
                "analyzer" => format!(
                    "Coverage analysis of the provided material follows. {}",
                    analyzer_json(self.transcript_matches)
                ),
                "drafter" => DRAFT_TEXT.to_string(),
                "reviewer" => reviewer_json(self.review_score),
                "refiner" => REFINED_TEXT.to_string(),
                "formatter" => {
                    if self.formatter_gibberish {
                        "Here are the items you asked for, hope that helps! \
                         They are listed above in plain prose."
                            .to_string()
                    } else {
                        formatter_json()
                    }
                }
                other => format!("Generic output for {other} long enough to pass the gate."),
            };
            Ok(GenerationOutput {
                text,
                prompt_tokens: Some(200),
                completion_tokens: Some(150),
                cost_usd: Some(0.02),
            })
        }
    }

    fn assignment_params() -> JobParams {
        JobParams {
            topic: "Photosynthesis".to_string(),
            subtopics: vec!["Light reactions".to_string(), "Calvin cycle".to_string()],
            mode: ContentMode::Assignment,
            transcript: Some("Today we discuss how plants turn light into sugar...".to_string()),
            assignment_counts: Some(AssignmentCounts {
                mcq: 1,
                short_answer: 1,
                essay: 1,
            }),
        }
    }

    async fn drain(
        pipeline: &mut ContentPipeline,
    ) -> Result<Vec<PipelineEvent>, PipelineError> {
        let mut events = Vec::new();
        while let Some(event) = pipeline.next_event().await? {
            events.push(event);
        }
        Ok(events)
    }

    fn pipeline_with(generator: Arc<ScriptedGenerator>) -> ContentPipeline {
        ContentPipeline::new(
            assignment_params(),
            generator,
            Arc::new(QualityGate::default()),
            1,
        )
    }

    #[tokio::test]
    async fn strong_review_skips_refine_and_formats_items() {
        let generator = Arc::new(ScriptedGenerator::new());
        let mut pipeline = pipeline_with(Arc::clone(&generator));
        let events = drain(&mut pipeline).await.unwrap();

        // No refiner call: the 9.0 review clears the threshold.
        let agents = generator.agents_called();
        assert!(agents.contains(&"drafter".to_string()));
        assert!(!agents.contains(&"refiner".to_string()));

        let formatted = events.iter().find_map(|e| match e {
            PipelineEvent::Formatted { data } => Some(data.clone()),
            _ => None,
        });
        assert_eq!(formatted.unwrap()["items"].as_array().unwrap().len(), 3);

        let complete = events.last().unwrap();
        assert_matches!(complete, PipelineEvent::Complete { analysis: Some(_), .. });
        if let PipelineEvent::Complete { cost_usd, .. } = complete {
            // analyze + draft + review + format at 0.02 each.
            assert!((cost_usd - 0.08).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn weak_review_schedules_refine_with_replace() {
        let mut generator = ScriptedGenerator::new();
        generator.review_score = 4.0;
        let generator = Arc::new(generator);
        let mut pipeline = pipeline_with(Arc::clone(&generator));
        let events = drain(&mut pipeline).await.unwrap();

        assert!(generator.agents_called().contains(&"refiner".to_string()));
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::Replace { text } if text.contains("revised"))));
    }

    #[tokio::test]
    async fn mismatched_transcript_stops_the_pipeline() {
        let mut generator = ScriptedGenerator::new();
        generator.transcript_matches = false;
        let mut pipeline = pipeline_with(Arc::new(generator));

        let mut error = None;
        loop {
            match pipeline.next_event().await {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(e) => {
                    error = Some(e);
                    break;
                }
            }
        }
        assert_matches!(error, Some(PipelineError::TopicMismatch(_)));
    }

    #[tokio::test]
    async fn backend_failure_is_a_hard_error() {
        let mut generator = ScriptedGenerator::new();
        generator.fail_agent = Some("drafter");
        let mut pipeline = pipeline_with(Arc::new(generator));

        let result = drain(&mut pipeline).await;
        assert_matches!(result, Err(PipelineError::Generation(_)));
    }

    #[tokio::test]
    async fn unparseable_formatter_output_degrades_to_raw_payload() {
        let mut generator = ScriptedGenerator::new();
        generator.formatter_gibberish = true;
        let mut pipeline = pipeline_with(Arc::new(generator));
        let events = drain(&mut pipeline).await.unwrap();

        let formatted = events.iter().find_map(|e| match e {
            PipelineEvent::Formatted { data } => Some(data.clone()),
            _ => None,
        });
        let data = formatted.unwrap();
        assert!(data["raw"].as_str().unwrap().contains("items"));
        assert!(data["error"].as_str().is_some());
        // The run still completes despite the degraded formatter output.
        assert_matches!(events.last(), Some(PipelineEvent::Complete { .. }));
    }

    #[tokio::test]
    async fn resume_skips_completed_steps() {
        let generator = Arc::new(ScriptedGenerator::new());
        let mut pipeline = ContentPipeline::resume(
            assignment_params(),
            generator.clone() as Arc<dyn Generator>,
            Arc::new(QualityGate::default()),
            1,
            2,
            DRAFT_TEXT.to_string(),
        );
        drain(&mut pipeline).await.unwrap();

        let agents = generator.agents_called();
        assert!(!agents.contains(&"analyzer".to_string()));
        assert!(!agents.contains(&"drafter".to_string()));
        assert!(agents.contains(&"reviewer".to_string()));
        assert!(agents.contains(&"formatter".to_string()));
    }

    #[tokio::test]
    async fn notes_mode_completes_without_formatted_result() {
        let generator = Arc::new(ScriptedGenerator::new());
        let mut params = assignment_params();
        params.mode = ContentMode::Notes;
        params.assignment_counts = None;
        let mut pipeline =
            ContentPipeline::new(params, generator, Arc::new(QualityGate::default()), 1);
        let events = drain(&mut pipeline).await.unwrap();

        assert!(!events
            .iter()
            .any(|e| matches!(e, PipelineEvent::Formatted { .. })));
        assert_matches!(events.last(), Some(PipelineEvent::Complete { .. }));
    }
}
