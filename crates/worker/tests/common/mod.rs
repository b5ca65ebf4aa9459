//! Shared fixtures for worker integration tests.
//!
//! Provides a scripted [`Generator`] that answers by agent name plus
//! helpers that wire the queue/runner services the same way `main.rs`
//! does, so tests exercise the production composition.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use coursecraft_core::content::{AssignmentCounts, ContentMode, JobParams};
use coursecraft_core::quality_gate::QualityGate;
use coursecraft_generator::{GenerationOutput, GenerationRequest, Generator, GeneratorError};
use coursecraft_worker::{FeedbackAggregator, JobQueue, JobRunner};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

/// Draft body long enough to clear the quality gate.
pub const DRAFT_TEXT: &str = "Assignment: Photosynthesis.\n\
    1. Which pigment absorbs light? (a) chlorophyll (b) keratin. Answer: (a).\n\
    2. Describe the role of water in the light reactions in one sentence.\n\
    3. Explain how the Calvin cycle uses ATP and NADPH across a paragraph.";

/// Per-step cost the mock reports.
pub const STEP_COST: f64 = 0.02;

/// Scripted generation backend keyed by agent name.
///
/// Optionally cancels a token when a given agent is invoked (to simulate
/// a cancellation arriving while a call is in flight) or fails hard for
/// a given agent.
pub struct MockGenerator {
    pub review_score: f64,
    pub fail_agent: Option<&'static str>,
    cancel_on_agent: Mutex<Option<(String, CancellationToken)>>,
    calls: Mutex<Vec<String>>,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self {
            review_score: 9.0,
            fail_agent: None,
            cancel_on_agent: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockGenerator {
    /// Trigger `token` when `agent` is next invoked.
    pub fn cancel_when(&self, agent: &str, token: CancellationToken) {
        *self.cancel_on_agent.lock().unwrap() = Some((agent.to_string(), token));
    }

    pub fn agents_called(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn response_for(&self, agent: &str) -> String {
        match agent {
            "analyzer" => "Coverage analysis of the provided material follows. \
                 {\"transcript_matches_topic\": true, \
                 \"covered_subtopics\": [\"Light reactions\"], \
                 \"gaps\": [{\"subtopic\": \"Calvin cycle\", \"detail\": \"not covered\"}]}"
                .to_string(),
            "drafter" => DRAFT_TEXT.to_string(),
            "reviewer" => format!(
                "{{\"scores\": {{\"accuracy\": {s}, \"clarity\": {s}, \
                 \"completeness\": {s}, \"relevance\": {s}, \
                 \"structure\": {s}, \"engagement\": {s}}}, \
                 \"issues\": [], \"strengths\": [\"Clear questions\"], \
                 \"summary\": \"Well-structured assignment covering the topic.\"}}",
                s = self.review_score
            ),
            "refiner" => format!("{DRAFT_TEXT}\n(Revised to address review findings.)"),
            "formatter" => "{\"items\": [\
                {\"kind\": \"mcq\", \"question\": \"Which pigment absorbs light?\", \"answer\": \"chlorophyll\"}, \
                {\"kind\": \"short_answer\", \"question\": \"Role of water?\", \"answer\": \"electron source\"}, \
                {\"kind\": \"essay\", \"question\": \"Explain the Calvin cycle.\", \"answer\": \"uses ATP and NADPH\"}\
               ]}"
                .to_string(),
            other => format!("Generic output for {other} long enough to pass the gate."),
        }
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, GeneratorError> {
        self.calls.lock().unwrap().push(request.agent.clone());

        if let Some((agent, token)) = self.cancel_on_agent.lock().unwrap().as_ref() {
            if *agent == request.agent {
                token.cancel();
            }
        }
        if self.fail_agent == Some(request.agent.as_str()) {
            return Err(GeneratorError::Backend("backend exploded".to_string()));
        }

        Ok(GenerationOutput {
            text: self.response_for(&request.agent),
            prompt_tokens: Some(200),
            completion_tokens: Some(150),
            cost_usd: Some(STEP_COST),
        })
    }
}

/// Standard assignment submission used across tests.
pub fn assignment_params() -> JobParams {
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

/// Wire queue + runner the same way the worker binary does.
pub fn services(pool: PgPool, generator: Arc<MockGenerator>) -> (Arc<JobQueue>, Arc<JobRunner>) {
    let queue = Arc::new(JobQueue::new(pool.clone()));
    let aggregator = Arc::new(FeedbackAggregator::new(pool));
    let runner = Arc::new(JobRunner::new(
        Arc::clone(&queue),
        generator,
        Arc::new(QualityGate::default()),
        aggregator,
        1,
    ));
    (queue, runner)
}
