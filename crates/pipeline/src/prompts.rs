//! Prompt assembly for each pipeline stage.
//!
//! Prompts are deliberately compact: the agents' behavioral contracts
//! (especially the JSON shapes) live here and nowhere else.

use coursecraft_core::content::{ContentMode, JobParams};

/// System and user prompt pair for one generation call.
#[derive(Debug, Clone)]
pub struct PromptPair {
    pub system: String,
    pub prompt: String,
}

fn subtopic_list(params: &JobParams) -> String {
    if params.subtopics.is_empty() {
        "(none given)".to_string()
    } else {
        params.subtopics.join(", ")
    }
}

/// Analyze the topic and (optionally) the transcript.
///
/// The analyzer must answer in JSON:
/// `{"transcript_matches_topic": bool, "covered_subtopics": [...],
///   "gaps": [{"subtopic": "...", "detail": "..."}]}`.
pub fn analyze(params: &JobParams) -> PromptPair {
    let transcript_block = match &params.transcript {
        Some(t) => format!("Transcript:\n{t}\n"),
        None => "No transcript was provided.\n".to_string(),
    };
    PromptPair {
        system: "You analyze study material coverage. Respond with a JSON object: \
                 {\"transcript_matches_topic\": bool, \"covered_subtopics\": [string], \
                 \"gaps\": [{\"subtopic\": string, \"detail\": string}]}"
            .to_string(),
        prompt: format!(
            "Topic: {}\nSubtopics: {}\n{transcript_block}\
             Identify which subtopics the material covers and which are missing.",
            params.topic,
            subtopic_list(params),
        ),
    }
}

/// Draft the content body for the requested mode.
pub fn draft(params: &JobParams, gap_analysis: Option<&serde_json::Value>) -> PromptPair {
    let gaps = match gap_analysis {
        Some(g) => format!("Coverage analysis to address:\n{g}\n"),
        None => String::new(),
    };
    let counts = match params.assignment_counts {
        Some(c) => format!(
            "Produce {} multiple-choice, {} short-answer, and {} essay questions.\n",
            c.mcq, c.short_answer, c.essay
        ),
        None => String::new(),
    };
    let shape = match params.mode {
        ContentMode::Notes => "structured lecture notes with headed sections",
        ContentMode::Assignment => "a complete assignment with numbered questions and answers",
        ContentMode::Quiz => "a quiz with numbered questions, options, and an answer key",
    };
    PromptPair {
        system: format!("You write {shape} for students. Write the full content directly."),
        prompt: format!(
            "Topic: {}\nSubtopics: {}\n{counts}{gaps}Write the content now.",
            params.topic,
            subtopic_list(params),
        ),
    }
}

/// Review and score a draft.
///
/// The reviewer must answer in JSON matching the quality-analysis shape:
/// scores (six 0-10 dimensions), issues, strengths, and a summary.
pub fn review(content: &str) -> PromptPair {
    PromptPair {
        system: "You review educational content. Respond with a JSON object: \
                 {\"scores\": {\"accuracy\": n, \"clarity\": n, \"completeness\": n, \
                 \"relevance\": n, \"structure\": n, \"engagement\": n}, \
                 \"issues\": [{\"category\": string, \"severity\": \
                 \"low\"|\"medium\"|\"high\"|\"critical\", \"agent\": string, \
                 \"description\": string, \"suggested_fix\": string, \
                 \"examples\": [string]}], \
                 \"strengths\": [string], \"summary\": string}"
            .to_string(),
        prompt: format!("Review this content:\n\n{content}"),
    }
}

/// Rewrite a draft addressing the review findings.
pub fn refine(content: &str, review_summary: &str) -> PromptPair {
    PromptPair {
        system: "You rewrite educational content to address review findings. \
                 Return the complete rewritten content, not a diff."
            .to_string(),
        prompt: format!(
            "Review findings:\n{review_summary}\n\nRewrite this content:\n\n{content}"
        ),
    }
}

/// Extract the structured items from the finished content.
///
/// The formatter must answer in JSON:
/// `{"items": [{"kind": "...", "question": "...", "answer": "..."}]}`.
pub fn format(mode: ContentMode, content: &str) -> PromptPair {
    PromptPair {
        system: format!(
            "You extract {} items into JSON. Respond with a JSON object: \
             {{\"items\": [{{\"kind\": string, \"question\": string, \
             \"answer\": string}}]}}",
            mode.as_str()
        ),
        prompt: format!("Extract every item from this content:\n\n{content}"),
    }
}
