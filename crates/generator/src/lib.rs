//! Client for the external text-generation backend.
//!
//! The pipeline talks to generation through the [`Generator`] trait so
//! tests can substitute scripted backends; the production implementation
//! is the HTTP gateway client in [`api`].

pub mod api;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One generation call for a single pipeline step.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    /// Agent issuing the request (analyzer, drafter, ...).
    pub agent: String,
    /// System prompt establishing the agent's role.
    pub system: String,
    /// User prompt for this step.
    pub prompt: String,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
}

/// Output of one generation call.
///
/// Token counts and cost are advisory; some backends omit them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationOutput {
    pub text: String,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub cost_usd: Option<f64>,
}

/// Errors from the generation backend.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The gateway returned a non-2xx status code.
    #[error("Generation gateway error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The backend reported a generation failure.
    #[error("Generation failed: {0}")]
    Backend(String),
}

/// A text-generation backend invoked once per pipeline step.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Run one generation call to completion.
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput, GeneratorError>;
}
