//! REST client for the generation gateway HTTP endpoints.
//!
//! Wraps the gateway's `/v1/generate` endpoint using [`reqwest`].

use async_trait::async_trait;

use crate::{GenerationOutput, GenerationRequest, Generator, GeneratorError};

/// HTTP client for the generation gateway.
pub struct GenerationApi {
    client: reqwest::Client,
    api_url: String,
}

impl GenerationApi {
    /// Create a new API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://gateway:8080`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (useful for connection pooling across services).
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    /// Base HTTP URL of the gateway.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn parse_response(
        response: reqwest::Response,
    ) -> Result<GenerationOutput, GeneratorError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<GenerationOutput>().await?)
    }
}

#[async_trait]
impl Generator for GenerationApi {
    /// Submit one generation request.
    ///
    /// Sends a `POST /v1/generate` with the agent name, prompts, and
    /// token budget; the gateway responds synchronously with the full
    /// text plus optional token/cost counters.
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, GeneratorError> {
        let response = self
            .client
            .post(format!("{}/v1/generate", self.api_url))
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }
}
