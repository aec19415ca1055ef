//! Completion client for an Ollama-compatible `/api/generate` endpoint.
//!
//! Carries a longer timeout than the embedding client: generation calls
//! are slower and are always issued with bounded fan-out by callers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::Generator;
use crate::error::{LlmError, Result};
use crate::retry::send_with_retry;

const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_RETRIES: u32 = 2;
const BASE_BACKOFF: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl CompletionClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, model: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(GENERATE_TIMEOUT)
            .build()
            .map_err(LlmError::Http)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            model: model.to_owned(),
        })
    }
}

impl Generator for CompletionClient {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let response = send_with_retry("generate", MAX_RETRIES, BASE_BACKOFF, || {
            self.http
                .post(&url)
                .json(&GenerateRequest {
                    model: &self.model,
                    prompt,
                    stream: false,
                    options: GenerateOptions {
                        num_predict: max_tokens,
                    },
                })
                .send()
        })
        .await?;

        let parsed: GenerateResponse = response.json().await.map_err(LlmError::Http)?;
        if parsed.response.trim().is_empty() {
            return Err(LlmError::EmptyResponse {
                service: "generate",
            });
        }
        Ok(parsed.response)
    }
}
