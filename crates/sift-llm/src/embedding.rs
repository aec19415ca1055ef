//! Batch embedding client for an Ollama-compatible `/api/embed` endpoint.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::Embedder;
use crate::error::{LlmError, Result};
use crate::retry::send_with_retry;

const EMBED_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl EmbeddingClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, model: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(EMBED_TIMEOUT)
            .build()
            .map_err(LlmError::Http)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            model: model.to_owned(),
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Embedder for EmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let response = send_with_retry("embed", MAX_RETRIES, BASE_BACKOFF, || {
            self.http
                .post(&url)
                .json(&EmbedRequest {
                    model: &self.model,
                    input: texts,
                })
                .send()
        })
        .await?;

        let parsed: EmbedResponse = response.json().await.map_err(LlmError::Http)?;
        if parsed.embeddings.len() != texts.len() {
            return Err(LlmError::BatchMismatch {
                sent: texts.len(),
                got: parsed.embeddings.len(),
            });
        }
        Ok(parsed.embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn embeds_batch_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .and(body_partial_json(serde_json::json!({"model": "m"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [[1.0, 0.0], [0.0, 1.0]]
            })))
            .mount(&server)
            .await;

        let client = EmbeddingClient::new(&server.uri(), "m").unwrap();
        let vectors = client
            .embed_batch(&["a".to_owned(), "b".to_owned()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vec![1.0, 0.0]);
        assert_eq!(vectors[1], vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn empty_batch_short_circuits() {
        let client = EmbeddingClient::new("http://localhost:1", "m").unwrap();
        let vectors = client.embed_batch(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }

    #[tokio::test]
    async fn mismatched_count_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [[1.0]]
            })))
            .mount(&server)
            .await;

        let client = EmbeddingClient::new(&server.uri(), "m").unwrap();
        let result = client.embed_batch(&["a".to_owned(), "b".to_owned()]).await;
        assert!(matches!(
            result,
            Err(LlmError::BatchMismatch { sent: 2, got: 1 })
        ));
    }

    #[tokio::test]
    async fn unknown_model_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .expect(1)
            .mount(&server)
            .await;

        let client = EmbeddingClient::new(&server.uri(), "missing").unwrap();
        let result = client.embed_batch(&["a".to_owned()]).await;
        assert!(matches!(result, Err(LlmError::Status { status: 404, .. })));
    }

    #[tokio::test]
    async fn embed_one_returns_single_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [[0.25, 0.75]]
            })))
            .mount(&server)
            .await;

        let client = EmbeddingClient::new(&server.uri(), "m").unwrap();
        let vector = client.embed_one("query").await.unwrap();
        assert_eq!(vector, vec![0.25, 0.75]);
    }
}
