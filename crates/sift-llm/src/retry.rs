use std::future::Future;
use std::time::Duration;

use crate::error::LlmError;

/// Send an HTTP request, retrying transient failures with linear backoff.
///
/// Transient means a connect/timeout error, a 429 or a 5xx response. Any
/// other non-success status is treated as non-retryable (for example a 404
/// for an unknown model) and fails immediately. The delay before attempt
/// `n` is `base_delay * n`.
///
/// # Errors
///
/// Returns [`LlmError::RetriesExhausted`] once `max_retries` transient
/// failures have been consumed, or [`LlmError::Status`] for a
/// non-retryable response.
pub(crate) async fn send_with_retry<F, Fut>(
    service: &'static str,
    max_retries: u32,
    base_delay: Duration,
    mut f: F,
) -> Result<reqwest::Response, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    for attempt in 0..=max_retries {
        let delay = base_delay * attempt;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let response = match f().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() || e.is_connect() => {
                tracing::warn!(
                    service,
                    attempt,
                    error = %e,
                    "transient transport failure"
                );
                continue;
            }
            Err(e) => return Err(LlmError::Http(e)),
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status.as_u16() == 429 || status.is_server_error() {
            tracing::warn!(service, attempt, status = status.as_u16(), "retryable status");
            continue;
        }

        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Status {
            service,
            status: status.as_u16(),
            body,
        });
    }

    Err(LlmError::RetriesExhausted { service })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn success_on_first_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/ping", server.uri());
        let result = send_with_retry("test", 2, Duration::ZERO, || client.get(&url).send()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn retries_on_server_error_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/ping", server.uri());
        let result = send_with_retry("test", 2, Duration::ZERO, || client.get(&url).send()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn non_retryable_status_fails_fast() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/ping", server.uri());
        let result = send_with_retry("test", 3, Duration::ZERO, || client.get(&url).send()).await;
        match result {
            Err(LlmError::Status { status, body, .. }) => {
                assert_eq!(status, 404);
                assert!(body.contains("model not found"));
            }
            other => panic!("expected non-retryable status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/ping", server.uri());
        let result = send_with_retry("test", 1, Duration::ZERO, || client.get(&url).send()).await;
        assert!(matches!(result, Err(LlmError::RetriesExhausted { .. })));
    }
}
