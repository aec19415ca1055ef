#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} retries exhausted")]
    RetriesExhausted { service: &'static str },

    #[error("empty response from {service}")]
    EmptyResponse { service: &'static str },

    #[error("batch size mismatch: sent {sent}, got {got}")]
    BatchMismatch { sent: usize, got: usize },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, LlmError>;
