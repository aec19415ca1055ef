//! HTTP clients for the embedding and completion services.
//!
//! Both speak plain JSON to Ollama-compatible endpoints. Transient upstream
//! failures are retried with linear backoff; non-retryable statuses (an
//! unknown model, a bad request) fail immediately.

pub mod client;
pub mod completion;
pub mod embedding;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod retry;

pub use client::{Embedder, Generator};
pub use completion::CompletionClient;
pub use embedding::EmbeddingClient;
pub use error::{LlmError, Result};
