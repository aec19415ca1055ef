use std::future::Future;

use crate::error::Result;

/// Batch text embedding service.
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input, in input order.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream call fails after retries.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send;

    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream call fails after retries.
    fn embed_one(&self, text: &str) -> impl Future<Output = Result<Vec<f32>>> + Send {
        async move {
            let mut vectors = self.embed_batch(std::slice::from_ref(&text.to_owned())).await?;
            vectors
                .pop()
                .ok_or(crate::error::LlmError::EmptyResponse { service: "embed" })
        }
    }
}

/// Text completion service.
pub trait Generator: Send + Sync {
    /// Generate a completion for `prompt`, bounded by `max_tokens`.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream call fails after retries.
    fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
    ) -> impl Future<Output = Result<String>> + Send;
}
