//! Test-only mock embedding and completion clients.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::client::{Embedder, Generator};
use crate::error::{LlmError, Result};

/// Deterministic embedder: the vector is a pure function of the text, so
/// identical texts embed identically and similarity is stable across runs.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    pub dim: usize,
    pub fail: bool,
    calls: Arc<AtomicUsize>,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self {
            dim: 8,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Number of `embed_batch` calls issued so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut v = Vec::with_capacity(self.dim);
        for i in 0..self.dim {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            #[allow(clippy::cast_precision_loss)]
            let x = (hasher.finish() % 2000) as f32 / 1000.0 - 1.0;
            v.push(x);
        }
        v
    }
}

impl Embedder for MockEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LlmError::Other("mock embed error".into()));
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

/// Scripted completion client: pops queued responses, then falls back to a
/// default. Records every prompt it receives.
#[derive(Debug, Clone)]
pub struct MockGenerator {
    responses: Arc<Mutex<Vec<String>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    pub default_response: String,
    pub fail: bool,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            fail: false,
        }
    }
}

impl MockGenerator {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Prompts received so far, in call order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Generator for MockGenerator {
    async fn generate(&self, prompt: &str, _max_tokens: u32) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_owned());
        if self.fail {
            return Err(LlmError::Other("mock generate error".into()));
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embedder_is_deterministic() {
        let mock = MockEmbedder::new(4);
        let a = mock.embed_batch(&["same text".to_owned()]).await.unwrap();
        let b = mock.embed_batch(&["same text".to_owned()]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 4);
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn embedder_distinguishes_texts() {
        let mock = MockEmbedder::new(4);
        let v = mock
            .embed_batch(&["alpha".to_owned(), "beta".to_owned()])
            .await
            .unwrap();
        assert_ne!(v[0], v[1]);
    }

    #[tokio::test]
    async fn generator_pops_scripted_then_defaults() {
        let mock = MockGenerator::with_responses(vec!["first".into()]);
        assert_eq!(mock.generate("p1", 8).await.unwrap(), "first");
        assert_eq!(mock.generate("p2", 8).await.unwrap(), "mock response");
        assert_eq!(mock.prompts(), vec!["p1".to_owned(), "p2".to_owned()]);
    }

    #[tokio::test]
    async fn failing_variants_error() {
        let e = MockEmbedder::failing();
        assert!(e.embed_batch(&["x".to_owned()]).await.is_err());
        let g = MockGenerator::failing();
        assert!(g.generate("x", 8).await.is_err());
    }
}
