//! Error types for sift-memory.

/// Errors that can occur during memory operations.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Vector store error.
    #[error("store error: {0}")]
    Store(#[from] sift_store::StoreError),

    /// Embedding or completion service error.
    #[error("LLM error: {0}")]
    Llm(#[from] sift_llm::LlmError),

    /// Unknown memory type string; rejected before any I/O.
    #[error("unknown memory type: {0}")]
    InvalidType(String),

    /// Unknown scope string; rejected before any I/O.
    #[error("unknown memory scope: {0}")]
    InvalidScope(String),
}

/// Result type alias using `MemoryError`.
pub type Result<T> = std::result::Result<T, MemoryError>;
