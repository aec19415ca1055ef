//! Error types for sift-index.

use std::num::TryFromIntError;

/// Errors that can occur during indexing operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error reading source files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite database error (dependency graph).
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// Migration error.
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Vector store error.
    #[error("store error: {0}")]
    Store(#[from] sift_store::StoreError),

    /// Embedding or completion service error.
    #[error("LLM error: {0}")]
    Llm(#[from] sift_llm::LlmError),

    /// Integer conversion error.
    #[error("integer conversion failed: {0}")]
    IntConversion(#[from] TryFromIntError),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
