//! Long-term knowledge memory for sift: typed records with time-decay
//! ranking, deduplication, TTL expiry, and similarity-based consolidation,
//! persisted in a named-vector store.

pub mod consolidate;
pub mod error;
pub mod store;
pub mod types;

pub use consolidate::ConsolidateReport;
pub use error::{MemoryError, Result};
pub use store::{MemoryConfig, MemoryStore, RecallRequest, RememberRequest};
pub use types::{MemoryHit, MemoryRecord, MemoryScope, MemoryType};
