//! Named-vector collection store used by the indexing and memory engines.
//!
//! [`VectorStore`] abstracts the operations the engine consumes from the
//! vector database: named-vector collections, payload filters, upsert,
//! scroll, search, fusion queries, count and deletion. [`QdrantStore`] is
//! the production implementation; [`InMemoryVectorStore`] backs tests.

pub mod in_memory;
pub mod qdrant;
pub mod vector_store;

pub use in_memory::InMemoryVectorStore;
pub use qdrant::QdrantStore;
pub use vector_store::{
    FieldCondition, FieldValue, Prefetch, ScoredVectorPoint, ScrollPage, StoreError,
    StoredVectorPoint, VectorFilter, VectorPoint, VectorStore,
};
