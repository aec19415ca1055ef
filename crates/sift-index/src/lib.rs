//! Code intelligence for sift: grammar-based chunking, an import-derived
//! dependency graph, and incremental indexing into a named-vector store
//! with hybrid (code + description) retrieval.

pub mod chunker;
pub(crate) mod context;
pub(crate) mod data;
pub mod error;
pub mod graph;
pub mod indexer;
pub(crate) mod languages;
pub mod resolver;
pub mod search;
pub mod summary;

pub use chunker::{Chunk, ChunkRole, ChunkerConfig};
pub use error::{IndexError, Result};
pub use graph::{DepDirection, DepGraph};
pub use indexer::{Indexer, IndexerConfig, IndexReport};
pub use languages::{ChunkType, Lang, detect_language, is_indexable};
pub use resolver::ResolverConfig;
pub use search::{CodeHit, CodeQuery, SearchMode};
pub use summary::ProjectSummary;
