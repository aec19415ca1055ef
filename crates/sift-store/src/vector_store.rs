use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("collection error: {0}")]
    Collection(String),
    #[error("upsert error: {0}")]
    Upsert(String),
    #[error("search error: {0}")]
    Search(String),
    #[error("query error: {0}")]
    Query(String),
    #[error("delete error: {0}")]
    Delete(String),
    #[error("scroll error: {0}")]
    Scroll(String),
    #[error("payload error: {0}")]
    Payload(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A point to persist: one or more named vectors plus a JSON payload.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vectors: HashMap<String, Vec<f32>>,
    pub payload: HashMap<String, serde_json::Value>,
}

/// A point returned by search or fusion queries.
#[derive(Debug, Clone)]
pub struct ScoredVectorPoint {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, serde_json::Value>,
}

/// A point returned by scroll or get-by-ids, optionally with vectors.
#[derive(Debug, Clone)]
pub struct StoredVectorPoint {
    pub id: String,
    pub payload: HashMap<String, serde_json::Value>,
    pub vectors: HashMap<String, Vec<f32>>,
}

#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub must: Vec<FieldCondition>,
    pub must_not: Vec<FieldCondition>,
}

impl VectorFilter {
    #[must_use]
    pub fn must(conditions: Vec<FieldCondition>) -> Self {
        Self {
            must: conditions,
            must_not: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldCondition {
    pub field: String,
    pub value: FieldValue,
}

impl FieldCondition {
    #[must_use]
    pub fn matches(field: &str, value: FieldValue) -> Self {
        Self {
            field: field.to_owned(),
            value,
        }
    }
}

#[derive(Debug, Clone)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
    /// Substring match against a text payload field.
    TextContains(String),
}

/// One leg of a fusion query: a similarity search in a named vector space.
#[derive(Debug, Clone)]
pub struct Prefetch {
    pub vector_name: String,
    pub vector: Vec<f32>,
    pub limit: u64,
}

/// One page of a scroll; `next` is the page token to resume from.
#[derive(Debug, Default)]
pub struct ScrollPage {
    pub points: Vec<StoredVectorPoint>,
    pub next: Option<String>,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Named-vector collection store.
///
/// Implemented by the Qdrant client wrapper and by an in-memory double for
/// tests. Vector similarity math is entirely the store's concern.
pub trait VectorStore: Send + Sync {
    /// Create the collection with the given named vector sizes if missing.
    /// Idempotent.
    fn ensure_collection(
        &self,
        collection: &str,
        vector_sizes: &[(&str, u64)],
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, StoreError>>;

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Create a keyword payload index on `field`. Idempotent, best-effort.
    fn create_payload_index(
        &self,
        collection: &str,
        field: &str,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Similarity search in one named vector space.
    fn search(
        &self,
        collection: &str,
        vector_name: &str,
        vector: Vec<f32>,
        limit: u64,
        score_threshold: Option<f32>,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, StoreError>>;

    /// Fused multi-space query: run every prefetch, merge rankings with
    /// reciprocal rank fusion, return the top `limit`.
    fn query_fusion(
        &self,
        collection: &str,
        prefetches: Vec<Prefetch>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, StoreError>>;

    fn delete_by_ids(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    fn get_by_ids(
        &self,
        collection: &str,
        ids: Vec<String>,
        with_vectors: bool,
    ) -> BoxFuture<'_, Result<Vec<StoredVectorPoint>, StoreError>>;

    fn scroll(
        &self,
        collection: &str,
        filter: Option<VectorFilter>,
        limit: u64,
        offset: Option<String>,
        with_vectors: bool,
    ) -> BoxFuture<'_, Result<ScrollPage, StoreError>>;

    fn count(
        &self,
        collection: &str,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<u64, StoreError>>;

    /// Merge `payload` into the existing payload of the given points.
    fn set_payload(
        &self,
        collection: &str,
        ids: Vec<String>,
        payload: HashMap<String, serde_json::Value>,
    ) -> BoxFuture<'_, Result<(), StoreError>>;
}
