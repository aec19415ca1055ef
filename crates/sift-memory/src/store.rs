//! Memory persistence and recall.
//!
//! One collection per memory type. Each record carries a single `content`
//! vector plus the full record as payload. Recall ranks by cosine
//! similarity weighted by time decay and importance; ranking-layer
//! failures always degrade to a smaller result set instead of erroring.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use sift_llm::{Embedder, Generator};
use sift_store::{FieldCondition, FieldValue, VectorFilter, VectorPoint, VectorStore};

use crate::error::Result;
use crate::types::{MemoryHit, MemoryRecord, MemoryScope, MemoryType};

pub const CONTENT_VECTOR: &str = "content";

const MAX_CONTENT_CHARS: usize = 8192;
const LLM_FILTER_MAX_TOKENS: u32 = 200;
const PURGE_PAGE: u64 = 256;

/// Memory engine configuration.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub project_id: String,
    /// Collections are named `{prefix}_{memory_type}`.
    pub collection_prefix: String,
    /// Half-life for time decay, in days.
    pub half_life_days: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            collection_prefix: "sift_memory".to_owned(),
            half_life_days: 30.0,
        }
    }
}

/// A new fact to store.
#[derive(Debug, Clone)]
pub struct RememberRequest {
    pub content: String,
    pub memory_type: MemoryType,
    pub scope: MemoryScope,
    /// Clamped to `[0, 1]`.
    pub importance: f64,
    pub tags: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A recall query.
#[derive(Debug, Clone)]
pub struct RecallRequest {
    pub query: String,
    /// Empty means all types.
    pub memory_types: Vec<MemoryType>,
    pub scope: Option<MemoryScope>,
    /// Any overlap with a record's tags passes; empty means no tag filter.
    pub tags: Vec<String>,
    pub limit: usize,
    /// Minimum final score; hits below it are dropped.
    pub min_relevance: f64,
    /// When false, decay is fixed at 1.0 and age is ignored.
    pub apply_decay: bool,
    /// Ask the completion model to prune irrelevant hits. Degrades to
    /// keeping everything if the call or parsing fails.
    pub llm_filter: bool,
}

impl Default for RecallRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            memory_types: Vec::new(),
            scope: None,
            tags: Vec::new(),
            limit: 10,
            min_relevance: 0.0,
            apply_decay: true,
            llm_filter: false,
        }
    }
}

/// Long-term memory over a named-vector store.
pub struct MemoryStore<S, E, G> {
    pub(crate) store: Arc<S>,
    pub(crate) embedder: E,
    generator: Arc<G>,
    pub(crate) config: MemoryConfig,
}

impl<S, E, G> MemoryStore<S, E, G>
where
    S: VectorStore + 'static,
    E: Embedder + Sync,
    G: Generator + Send + Sync + 'static,
{
    pub fn new(store: S, embedder: E, generator: G, config: MemoryConfig) -> Self {
        Self {
            store: Arc::new(store),
            embedder,
            generator: Arc::new(generator),
            config,
        }
    }

    /// Expose the underlying vector store for shared access.
    #[must_use]
    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    /// Collection name for one memory type.
    #[must_use]
    pub fn collection(&self, memory_type: MemoryType) -> String {
        format!("{}_{}", self.config.collection_prefix, memory_type.id())
    }

    pub(crate) fn project_filter(&self) -> VectorFilter {
        VectorFilter::must(vec![FieldCondition::matches(
            "project_id",
            FieldValue::Text(self.config.project_id.clone()),
        )])
    }

    /// Store a fact. Content is capped, deduplicated per project by
    /// content hash; re-remembering existing content is a no-op that
    /// returns the existing id.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or the store write fails.
    pub async fn remember(&self, req: RememberRequest) -> Result<String> {
        let content = truncate_chars(&req.content, MAX_CONTENT_CHARS);
        let content_hash = blake3::hash(content.as_bytes()).to_hex().to_string();
        let collection = self.collection(req.memory_type);

        if self.store.collection_exists(&collection).await? {
            let mut filter = self.project_filter();
            filter.must.push(FieldCondition::matches(
                "content_hash",
                FieldValue::Text(content_hash.clone()),
            ));
            let page = self
                .store
                .scroll(&collection, Some(filter), 1, None, false)
                .await?;
            if let Some(existing) = page.points.first() {
                tracing::debug!(id = %existing.id, "duplicate content, returning existing record");
                return Ok(existing.id.clone());
            }
        }

        let vector = self.embedder.embed_one(&content).await?;
        let dim = u64::try_from(vector.len()).unwrap_or(u64::MAX);
        self.store
            .ensure_collection(&collection, &[(CONTENT_VECTOR, dim)])
            .await?;
        for field in ["project_id", "content_hash", "scope"] {
            self.store.create_payload_index(&collection, field).await?;
        }

        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let payload = record_payload(
            &self.config.project_id,
            &content,
            &content_hash,
            &req,
            now,
        );
        self.store
            .upsert(
                &collection,
                vec![VectorPoint {
                    id: id.clone(),
                    vectors: HashMap::from([(CONTENT_VECTOR.to_owned(), vector)]),
                    payload,
                }],
            )
            .await?;
        tracing::debug!(id = %id, memory_type = %req.memory_type, "memory stored");
        Ok(id)
    }

    /// Recall memories ranked by `similarity * (0.5 + 0.5*decay) *
    /// (0.7 + 0.3*importance)`. A failing collection is skipped, not
    /// propagated. Every surfaced hit gets a best-effort access-count bump.
    ///
    /// # Errors
    ///
    /// Returns an error only if embedding the query fails.
    pub async fn recall(&self, req: RecallRequest) -> Result<Vec<MemoryHit>> {
        let limit = if req.limit == 0 { 10 } else { req.limit };
        let vector = self.embedder.embed_one(&req.query).await?;
        let types = if req.memory_types.is_empty() {
            MemoryType::ALL.to_vec()
        } else {
            req.memory_types.clone()
        };

        let now = Utc::now();
        let mut hits: Vec<MemoryHit> = Vec::new();
        for memory_type in types {
            let collection = self.collection(memory_type);
            let mut filter = self.project_filter();
            if let Some(scope) = req.scope {
                filter
                    .must
                    .push(FieldCondition::matches("scope", FieldValue::Text(scope.id().to_owned())));
            }
            let found = match self
                .store
                .search(
                    &collection,
                    CONTENT_VECTOR,
                    vector.clone(),
                    u64::try_from(limit * 2).unwrap_or(u64::MAX),
                    None,
                    Some(filter),
                )
                .await
            {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(collection = %collection, error = %e, "memory search failed, skipping collection");
                    continue;
                }
            };

            for point in found {
                let Some(record) = record_from_payload(&point.id, &point.payload) else {
                    continue;
                };
                if record.expires_at.is_some_and(|exp| exp <= now) {
                    continue;
                }
                if !req.tags.is_empty() && !req.tags.iter().any(|t| record.tags.contains(t)) {
                    continue;
                }
                let decay = if req.apply_decay {
                    #[allow(clippy::cast_precision_loss)]
                    let age_days = (now - record.created_at).num_seconds() as f64 / 86_400.0;
                    time_decay(age_days.max(0.0), self.config.half_life_days)
                } else {
                    1.0
                };
                let final_score = final_score(point.score, decay, record.importance);
                if final_score < req.min_relevance {
                    continue;
                }
                hits.push(MemoryHit {
                    record,
                    similarity: point.score,
                    final_score,
                });
            }
        }

        hits.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
        hits.truncate(limit);

        if req.llm_filter {
            hits = self.filter_with_llm(&req.query, hits).await;
        }

        for hit in &hits {
            self.bump_access(self.collection(hit.record.memory_type), hit.record.id.clone());
        }
        Ok(hits)
    }

    /// Delete a record by id, whichever collection holds it.
    ///
    /// # Errors
    ///
    /// Returns an error if a store lookup or delete fails.
    pub async fn forget(&self, id: &str) -> Result<bool> {
        for memory_type in MemoryType::ALL {
            let collection = self.collection(memory_type);
            if !self.store.collection_exists(&collection).await? {
                continue;
            }
            let found = self
                .store
                .get_by_ids(&collection, vec![id.to_owned()], false)
                .await?;
            if !found.is_empty() {
                self.store
                    .delete_by_ids(&collection, vec![id.to_owned()])
                    .await?;
                tracing::debug!(id = %id, memory_type = %memory_type, "memory forgotten");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Delete every record whose TTL has passed. Returns the number
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns an error if a scroll or delete fails.
    pub async fn purge_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut purged = 0u64;
        for memory_type in MemoryType::ALL {
            let collection = self.collection(memory_type);
            if !self.store.collection_exists(&collection).await? {
                continue;
            }
            let mut expired: Vec<String> = Vec::new();
            let mut offset = None;
            loop {
                let page = self
                    .store
                    .scroll(&collection, Some(self.project_filter()), PURGE_PAGE, offset, false)
                    .await?;
                for point in &page.points {
                    let is_expired = point
                        .payload
                        .get("expires_at")
                        .and_then(|v| v.as_str())
                        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                        .is_some_and(|exp| exp.with_timezone(&Utc) <= now);
                    if is_expired {
                        expired.push(point.id.clone());
                    }
                }
                match page.next {
                    Some(next) => offset = Some(next),
                    None => break,
                }
            }
            if !expired.is_empty() {
                purged += u64::try_from(expired.len()).unwrap_or(u64::MAX);
                self.store.delete_by_ids(&collection, expired).await?;
            }
        }
        Ok(purged)
    }

    /// Ask the completion model which hits actually answer the query.
    /// Any failure keeps the full set.
    async fn filter_with_llm(&self, query: &str, hits: Vec<MemoryHit>) -> Vec<MemoryHit> {
        if hits.is_empty() {
            return hits;
        }
        let mut prompt = format!(
            "Given the query: \"{query}\"\n\nWhich of these memories are genuinely \
             relevant? Reply with a JSON array of the relevant indices, e.g. [0, 2].\n\n"
        );
        for (i, hit) in hits.iter().enumerate() {
            let snippet = truncate_chars(&hit.record.content, 200);
            prompt.push_str(&format!("{i}: {snippet}\n"));
        }

        match self.generator.generate(&prompt, LLM_FILTER_MAX_TOKENS).await {
            Ok(reply) => match parse_indices(&reply) {
                Some(keep) => hits
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| keep.contains(i))
                    .map(|(_, h)| h)
                    .collect(),
                None => {
                    tracing::warn!("unparseable relevance reply, keeping all hits");
                    hits
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "relevance filter failed, keeping all hits");
                hits
            }
        }
    }

    /// Fire-and-forget access-count increment; never fails the caller.
    fn bump_access(&self, collection: String, id: String) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let Ok(points) = store.get_by_ids(&collection, vec![id.clone()], false).await else {
                return;
            };
            let Some(point) = points.first() else {
                return;
            };
            let count = point
                .payload
                .get("access_count")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0);
            let payload = HashMap::from([
                ("access_count".to_owned(), serde_json::json!(count + 1)),
                ("updated_at".to_owned(), serde_json::json!(Utc::now().to_rfc3339())),
            ]);
            if let Err(e) = store.set_payload(&collection, vec![id], payload).await {
                tracing::debug!(error = %e, "access count bump failed");
            }
        });
    }
}

/// `2^(-age/halfLife)`: 1.0 now, 0.5 after one half-life.
pub(crate) fn time_decay(age_days: f64, half_life_days: f64) -> f64 {
    if half_life_days <= 0.0 {
        return 1.0;
    }
    2f64.powf(-age_days / half_life_days)
}

pub(crate) fn final_score(similarity: f32, decay: f64, importance: f64) -> f64 {
    f64::from(similarity) * (0.5 + 0.5 * decay) * (0.7 + 0.3 * importance)
}

fn record_payload(
    project_id: &str,
    content: &str,
    content_hash: &str,
    req: &RememberRequest,
    now: DateTime<Utc>,
) -> HashMap<String, serde_json::Value> {
    let mut payload = HashMap::from([
        ("project_id".to_owned(), serde_json::json!(project_id)),
        ("content".to_owned(), serde_json::json!(content)),
        ("content_hash".to_owned(), serde_json::json!(content_hash)),
        ("memory_type".to_owned(), serde_json::json!(req.memory_type.id())),
        ("scope".to_owned(), serde_json::json!(req.scope.id())),
        ("importance".to_owned(), serde_json::json!(req.importance.clamp(0.0, 1.0))),
        ("tags".to_owned(), serde_json::json!(req.tags)),
        ("created_at".to_owned(), serde_json::json!(now.to_rfc3339())),
        ("updated_at".to_owned(), serde_json::json!(now.to_rfc3339())),
        ("access_count".to_owned(), serde_json::json!(0)),
    ]);
    if let Some(exp) = req.expires_at {
        payload.insert("expires_at".to_owned(), serde_json::json!(exp.to_rfc3339()));
    }
    payload
}

pub(crate) fn record_from_payload(
    id: &str,
    payload: &HashMap<String, serde_json::Value>,
) -> Option<MemoryRecord> {
    let text = |key: &str| payload.get(key)?.as_str().map(ToOwned::to_owned);
    let date = |key: &str| {
        payload
            .get(key)
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
    };
    Some(MemoryRecord {
        id: id.to_owned(),
        content: text("content")?,
        memory_type: text("memory_type")?.parse().ok()?,
        scope: text("scope")?.parse().ok()?,
        importance: payload.get("importance").and_then(serde_json::Value::as_f64)?,
        tags: payload
            .get("tags")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default(),
        content_hash: text("content_hash").unwrap_or_default(),
        created_at: date("created_at")?,
        updated_at: date("updated_at").unwrap_or_else(Utc::now),
        expires_at: date("expires_at"),
        access_count: payload
            .get("access_count")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0),
    })
}

/// The model's index list, parsed from the first bracketed run in the
/// reply. `None` means "keep everything".
fn parse_indices(reply: &str) -> Option<Vec<usize>> {
    let start = reply.find('[')?;
    let end = reply[start..].find(']')? + start;
    serde_json::from_str(&reply[start..=end]).ok()
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => s[..i].to_owned(),
        None => s.to_owned(),
    }
}
