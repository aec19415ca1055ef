//! Code search over the indexed chunks.

use sift_llm::{Embedder, Generator};
use sift_store::{FieldCondition, FieldValue, Prefetch, VectorStore};

use crate::error::Result;
use crate::indexer::{CODE_VECTOR, DESCRIPTION_VECTOR, Indexer};
use crate::languages::ChunkType;

/// Which vector space(s) a query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Code vector space only.
    Code,
    /// Description vector space only.
    Semantic,
    /// Fused ranking over both spaces.
    #[default]
    Hybrid,
}

/// A code search request.
#[derive(Debug, Clone, Default)]
pub struct CodeQuery {
    pub text: String,
    pub mode: SearchMode,
    pub limit: u64,
    /// Substring match against `file_path`.
    pub path_contains: Option<String>,
    pub chunk_type: Option<ChunkType>,
    /// Minimum cosine score; applied in non-hybrid modes only, because
    /// fused scores are rank-based and not comparable to cosine.
    pub min_score: Option<f32>,
}

/// One search result.
#[derive(Debug, Clone)]
pub struct CodeHit {
    pub id: String,
    pub score: f32,
    pub file_path: String,
    pub chunk_type: String,
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
    pub description: Option<String>,
}

impl<S, E, G> Indexer<S, E, G>
where
    S: VectorStore,
    E: Embedder + Sync,
    G: Generator + Send + Sync + 'static,
{
    /// Search indexed chunks. Hybrid mode degrades to code-only search if
    /// the fused query fails, e.g. against an index built before the
    /// description space existed.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding the query or the store search fails.
    pub async fn search_code(&self, query: &CodeQuery) -> Result<Vec<CodeHit>> {
        let limit = if query.limit == 0 { 10 } else { query.limit };
        let vector = self.embedder.embed_one(&query.text).await?;
        let filter = self.search_filter(query);

        let hits = match query.mode {
            SearchMode::Code => {
                self.store
                    .search(
                        &self.config.collection,
                        CODE_VECTOR,
                        vector,
                        limit,
                        query.min_score,
                        Some(filter),
                    )
                    .await?
            }
            SearchMode::Semantic => {
                self.store
                    .search(
                        &self.config.collection,
                        DESCRIPTION_VECTOR,
                        vector,
                        limit,
                        query.min_score,
                        Some(filter),
                    )
                    .await?
            }
            SearchMode::Hybrid => {
                let prefetches = vec![
                    Prefetch {
                        vector_name: CODE_VECTOR.to_owned(),
                        vector: vector.clone(),
                        limit: limit * 2,
                    },
                    Prefetch {
                        vector_name: DESCRIPTION_VECTOR.to_owned(),
                        vector: vector.clone(),
                        limit: limit * 2,
                    },
                ];
                match self
                    .store
                    .query_fusion(&self.config.collection, prefetches, limit, Some(filter.clone()))
                    .await
                {
                    Ok(hits) => hits,
                    Err(e) => {
                        tracing::warn!(error = %e, "fusion query failed, falling back to code search");
                        self.store
                            .search(
                                &self.config.collection,
                                CODE_VECTOR,
                                vector,
                                limit,
                                None,
                                Some(filter),
                            )
                            .await?
                    }
                }
            }
        };

        Ok(hits.into_iter().map(|h| to_hit(h.id, h.score, &h.payload)).collect())
    }

    fn search_filter(&self, query: &CodeQuery) -> sift_store::VectorFilter {
        let mut filter = self.project_filter();
        if let Some(path) = &query.path_contains {
            filter
                .must
                .push(FieldCondition::matches("file_path", FieldValue::TextContains(path.clone())));
        }
        if let Some(chunk_type) = query.chunk_type {
            filter.must.push(FieldCondition::matches(
                "chunk_type",
                FieldValue::Text(chunk_type.id().to_owned()),
            ));
        }
        filter
    }
}

fn to_hit(
    id: String,
    score: f32,
    payload: &std::collections::HashMap<String, serde_json::Value>,
) -> CodeHit {
    let str_field = |key: &str| {
        payload
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_owned()
    };
    let line_field = |key: &str| {
        payload
            .get(key)
            .and_then(serde_json::Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or_default()
    };
    CodeHit {
        id,
        score,
        file_path: str_field("file_path"),
        chunk_type: str_field("chunk_type"),
        name: str_field("name"),
        start_line: line_field("start_line"),
        end_line: line_field("end_line"),
        content: str_field("content"),
        description: payload
            .get("description")
            .and_then(|v| v.as_str())
            .map(ToOwned::to_owned),
    }
}
