//! Aggregate project statistics, cached until the next full index run.

use std::collections::HashMap;

use serde::Serialize;

use sift_llm::{Embedder, Generator};
use sift_store::{FieldCondition, FieldValue, VectorStore};

use crate::error::Result;
use crate::indexer::Indexer;
use crate::languages::ChunkType;

const TOP_FILES: usize = 10;

/// Snapshot of what the index currently holds for one project.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub total_chunks: u64,
    pub total_files: usize,
    pub chunks_by_type: HashMap<String, u64>,
    /// Most depended-upon files with their reverse-dependency counts.
    pub top_files: Vec<(String, usize)>,
}

impl<S, E, G> Indexer<S, E, G>
where
    S: VectorStore,
    E: Embedder + Sync,
    G: Generator + Send + Sync + 'static,
{
    /// Compute (or return the cached) project summary. The cache is
    /// invalidated by `index_all` and `clear`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store counts fail.
    pub async fn project_summary(&self) -> Result<ProjectSummary> {
        {
            let cache = self.summary_cache.lock().await;
            if let Some(summary) = cache.as_ref() {
                return Ok(summary.clone());
            }
        }

        let total_chunks = self
            .store
            .count(&self.config.collection, Some(self.project_filter()))
            .await?;

        let mut chunks_by_type = HashMap::new();
        for chunk_type in ChunkType::ALL {
            let mut filter = self.project_filter();
            filter.must.push(FieldCondition::matches(
                "chunk_type",
                FieldValue::Text(chunk_type.id().to_owned()),
            ));
            let n = self
                .store
                .count(&self.config.collection, Some(filter))
                .await?;
            if n > 0 {
                chunks_by_type.insert(chunk_type.id().to_owned(), n);
            }
        }

        let total_files = self.indexed_files().await?.len();
        let top_files = self
            .graph
            .top_files_by_rev_deps(&self.config.project_id, &[], TOP_FILES)
            .await;

        let summary = ProjectSummary {
            total_chunks,
            total_files,
            chunks_by_type,
            top_files,
        };
        *self.summary_cache.lock().await = Some(summary.clone());
        Ok(summary)
    }
}
