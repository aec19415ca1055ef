//! Similarity-based consolidation of near-duplicate memories.
//!
//! Greedy single-pass clustering: each unclustered record seeds a cluster
//! and pulls in every later unclustered record whose dot product with the
//! seed meets the threshold. No re-centering, no transitive merges.
//! Singletons are left alone.

use sift_llm::{Embedder, Generator};
use sift_store::VectorStore;

use crate::error::Result;
use crate::store::{CONTENT_VECTOR, MemoryStore, RememberRequest, record_from_payload};
use crate::types::{MemoryRecord, MemoryScope, MemoryType};

const CONSOLIDATE_PAGE: u64 = 512;
const CONSOLIDATED_TAG: &str = "consolidated";

/// Outcome of a consolidation run.
#[derive(Debug, Default)]
pub struct ConsolidateReport {
    pub records_scanned: usize,
    pub clusters_found: usize,
    pub records_merged: usize,
    pub records_created: usize,
    pub dry_run: bool,
    /// One line per cluster: member count and a content snippet.
    pub preview: Vec<String>,
}

impl<S, E, G> MemoryStore<S, E, G>
where
    S: VectorStore + 'static,
    E: Embedder + Sync,
    G: Generator + Send + Sync + 'static,
{
    /// Merge clusters of similar records from the `source_type` collection
    /// into single summarized records of `target_type`. With `dry_run`,
    /// only the preview is produced and nothing is written.
    ///
    /// # Errors
    ///
    /// Returns an error if reading records, embedding, or a write fails.
    pub async fn consolidate(
        &self,
        source_type: MemoryType,
        target_type: MemoryType,
        similarity_threshold: f32,
        dry_run: bool,
    ) -> Result<ConsolidateReport> {
        let source = self.collection(source_type);
        let mut report = ConsolidateReport {
            dry_run,
            ..ConsolidateReport::default()
        };
        if !self.store.collection_exists(&source).await? {
            return Ok(report);
        }

        let page = self
            .store
            .scroll(&source, Some(self.project_filter()), CONSOLIDATE_PAGE, None, true)
            .await?;

        let mut records: Vec<(MemoryRecord, Vec<f32>)> = Vec::new();
        for point in page.points {
            let Some(vector) = point.vectors.get(CONTENT_VECTOR) else {
                continue;
            };
            if let Some(record) = record_from_payload(&point.id, &point.payload) {
                records.push((record, vector.clone()));
            }
        }
        report.records_scanned = records.len();

        let vectors: Vec<&[f32]> = records.iter().map(|(_, v)| v.as_slice()).collect();
        let clusters = cluster_by_seed(&vectors, similarity_threshold);
        report.clusters_found = clusters.len();

        for cluster in &clusters {
            let members: Vec<&MemoryRecord> = cluster.iter().map(|&i| &records[i].0).collect();
            report.records_merged += members.len();
            report.preview.push(format!(
                "{} records around \"{}\"",
                members.len(),
                snippet(&members[0].content)
            ));

            if dry_run {
                continue;
            }

            let content = members
                .iter()
                .map(|r| r.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            let importance = members
                .iter()
                .map(|r| r.importance)
                .fold(0.0_f64, f64::max);
            let mut tags: Vec<String> = members
                .iter()
                .flat_map(|r| r.tags.iter().cloned())
                .collect();
            tags.sort_unstable();
            tags.dedup();
            tags.push(CONSOLIDATED_TAG.to_owned());

            let id = self
                .insert_consolidated(target_type, &content, importance, tags)
                .await?;
            report.records_created += 1;

            let member_ids: Vec<String> = members.iter().map(|r| r.id.clone()).collect();
            self.store.delete_by_ids(&source, member_ids).await?;
            tracing::info!(
                id = %id,
                merged = members.len(),
                target = %target_type,
                "cluster consolidated"
            );
        }

        Ok(report)
    }

    /// The merged record goes through the normal remember path so it is
    /// hashed, deduplicated, and embedded fresh.
    async fn insert_consolidated(
        &self,
        target_type: MemoryType,
        content: &str,
        max_member_importance: f64,
        tags: Vec<String>,
    ) -> Result<String> {
        self.remember(RememberRequest {
            content: content.to_owned(),
            memory_type: target_type,
            scope: MemoryScope::Project,
            importance: (max_member_importance + 0.1).min(1.0),
            tags,
            expires_at: None,
        })
        .await
    }
}

/// Greedy seed clustering over index positions. Later records join the
/// first seed they match; clusters with a single member are dropped.
pub(crate) fn cluster_by_seed(vectors: &[&[f32]], threshold: f32) -> Vec<Vec<usize>> {
    let mut clustered = vec![false; vectors.len()];
    let mut clusters = Vec::new();

    for seed in 0..vectors.len() {
        if clustered[seed] {
            continue;
        }
        clustered[seed] = true;
        let mut members = vec![seed];
        for candidate in (seed + 1)..vectors.len() {
            if clustered[candidate] {
                continue;
            }
            if dot(vectors[seed], vectors[candidate]) >= threshold {
                clustered[candidate] = true;
                members.push(candidate);
            }
        }
        if members.len() > 1 {
            clusters.push(members);
        }
    }
    clusters
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn snippet(content: &str) -> String {
    let mut s: String = content.chars().take(60).collect();
    if s.len() < content.len() {
        s.push('…');
    }
    s
}
