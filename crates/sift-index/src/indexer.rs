//! Incremental indexing orchestrator: walk → hash check → chunk → resolve
//! deps → embed → upsert.
//!
//! Each file runs its full pipeline to completion before the next starts.
//! The vector store owns consistency; a re-index replaces a file's points
//! wholesale (delete then upsert) rather than diffing.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use uuid::Uuid;

use sift_llm::{Embedder, Generator};
use sift_store::{FieldCondition, FieldValue, VectorFilter, VectorPoint, VectorStore};

use crate::chunker::{self, Chunk, ChunkRole, ChunkerConfig};
use crate::context::{build_embedding_text, description_prompt};
use crate::error::Result;
use crate::graph::DepGraph;
use crate::languages::is_indexable;
use crate::resolver::{self, ResolverConfig};
use crate::summary::ProjectSummary;

pub const CODE_VECTOR: &str = "code";
pub const DESCRIPTION_VECTOR: &str = "description";
pub const DEFAULT_COLLECTION: &str = "sift_code_chunks";

const DESCRIPTION_MAX_TOKENS: u32 = 120;
const SCROLL_PAGE: u64 = 256;

/// Indexer configuration.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub project_id: String,
    pub collection: String,
    /// Texts per embedding HTTP call.
    pub embed_batch_size: usize,
    /// Worker count for description generation.
    pub describe_concurrency: usize,
    /// Generate descriptions for regular and child chunks too, not just
    /// parents.
    pub describe_all: bool,
    pub chunker: ChunkerConfig,
    pub resolver: ResolverConfig,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            collection: DEFAULT_COLLECTION.to_owned(),
            embed_batch_size: 32,
            describe_concurrency: 4,
            describe_all: false,
            chunker: ChunkerConfig::default(),
            resolver: ResolverConfig::default(),
        }
    }
}

/// Summary of an indexing run.
#[derive(Debug, Default)]
pub struct IndexReport {
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub files_unchanged: usize,
    pub files_removed: usize,
    pub chunks_written: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// Orchestrates indexing over a project tree.
pub struct Indexer<S, E, G> {
    pub(crate) store: S,
    pub(crate) embedder: E,
    generator: Arc<G>,
    pub(crate) graph: DepGraph,
    pub(crate) config: IndexerConfig,
    pub(crate) summary_cache: Mutex<Option<ProjectSummary>>,
}

impl<S, E, G> Indexer<S, E, G>
where
    S: VectorStore,
    E: Embedder + Sync,
    G: Generator + Send + Sync + 'static,
{
    pub fn new(store: S, embedder: E, generator: G, graph: DepGraph, config: IndexerConfig) -> Self {
        Self {
            store,
            embedder,
            generator: Arc::new(generator),
            graph,
            config,
            summary_cache: Mutex::new(None),
        }
    }

    /// Expose the underlying vector store for shared read access.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Expose the dependency graph for direct traversal queries.
    #[must_use]
    pub fn graph(&self) -> &DepGraph {
        &self.graph
    }

    /// Probe the embedder for the vector dimension and create the
    /// collection plus payload indexes. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe or collection setup fails.
    pub async fn ensure_collection(&self) -> Result<()> {
        let probe = self.embedder.embed_one("dimension probe").await?;
        let dim = u64::try_from(probe.len())?;
        self.store
            .ensure_collection(
                &self.config.collection,
                &[(CODE_VECTOR, dim), (DESCRIPTION_VECTOR, dim)],
            )
            .await?;
        for field in ["project_id", "file_path", "chunk_type", "role"] {
            self.store
                .create_payload_index(&self.config.collection, field)
                .await?;
        }
        Ok(())
    }

    /// Index the whole tree under `root` with incremental change detection
    /// and stale-file cleanup.
    ///
    /// # Errors
    ///
    /// Returns an error if collection setup fails; per-file errors are
    /// collected into the report instead.
    pub async fn index_all(&self, root: &Path) -> Result<IndexReport> {
        let start = std::time::Instant::now();
        let mut report = IndexReport::default();

        self.ensure_collection().await?;

        let entries: Vec<_> = ignore::WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .build()
            .flatten()
            .filter(|e| e.file_type().is_some_and(|ft| ft.is_file()) && is_indexable(e.path()))
            .collect();

        let total = entries.len();
        tracing::info!(total, project = %self.config.project_id, "indexing started");

        let mut current_files: HashSet<String> = HashSet::new();

        for (i, entry) in entries.iter().enumerate() {
            report.files_scanned += 1;
            let rel_path = rel_path(root, entry.path());
            current_files.insert(rel_path.clone());

            match self.index_file(entry.path(), root).await {
                Ok(0) => report.files_unchanged += 1,
                Ok(written) => {
                    report.files_indexed += 1;
                    report.chunks_written += written;
                    tracing::info!(
                        file = %rel_path,
                        progress = format_args!("{}/{total}", i + 1),
                        written,
                    );
                }
                Err(e) => report.errors.push(format!("{rel_path}: {e}")),
            }
        }

        // Points for files that no longer exist on disk.
        match self.indexed_files().await {
            Ok(indexed) => {
                for old_file in indexed.difference(&current_files) {
                    match self.delete_file(old_file).await {
                        Ok(()) => report.files_removed += 1,
                        Err(e) => report.errors.push(format!("cleanup {old_file}: {e}")),
                    }
                }
            }
            Err(e) => report.errors.push(format!("cleanup scan: {e}")),
        }

        *self.summary_cache.lock().await = None;

        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        tracing::info!(
            indexed = report.files_indexed,
            unchanged = report.files_unchanged,
            removed = report.files_removed,
            errors = report.errors.len(),
            "indexing finished"
        );
        Ok(report)
    }

    /// Index one file. Returns the number of chunks written; zero means
    /// the file was unchanged or produced no chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if reading, embedding, or storage fails.
    pub async fn index_file(&self, abs_path: &Path, root: &Path) -> Result<usize> {
        let rel = rel_path(root, abs_path);
        let source = tokio::fs::read_to_string(abs_path).await?;
        let file_hash = blake3::hash(source.as_bytes()).to_hex().to_string();

        if self.stored_file_hash(&rel).await? == Some(file_hash.clone()) {
            tracing::debug!(file = %rel, "unchanged, skipping");
            return Ok(0);
        }

        let chunks = chunker::parse(&rel, &source, &self.config.chunker);

        // The file changed, so its stored points are stale even when the
        // new content yields no chunks at all.
        self.store
            .delete_by_filter(&self.config.collection, self.file_filter(&rel))
            .await?;

        if chunks.is_empty() {
            self.graph
                .set_deps(&self.config.project_id, &rel, &[])
                .await?;
            return Ok(0);
        }

        let resolved = resolver::resolve_all(&self.config.resolver, &rel, &chunks[0].imports);
        self.graph
            .set_deps(&self.config.project_id, &rel, &resolved)
            .await?;

        let ids: Vec<String> = chunks.iter().map(|_| Uuid::new_v4().to_string()).collect();
        let parent_ids: HashMap<String, String> = chunks
            .iter()
            .zip(&ids)
            .filter(|(c, _)| c.role == ChunkRole::Parent)
            .map(|(c, id)| (c.key(), id.clone()))
            .collect();
        let mut children_ids: HashMap<String, Vec<String>> = HashMap::new();
        for (chunk, id) in chunks.iter().zip(&ids) {
            if let Some(parent_id) = chunk.parent_key.as_ref().and_then(|k| parent_ids.get(k)) {
                children_ids.entry(parent_id.clone()).or_default().push(id.clone());
            }
        }

        // Parents carry only a description vector, so their code text is
        // never embedded.
        let code_jobs: Vec<(usize, String)> = chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.role != ChunkRole::Parent)
            .map(|(i, c)| (i, build_embedding_text(c)))
            .collect();
        let code_vectors = self.embed_jobs(&code_jobs, chunks.len()).await;

        let desc_jobs: Vec<(usize, String)> = chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.role == ChunkRole::Parent || self.config.describe_all)
            .map(|(i, c)| (i, description_prompt(c)))
            .collect();
        let descriptions = self.generate_descriptions(desc_jobs, chunks.len()).await;

        let desc_embed_jobs: Vec<(usize, String)> = descriptions
            .iter()
            .enumerate()
            .filter(|(i, d)| d.is_some() && chunks[*i].role != ChunkRole::Child)
            .map(|(i, d)| (i, d.clone().unwrap_or_default()))
            .collect();
        let desc_vectors = self.embed_jobs(&desc_embed_jobs, chunks.len()).await;

        let mut points = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let mut vectors = HashMap::new();
            if let Some(v) = &code_vectors[i] {
                vectors.insert(CODE_VECTOR.to_owned(), v.clone());
            }
            if let Some(v) = &desc_vectors[i] {
                vectors.insert(DESCRIPTION_VECTOR.to_owned(), v.clone());
            }
            if vectors.is_empty() {
                tracing::warn!(file = %rel, name = %chunk.name, "no vectors produced, dropping chunk");
                continue;
            }
            points.push(VectorPoint {
                id: ids[i].clone(),
                vectors,
                payload: self.chunk_payload(
                    chunk,
                    &file_hash,
                    descriptions[i].as_deref(),
                    chunk.parent_key.as_ref().and_then(|k| parent_ids.get(k)),
                    children_ids.get(&ids[i]),
                ),
            });
        }

        let written = points.len();
        if written > 0 {
            self.store.upsert(&self.config.collection, points).await?;
        }
        tracing::debug!(file = %rel, written, "file indexed");
        Ok(written)
    }

    /// Remove a deleted file's points and its outgoing dependency edges.
    ///
    /// # Errors
    ///
    /// Returns an error if the store delete fails.
    pub async fn delete_file(&self, rel_path: &str) -> Result<()> {
        self.store
            .delete_by_filter(&self.config.collection, self.file_filter(rel_path))
            .await?;
        self.graph
            .remove_file(&self.config.project_id, rel_path)
            .await?;
        Ok(())
    }

    /// Drop everything this project has indexed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store delete fails.
    pub async fn clear(&self) -> Result<()> {
        self.store
            .delete_by_filter(&self.config.collection, self.project_filter())
            .await?;
        self.graph.clear(&self.config.project_id).await?;
        *self.summary_cache.lock().await = None;
        Ok(())
    }

    pub(crate) fn project_filter(&self) -> VectorFilter {
        VectorFilter::must(vec![FieldCondition::matches(
            "project_id",
            FieldValue::Text(self.config.project_id.clone()),
        )])
    }

    fn file_filter(&self, rel_path: &str) -> VectorFilter {
        VectorFilter::must(vec![
            FieldCondition::matches("project_id", FieldValue::Text(self.config.project_id.clone())),
            FieldCondition::matches("file_path", FieldValue::Text(rel_path.to_owned())),
        ])
    }

    async fn stored_file_hash(&self, rel_path: &str) -> Result<Option<String>> {
        if !self.store.collection_exists(&self.config.collection).await? {
            return Ok(None);
        }
        let page = self
            .store
            .scroll(
                &self.config.collection,
                Some(self.file_filter(rel_path)),
                1,
                None,
                false,
            )
            .await?;
        Ok(page
            .points
            .first()
            .and_then(|p| p.payload.get("file_hash"))
            .and_then(|v| v.as_str())
            .map(ToOwned::to_owned))
    }

    /// Every file path currently holding points for this project.
    pub(crate) async fn indexed_files(&self) -> Result<HashSet<String>> {
        let mut files = HashSet::new();
        let mut offset = None;
        loop {
            let page = self
                .store
                .scroll(
                    &self.config.collection,
                    Some(self.project_filter()),
                    SCROLL_PAGE,
                    offset,
                    false,
                )
                .await?;
            for point in &page.points {
                if let Some(path) = point.payload.get("file_path").and_then(|v| v.as_str()) {
                    files.insert(path.to_owned());
                }
            }
            match page.next {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(files)
    }

    /// Batched embedding with per-item fallback: a failed batch is retried
    /// one item at a time, and a failed item becomes `None` rather than
    /// failing the file. Results align with chunk indices.
    async fn embed_jobs(&self, jobs: &[(usize, String)], total: usize) -> Vec<Option<Vec<f32>>> {
        let mut out = vec![None; total];
        for batch in jobs.chunks(self.config.embed_batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|(_, t)| t.clone()).collect();
            match self.embedder.embed_batch(&texts).await {
                Ok(vectors) => {
                    for ((idx, _), vector) in batch.iter().zip(vectors) {
                        out[*idx] = Some(vector);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "batch embedding failed, retrying items individually");
                    for (idx, text) in batch {
                        match self.embedder.embed_one(text).await {
                            Ok(vector) => out[*idx] = Some(vector),
                            Err(e) => tracing::warn!(error = %e, "item embedding failed"),
                        }
                    }
                }
            }
        }
        out
    }

    /// Fixed-size worker pool over a shared cursor; a slow generation call
    /// delays one worker, not the whole file. Failed items become `None`.
    async fn generate_descriptions(
        &self,
        jobs: Vec<(usize, String)>,
        total: usize,
    ) -> Vec<Option<String>> {
        if jobs.is_empty() {
            return vec![None; total];
        }
        let workers = self.config.describe_concurrency.clamp(1, jobs.len());
        let jobs = Arc::new(jobs);
        let cursor = Arc::new(AtomicUsize::new(0));
        let results = Arc::new(Mutex::new(vec![None; total]));

        let mut set = JoinSet::new();
        for _ in 0..workers {
            let jobs = Arc::clone(&jobs);
            let cursor = Arc::clone(&cursor);
            let results = Arc::clone(&results);
            let generator = Arc::clone(&self.generator);
            set.spawn(async move {
                loop {
                    let i = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some((idx, prompt)) = jobs.get(i) else {
                        break;
                    };
                    match generator.generate(prompt, DESCRIPTION_MAX_TOKENS).await {
                        Ok(text) => results.lock().await[*idx] = Some(text),
                        Err(e) => {
                            tracing::warn!(error = %e, "description generation failed, skipping chunk");
                        }
                    }
                }
            });
        }
        while set.join_next().await.is_some() {}

        let mut guard = results.lock().await;
        std::mem::take(&mut *guard)
    }

    fn chunk_payload(
        &self,
        chunk: &Chunk,
        file_hash: &str,
        description: Option<&str>,
        parent_id: Option<&String>,
        children: Option<&Vec<String>>,
    ) -> HashMap<String, serde_json::Value> {
        let mut payload = HashMap::from([
            ("project_id".to_owned(), serde_json::json!(self.config.project_id)),
            ("file_path".to_owned(), serde_json::json!(chunk.file_path)),
            ("file_hash".to_owned(), serde_json::json!(file_hash)),
            ("content".to_owned(), serde_json::json!(chunk.content)),
            ("chunk_type".to_owned(), serde_json::json!(chunk.chunk_type.id())),
            ("name".to_owned(), serde_json::json!(chunk.name)),
            ("signature".to_owned(), serde_json::json!(chunk.signature)),
            ("start_line".to_owned(), serde_json::json!(chunk.start_line)),
            ("end_line".to_owned(), serde_json::json!(chunk.end_line)),
            ("language".to_owned(), serde_json::json!(chunk.language.id())),
            ("doc".to_owned(), serde_json::json!(chunk.doc)),
            ("imports".to_owned(), serde_json::json!(chunk.imports)),
            ("role".to_owned(), serde_json::json!(chunk.role.id())),
            ("is_parent".to_owned(), serde_json::json!(chunk.role == ChunkRole::Parent)),
        ]);
        if let Some(d) = description {
            payload.insert("description".to_owned(), serde_json::json!(d));
        }
        if let Some(p) = parent_id {
            payload.insert("parent_id".to_owned(), serde_json::json!(p));
        }
        if let Some(c) = children {
            payload.insert("children_ids".to_owned(), serde_json::json!(c));
        }
        payload
    }
}

fn rel_path(root: &Path, abs: &Path) -> String {
    abs.strip_prefix(root)
        .unwrap_or(abs)
        .to_string_lossy()
        .to_string()
}
