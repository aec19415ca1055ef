//! End-to-end memory engine tests against the in-memory store.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use sift_llm::mock::MockGenerator;
use sift_llm::{Embedder, Result as LlmResult};
use sift_memory::{
    MemoryConfig, MemoryScope, MemoryStore, MemoryType, RecallRequest, RememberRequest,
};
use sift_store::{InMemoryVectorStore, VectorStore};

/// Embedder with hand-placed vectors so similarity is controllable.
/// Unknown texts land on a far-away default axis.
#[derive(Debug, Clone, Default)]
struct ScriptedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
}

impl ScriptedEmbedder {
    fn with(pairs: &[(&str, [f32; 3])]) -> Self {
        Self {
            vectors: pairs
                .iter()
                .map(|(text, v)| ((*text).to_owned(), v.to_vec()))
                .collect(),
        }
    }
}

impl Embedder for ScriptedEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> LlmResult<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                self.vectors
                    .get(t.as_str())
                    .cloned()
                    .unwrap_or_else(|| vec![0.0, 0.0, 1.0])
            })
            .collect())
    }
}

fn store_with(
    embedder: ScriptedEmbedder,
) -> MemoryStore<InMemoryVectorStore, ScriptedEmbedder, MockGenerator> {
    MemoryStore::new(
        InMemoryVectorStore::new(),
        embedder,
        MockGenerator::default(),
        MemoryConfig {
            project_id: "p1".to_owned(),
            ..MemoryConfig::default()
        },
    )
}

fn remember_req(content: &str, memory_type: MemoryType) -> RememberRequest {
    RememberRequest {
        content: content.to_owned(),
        memory_type,
        scope: MemoryScope::Project,
        importance: 0.5,
        tags: Vec::new(),
        expires_at: None,
    }
}

#[tokio::test]
async fn remember_deduplicates_by_content_hash() {
    let store = store_with(ScriptedEmbedder::default());
    let first = store
        .remember(remember_req("the build uses cargo", MemoryType::Semantic))
        .await
        .unwrap();
    let second = store
        .remember(remember_req("the build uses cargo", MemoryType::Semantic))
        .await
        .unwrap();
    assert_eq!(first, second);

    let count = store
        .store()
        .count("sift_memory_semantic", None)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn recall_ranks_by_similarity() {
    let embedder = ScriptedEmbedder::with(&[
        ("what database do we use", [1.0, 0.0, 0.0]),
        ("we use postgres for storage", [0.98, 0.2, 0.0]),
        ("the standup is at ten", [0.0, 1.0, 0.0]),
    ]);
    let store = store_with(embedder);
    store
        .remember(remember_req("we use postgres for storage", MemoryType::Semantic))
        .await
        .unwrap();
    store
        .remember(remember_req("the standup is at ten", MemoryType::Semantic))
        .await
        .unwrap();

    let hits = store
        .recall(RecallRequest {
            query: "what database do we use".to_owned(),
            ..RecallRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].record.content, "we use postgres for storage");
    assert!(hits[0].final_score > hits[1].final_score);
}

#[tokio::test]
async fn min_relevance_drops_weak_hits() {
    let embedder = ScriptedEmbedder::with(&[
        ("query", [1.0, 0.0, 0.0]),
        ("on topic", [0.99, 0.1, 0.0]),
        ("off topic", [0.1, 0.99, 0.0]),
    ]);
    let store = store_with(embedder);
    store
        .remember(remember_req("on topic", MemoryType::Semantic))
        .await
        .unwrap();
    store
        .remember(remember_req("off topic", MemoryType::Semantic))
        .await
        .unwrap();

    let hits = store
        .recall(RecallRequest {
            query: "query".to_owned(),
            min_relevance: 0.5,
            ..RecallRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.content, "on topic");
}

#[tokio::test]
async fn tag_overlap_filters_hits() {
    let embedder = ScriptedEmbedder::with(&[
        ("q", [1.0, 0.0, 0.0]),
        ("tagged fact", [0.9, 0.1, 0.0]),
        ("untagged fact", [0.9, 0.2, 0.0]),
    ]);
    let store = store_with(embedder);
    store
        .remember(RememberRequest {
            tags: vec!["infra".to_owned()],
            ..remember_req("tagged fact", MemoryType::Semantic)
        })
        .await
        .unwrap();
    store
        .remember(remember_req("untagged fact", MemoryType::Semantic))
        .await
        .unwrap();

    let hits = store
        .recall(RecallRequest {
            query: "q".to_owned(),
            tags: vec!["infra".to_owned(), "unused".to_owned()],
            ..RecallRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.content, "tagged fact");
}

#[tokio::test]
async fn scope_filter_restricts_results() {
    let embedder = ScriptedEmbedder::with(&[
        ("q", [1.0, 0.0, 0.0]),
        ("global fact", [0.9, 0.0, 0.0]),
        ("project fact", [0.9, 0.1, 0.0]),
    ]);
    let store = store_with(embedder);
    store
        .remember(RememberRequest {
            scope: MemoryScope::Global,
            ..remember_req("global fact", MemoryType::Semantic)
        })
        .await
        .unwrap();
    store
        .remember(remember_req("project fact", MemoryType::Semantic))
        .await
        .unwrap();

    let hits = store
        .recall(RecallRequest {
            query: "q".to_owned(),
            scope: Some(MemoryScope::Global),
            ..RecallRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.content, "global fact");
}

#[tokio::test]
async fn recall_bumps_access_count() {
    let embedder = ScriptedEmbedder::with(&[
        ("q", [1.0, 0.0, 0.0]),
        ("remembered", [0.95, 0.0, 0.0]),
    ]);
    let store = store_with(embedder);
    let id = store
        .remember(remember_req("remembered", MemoryType::Episodic))
        .await
        .unwrap();

    let hits = store
        .recall(RecallRequest {
            query: "q".to_owned(),
            ..RecallRequest::default()
        })
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);

    // The bump is fire-and-forget; give the spawned task a moment.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let points = store
        .store()
        .get_by_ids("sift_memory_episodic", vec![id], false)
        .await
        .unwrap();
    assert_eq!(
        points[0].payload.get("access_count").and_then(|v| v.as_u64()),
        Some(1)
    );
}

#[tokio::test]
async fn llm_filter_prunes_with_parseable_reply_and_degrades_otherwise() {
    let embedder = ScriptedEmbedder::with(&[
        ("q", [1.0, 0.0, 0.0]),
        ("first", [0.99, 0.0, 0.0]),
        ("second", [0.9, 0.1, 0.0]),
    ]);
    let store = MemoryStore::new(
        InMemoryVectorStore::new(),
        embedder.clone(),
        MockGenerator::with_responses(vec!["keeping [0] only".to_owned(), "gibberish".to_owned()]),
        MemoryConfig {
            project_id: "p1".to_owned(),
            ..MemoryConfig::default()
        },
    );
    store
        .remember(remember_req("first", MemoryType::Semantic))
        .await
        .unwrap();
    store
        .remember(remember_req("second", MemoryType::Semantic))
        .await
        .unwrap();

    let filtered = store
        .recall(RecallRequest {
            query: "q".to_owned(),
            llm_filter: true,
            ..RecallRequest::default()
        })
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].record.content, "first");

    // Second reply is unparseable: everything is kept.
    let kept = store
        .recall(RecallRequest {
            query: "q".to_owned(),
            llm_filter: true,
            ..RecallRequest::default()
        })
        .await
        .unwrap();
    assert_eq!(kept.len(), 2);
}

#[tokio::test]
async fn forget_removes_across_collections() {
    let store = store_with(ScriptedEmbedder::default());
    let id = store
        .remember(remember_req("to be deleted", MemoryType::Procedural))
        .await
        .unwrap();

    assert!(store.forget(&id).await.unwrap());
    assert!(!store.forget(&id).await.unwrap());
    assert_eq!(
        store
            .store()
            .count("sift_memory_procedural", None)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn expired_records_are_purged_and_hidden_from_recall() {
    let embedder = ScriptedEmbedder::with(&[
        ("q", [1.0, 0.0, 0.0]),
        ("stale", [0.99, 0.0, 0.0]),
        ("fresh", [0.9, 0.1, 0.0]),
    ]);
    let store = store_with(embedder);
    store
        .remember(RememberRequest {
            expires_at: Some(Utc::now() - Duration::hours(1)),
            ..remember_req("stale", MemoryType::Episodic)
        })
        .await
        .unwrap();
    store
        .remember(remember_req("fresh", MemoryType::Episodic))
        .await
        .unwrap();

    let hits = store
        .recall(RecallRequest {
            query: "q".to_owned(),
            ..RecallRequest::default()
        })
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.content, "fresh");

    assert_eq!(store.purge_expired().await.unwrap(), 1);
    assert_eq!(
        store
            .store()
            .count("sift_memory_episodic", None)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn consolidate_merges_similar_records() {
    let embedder = ScriptedEmbedder::with(&[
        ("deploys run on fridays", [1.0, 0.0, 0.0]),
        ("we deploy every friday", [0.97, 0.24, 0.0]),
        ("the logo is blue", [0.0, 1.0, 0.0]),
    ]);
    let store = store_with(embedder);
    store
        .remember(RememberRequest {
            importance: 0.6,
            ..remember_req("deploys run on fridays", MemoryType::Episodic)
        })
        .await
        .unwrap();
    store
        .remember(RememberRequest {
            importance: 0.4,
            ..remember_req("we deploy every friday", MemoryType::Episodic)
        })
        .await
        .unwrap();
    store
        .remember(remember_req("the logo is blue", MemoryType::Episodic))
        .await
        .unwrap();

    let report = store
        .consolidate(MemoryType::Episodic, MemoryType::Semantic, 0.9, false)
        .await
        .unwrap();

    assert_eq!(report.records_scanned, 3);
    assert_eq!(report.clusters_found, 1);
    assert_eq!(report.records_merged, 2);
    assert_eq!(report.records_created, 1);

    // The two similar records are gone; the unrelated one survives.
    assert_eq!(
        store
            .store()
            .count("sift_memory_episodic", None)
            .await
            .unwrap(),
        1
    );

    let page = store
        .store()
        .scroll("sift_memory_semantic", None, 10, None, false)
        .await
        .unwrap();
    assert_eq!(page.points.len(), 1);
    let merged = &page.points[0];
    let content = merged.payload.get("content").and_then(|v| v.as_str()).unwrap();
    assert!(content.contains("deploys run on fridays"));
    assert!(content.contains("we deploy every friday"));
    let tags: Vec<String> =
        serde_json::from_value(merged.payload.get("tags").unwrap().clone()).unwrap();
    assert!(tags.contains(&"consolidated".to_owned()));
    let importance = merged.payload.get("importance").and_then(|v| v.as_f64()).unwrap();
    assert!((importance - 0.7).abs() < 1e-9);
}

#[tokio::test]
async fn consolidate_dry_run_changes_nothing() {
    let embedder = ScriptedEmbedder::with(&[
        ("alpha fact", [1.0, 0.0, 0.0]),
        ("alpha fact again", [0.98, 0.1, 0.0]),
    ]);
    let store = store_with(embedder);
    store
        .remember(remember_req("alpha fact", MemoryType::Episodic))
        .await
        .unwrap();
    store
        .remember(remember_req("alpha fact again", MemoryType::Episodic))
        .await
        .unwrap();

    let report = store
        .consolidate(MemoryType::Episodic, MemoryType::Semantic, 0.9, true)
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.clusters_found, 1);
    assert_eq!(report.records_created, 0);
    assert_eq!(report.preview.len(), 1);
    assert_eq!(
        store
            .store()
            .count("sift_memory_episodic", None)
            .await
            .unwrap(),
        2
    );
}
