use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use crate::vector_store::{
    FieldCondition, FieldValue, Prefetch, ScoredVectorPoint, ScrollPage, StoreError,
    StoredVectorPoint, VectorFilter, VectorPoint, VectorStore,
};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

struct StoredPoint {
    vectors: HashMap<String, Vec<f32>>,
    payload: HashMap<String, serde_json::Value>,
}

struct Collection {
    // BTreeMap keeps scroll order stable across pages.
    points: BTreeMap<String, StoredPoint>,
}

/// In-memory named-vector store for tests.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore").finish_non_exhaustive()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn matches_filter(payload: &HashMap<String, serde_json::Value>, filter: &VectorFilter) -> bool {
    for cond in &filter.must {
        let Some(val) = payload.get(&cond.field) else {
            return false;
        };
        if !field_matches(val, &cond.value) {
            return false;
        }
    }
    for cond in &filter.must_not {
        if let Some(val) = payload.get(&cond.field)
            && field_matches(val, &cond.value)
        {
            return false;
        }
    }
    true
}

fn field_matches(val: &serde_json::Value, expected: &FieldValue) -> bool {
    match expected {
        FieldValue::Integer(i) => val.as_i64() == Some(*i),
        FieldValue::Text(s) => val.as_str() == Some(s.as_str()),
        FieldValue::TextContains(s) => val.as_str().is_some_and(|v| v.contains(s.as_str())),
    }
}

const RRF_K: f32 = 60.0;

impl InMemoryVectorStore {
    fn ranked(
        &self,
        collection: &str,
        vector_name: &str,
        vector: &[f32],
        limit: u64,
        filter: Option<&VectorFilter>,
    ) -> Result<Vec<ScoredVectorPoint>, StoreError> {
        let cols = self
            .collections
            .read()
            .map_err(|e| StoreError::Search(e.to_string()))?;
        let col = cols
            .get(collection)
            .ok_or_else(|| StoreError::Search(format!("collection {collection} not found")))?;

        let empty = VectorFilter::default();
        let f = filter.unwrap_or(&empty);

        let mut scored: Vec<ScoredVectorPoint> = col
            .points
            .iter()
            .filter(|(_, sp)| matches_filter(&sp.payload, f))
            .filter_map(|(id, sp)| {
                let v = sp.vectors.get(vector_name)?;
                Some(ScoredVectorPoint {
                    id: id.clone(),
                    score: cosine_similarity(vector, v),
                    payload: sp.payload.clone(),
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(scored)
    }
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        _vector_sizes: &[(&str, u64)],
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| StoreError::Collection(e.to_string()))?;
            cols.entry(collection).or_insert_with(|| Collection {
                points: BTreeMap::new(),
            });
            Ok(())
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| StoreError::Collection(e.to_string()))?;
            Ok(cols.contains_key(&collection))
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| StoreError::Collection(e.to_string()))?;
            cols.remove(&collection);
            Ok(())
        })
    }

    fn create_payload_index(
        &self,
        _collection: &str,
        _field: &str,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async { Ok(()) })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| StoreError::Upsert(e.to_string()))?;
            let col = cols
                .get_mut(&collection)
                .ok_or_else(|| StoreError::Upsert(format!("collection {collection} not found")))?;
            for p in points {
                col.points.insert(
                    p.id,
                    StoredPoint {
                        vectors: p.vectors,
                        payload: p.payload,
                    },
                );
            }
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector_name: &str,
        vector: Vec<f32>,
        limit: u64,
        score_threshold: Option<f32>,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, StoreError>> {
        let collection = collection.to_owned();
        let vector_name = vector_name.to_owned();
        Box::pin(async move {
            let mut scored =
                self.ranked(&collection, &vector_name, &vector, limit, filter.as_ref())?;
            if let Some(min) = score_threshold {
                scored.retain(|p| p.score >= min);
            }
            Ok(scored)
        })
    }

    fn query_fusion(
        &self,
        collection: &str,
        prefetches: Vec<Prefetch>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut fused: HashMap<String, (f32, HashMap<String, serde_json::Value>)> =
                HashMap::new();

            for pre in &prefetches {
                let ranked = self.ranked(
                    &collection,
                    &pre.vector_name,
                    &pre.vector,
                    pre.limit,
                    filter.as_ref(),
                )?;
                for (rank, point) in ranked.into_iter().enumerate() {
                    #[allow(clippy::cast_precision_loss)]
                    let contribution = 1.0 / (RRF_K + rank as f32 + 1.0);
                    let entry = fused
                        .entry(point.id)
                        .or_insert_with(|| (0.0, point.payload));
                    entry.0 += contribution;
                }
            }

            let mut merged: Vec<ScoredVectorPoint> = fused
                .into_iter()
                .map(|(id, (score, payload))| ScoredVectorPoint { id, score, payload })
                .collect();
            merged.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            merged.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            Ok(merged)
        })
    }

    fn delete_by_ids(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(());
            }
            let mut cols = self
                .collections
                .write()
                .map_err(|e| StoreError::Delete(e.to_string()))?;
            let col = cols
                .get_mut(&collection)
                .ok_or_else(|| StoreError::Delete(format!("collection {collection} not found")))?;
            for id in &ids {
                col.points.remove(id);
            }
            Ok(())
        })
    }

    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| StoreError::Delete(e.to_string()))?;
            let col = cols
                .get_mut(&collection)
                .ok_or_else(|| StoreError::Delete(format!("collection {collection} not found")))?;
            col.points.retain(|_, sp| !matches_filter(&sp.payload, &filter));
            Ok(())
        })
    }

    fn get_by_ids(
        &self,
        collection: &str,
        ids: Vec<String>,
        with_vectors: bool,
    ) -> BoxFuture<'_, Result<Vec<StoredVectorPoint>, StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| StoreError::Scroll(e.to_string()))?;
            let col = cols
                .get(&collection)
                .ok_or_else(|| StoreError::Scroll(format!("collection {collection} not found")))?;
            Ok(ids
                .iter()
                .filter_map(|id| {
                    col.points.get(id).map(|sp| StoredVectorPoint {
                        id: id.clone(),
                        payload: sp.payload.clone(),
                        vectors: if with_vectors {
                            sp.vectors.clone()
                        } else {
                            HashMap::new()
                        },
                    })
                })
                .collect())
        })
    }

    fn scroll(
        &self,
        collection: &str,
        filter: Option<VectorFilter>,
        limit: u64,
        offset: Option<String>,
        with_vectors: bool,
    ) -> BoxFuture<'_, Result<ScrollPage, StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| StoreError::Scroll(e.to_string()))?;
            let col = cols
                .get(&collection)
                .ok_or_else(|| StoreError::Scroll(format!("collection {collection} not found")))?;

            let empty = VectorFilter::default();
            let f = filter.as_ref().unwrap_or(&empty);
            let limit = usize::try_from(limit).unwrap_or(usize::MAX);

            let mut points = Vec::new();
            let mut next = None;
            for (id, sp) in col
                .points
                .range(offset.unwrap_or_default()..)
                .filter(|(_, sp)| matches_filter(&sp.payload, f))
            {
                if points.len() == limit {
                    next = Some(id.clone());
                    break;
                }
                points.push(StoredVectorPoint {
                    id: id.clone(),
                    payload: sp.payload.clone(),
                    vectors: if with_vectors {
                        sp.vectors.clone()
                    } else {
                        HashMap::new()
                    },
                });
            }
            Ok(ScrollPage { points, next })
        })
    }

    fn count(
        &self,
        collection: &str,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<u64, StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| StoreError::Scroll(e.to_string()))?;
            let Some(col) = cols.get(&collection) else {
                return Ok(0);
            };
            let empty = VectorFilter::default();
            let f = filter.as_ref().unwrap_or(&empty);
            let n = col
                .points
                .values()
                .filter(|sp| matches_filter(&sp.payload, f))
                .count();
            Ok(n as u64)
        })
    }

    fn set_payload(
        &self,
        collection: &str,
        ids: Vec<String>,
        payload: HashMap<String, serde_json::Value>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| StoreError::Payload(e.to_string()))?;
            let col = cols
                .get_mut(&collection)
                .ok_or_else(|| StoreError::Payload(format!("collection {collection} not found")))?;
            for id in &ids {
                if let Some(sp) = col.points.get_mut(id) {
                    for (k, v) in &payload {
                        sp.payload.insert(k.clone(), v.clone());
                    }
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, name: &str, vec: Vec<f32>) -> VectorPoint {
        VectorPoint {
            id: id.into(),
            vectors: HashMap::from([(name.to_owned(), vec)]),
            payload: HashMap::from([("id".into(), serde_json::json!(id))]),
        }
    }

    #[tokio::test]
    async fn ensure_collection_idempotent() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", &[("code", 3)]).await.unwrap();
        store.ensure_collection("c", &[("code", 3)]).await.unwrap();
        assert!(store.collection_exists("c").await.unwrap());
    }

    #[tokio::test]
    async fn search_only_sees_named_space() {
        let store = InMemoryVectorStore::new();
        store
            .ensure_collection("c", &[("code", 3), ("description", 3)])
            .await
            .unwrap();
        store
            .upsert(
                "c",
                vec![
                    point("a", "code", vec![1.0, 0.0, 0.0]),
                    point("b", "description", vec![1.0, 0.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store
            .search("c", "code", vec![1.0, 0.0, 0.0], 10, None, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn search_applies_threshold() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", &[("code", 3)]).await.unwrap();
        store
            .upsert(
                "c",
                vec![
                    point("a", "code", vec![1.0, 0.0, 0.0]),
                    point("b", "code", vec![0.0, 1.0, 0.0]),
                ],
            )
            .await
            .unwrap();
        let hits = store
            .search("c", "code", vec![1.0, 0.0, 0.0], 10, Some(0.5), None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn fusion_merges_both_spaces() {
        let store = InMemoryVectorStore::new();
        store
            .ensure_collection("c", &[("code", 2), ("description", 2)])
            .await
            .unwrap();
        let both = VectorPoint {
            id: "both".into(),
            vectors: HashMap::from([
                ("code".to_owned(), vec![1.0, 0.0]),
                ("description".to_owned(), vec![1.0, 0.0]),
            ]),
            payload: HashMap::new(),
        };
        store
            .upsert(
                "c",
                vec![
                    both,
                    point("code_only", "code", vec![0.9, 0.1]),
                    point("desc_only", "description", vec![0.9, 0.1]),
                ],
            )
            .await
            .unwrap();

        let fused = store
            .query_fusion(
                "c",
                vec![
                    Prefetch {
                        vector_name: "code".into(),
                        vector: vec![1.0, 0.0],
                        limit: 10,
                    },
                    Prefetch {
                        vector_name: "description".into(),
                        vector: vec![1.0, 0.0],
                        limit: 10,
                    },
                ],
                3,
                None,
            )
            .await
            .unwrap();

        // The point ranked in both spaces accumulates two RRF contributions.
        assert_eq!(fused[0].id, "both");
        assert_eq!(fused.len(), 3);
    }

    #[tokio::test]
    async fn substring_filter_matches() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", &[("code", 2)]).await.unwrap();
        let mut p = point("a", "code", vec![1.0, 0.0]);
        p.payload
            .insert("file_path".into(), serde_json::json!("src/graph/deps.rs"));
        store.upsert("c", vec![p]).await.unwrap();

        let filter = VectorFilter::must(vec![FieldCondition::matches(
            "file_path",
            FieldValue::TextContains("graph".into()),
        )]);
        let hits = store
            .search("c", "code", vec![1.0, 0.0], 10, None, Some(filter))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let filter = VectorFilter::must(vec![FieldCondition::matches(
            "file_path",
            FieldValue::TextContains("nope".into()),
        )]);
        let hits = store
            .search("c", "code", vec![1.0, 0.0], 10, None, Some(filter))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn scroll_pages_through_all_points() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", &[("code", 2)]).await.unwrap();
        let points: Vec<_> = (0..5)
            .map(|i| point(&format!("p{i}"), "code", vec![1.0, 0.0]))
            .collect();
        store.upsert("c", points).await.unwrap();

        let mut seen = 0;
        let mut offset = None;
        loop {
            let page = store.scroll("c", None, 2, offset, false).await.unwrap();
            seen += page.points.len();
            match page.next {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        assert_eq!(seen, 5);
    }

    #[tokio::test]
    async fn count_with_filter() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", &[("code", 2)]).await.unwrap();
        let mut a = point("a", "code", vec![1.0, 0.0]);
        a.payload.insert("kind".into(), serde_json::json!("x"));
        let b = point("b", "code", vec![1.0, 0.0]);
        store.upsert("c", vec![a, b]).await.unwrap();

        assert_eq!(store.count("c", None).await.unwrap(), 2);
        let filter = VectorFilter::must(vec![FieldCondition::matches(
            "kind",
            FieldValue::Text("x".into()),
        )]);
        assert_eq!(store.count("c", Some(filter)).await.unwrap(), 1);
        assert_eq!(store.count("missing", None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn set_payload_merges_fields() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", &[("code", 2)]).await.unwrap();
        store
            .upsert("c", vec![point("a", "code", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .set_payload(
                "c",
                vec!["a".into()],
                HashMap::from([("access_count".into(), serde_json::json!(3))]),
            )
            .await
            .unwrap();

        let got = store.get_by_ids("c", vec!["a".into()], false).await.unwrap();
        assert_eq!(got[0].payload.get("access_count"), Some(&serde_json::json!(3)));
        // Pre-existing fields survive the merge.
        assert_eq!(got[0].payload.get("id"), Some(&serde_json::json!("a")));
    }

    #[tokio::test]
    async fn delete_by_filter_removes_matches_only() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", &[("code", 2)]).await.unwrap();
        let mut a = point("a", "code", vec![1.0, 0.0]);
        a.payload
            .insert("file_path".into(), serde_json::json!("src/a.rs"));
        let mut b = point("b", "code", vec![1.0, 0.0]);
        b.payload
            .insert("file_path".into(), serde_json::json!("src/b.rs"));
        store.upsert("c", vec![a, b]).await.unwrap();

        store
            .delete_by_filter(
                "c",
                VectorFilter::must(vec![FieldCondition::matches(
                    "file_path",
                    FieldValue::Text("src/a.rs".into()),
                )]),
            )
            .await
            .unwrap();

        assert_eq!(store.count("c", None).await.unwrap(), 1);
        let got = store.get_by_ids("c", vec!["b".into()], false).await.unwrap();
        assert_eq!(got.len(), 1);
    }

    #[tokio::test]
    async fn get_by_ids_with_vectors() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", &[("code", 2)]).await.unwrap();
        store
            .upsert("c", vec![point("a", "code", vec![0.5, 0.5])])
            .await
            .unwrap();

        let with = store.get_by_ids("c", vec!["a".into()], true).await.unwrap();
        assert_eq!(with[0].vectors.get("code"), Some(&vec![0.5, 0.5]));
        let without = store.get_by_ids("c", vec!["a".into()], false).await.unwrap();
        assert!(without[0].vectors.is_empty());
    }

    #[test]
    fn cosine_similarity_zero_norm() {
        assert!((cosine_similarity(&[0.0, 0.0], &[1.0, 0.0])).abs() < f32::EPSILON);
    }
}
