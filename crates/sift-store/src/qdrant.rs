//! Qdrant-backed implementation of [`VectorStore`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use qdrant_client::Payload;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Distance, FieldType, Filter, Fusion, GetPointsBuilder, NamedVectors,
    PointId, PointStruct, PointsIdsList, PrefetchQueryBuilder, Query, QueryPointsBuilder,
    ScrollPointsBuilder, SearchPointsBuilder, SetPayloadPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder, VectorsConfigBuilder, point_id::PointIdOptions, value::Kind,
    vectors_output::VectorsOptions,
};

use crate::vector_store::{
    FieldValue, Prefetch, ScoredVectorPoint, ScrollPage, StoreError, StoredVectorPoint,
    VectorFilter, VectorPoint, VectorStore,
};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Thin wrapper over the [`Qdrant`] client.
///
/// One instance per process, injected into the components that need it.
#[derive(Clone)]
pub struct QdrantStore {
    client: std::sync::Arc<Qdrant>,
}

impl std::fmt::Debug for QdrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantStore").finish_non_exhaustive()
    }
}

impl QdrantStore {
    /// Connect to the Qdrant instance at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created.
    pub fn new(url: &str) -> Result<Self, StoreError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            client: std::sync::Arc::new(client),
        })
    }
}

fn build_filter(filter: &VectorFilter) -> Filter {
    Filter {
        must: filter.must.iter().map(build_condition).collect(),
        must_not: filter.must_not.iter().map(build_condition).collect(),
        ..Filter::default()
    }
}

fn build_condition(cond: &crate::vector_store::FieldCondition) -> Condition {
    match &cond.value {
        FieldValue::Integer(i) => Condition::matches(cond.field.clone(), *i),
        FieldValue::Text(s) => Condition::matches(cond.field.clone(), s.clone()),
        FieldValue::TextContains(s) => Condition::matches_text(cond.field.clone(), s.clone()),
    }
}

fn json_to_payload(
    payload: HashMap<String, serde_json::Value>,
) -> Result<HashMap<String, qdrant_client::qdrant::Value>, StoreError> {
    let obj = serde_json::Value::Object(payload.into_iter().collect());
    serde_json::from_value(obj).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn value_to_json(value: &qdrant_client::qdrant::Value) -> serde_json::Value {
    match &value.kind {
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(*b),
        Some(Kind::IntegerValue(i)) => serde_json::json!(i),
        Some(Kind::DoubleValue(d)) => serde_json::json!(d),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s.clone()),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(s)) => serde_json::Value::Object(
            s.fields
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
    }
}

fn payload_to_json(
    payload: &HashMap<String, qdrant_client::qdrant::Value>,
) -> HashMap<String, serde_json::Value> {
    payload
        .iter()
        .map(|(k, v)| (k.clone(), value_to_json(v)))
        .collect()
}

fn point_id_string(id: Option<&PointId>) -> String {
    match id.and_then(|p| p.point_id_options.as_ref()) {
        Some(PointIdOptions::Uuid(s)) => s.clone(),
        Some(PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    }
}

fn extract_vectors(
    vectors: Option<&qdrant_client::qdrant::VectorsOutput>,
) -> HashMap<String, Vec<f32>> {
    let mut out = HashMap::new();
    let Some(opts) = vectors.and_then(|v| v.vectors_options.as_ref()) else {
        return out;
    };
    match opts {
        VectorsOptions::Vector(v) => {
            out.insert(String::new(), v.data.clone());
        }
        VectorsOptions::Vectors(named) => {
            for (name, v) in &named.vectors {
                out.insert(name.clone(), v.data.clone());
            }
        }
    }
    out
}

impl VectorStore for QdrantStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_sizes: &[(&str, u64)],
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        let sizes: Vec<(String, u64)> = vector_sizes
            .iter()
            .map(|(n, s)| ((*n).to_owned(), *s))
            .collect();
        Box::pin(async move {
            let exists = self
                .client
                .collection_exists(&collection)
                .await
                .map_err(|e| StoreError::Collection(e.to_string()))?;
            if exists {
                return Ok(());
            }

            let mut config = VectorsConfigBuilder::default();
            for (name, size) in &sizes {
                config.add_named_vector_params(
                    name,
                    VectorParamsBuilder::new(*size, Distance::Cosine),
                );
            }
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&collection).vectors_config(config),
                )
                .await
                .map_err(|e| StoreError::Collection(e.to_string()))?;
            Ok(())
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.client
                .collection_exists(&collection)
                .await
                .map_err(|e| StoreError::Collection(e.to_string()))
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.client
                .delete_collection(&collection)
                .await
                .map_err(|e| StoreError::Collection(e.to_string()))?;
            Ok(())
        })
    }

    fn create_payload_index(
        &self,
        collection: &str,
        field: &str,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        let field = field.to_owned();
        Box::pin(async move {
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    &collection,
                    &field,
                    FieldType::Keyword,
                ))
                .await
                .map_err(|e| StoreError::Collection(e.to_string()))?;
            Ok(())
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut structs = Vec::with_capacity(points.len());
            for p in points {
                let mut named = NamedVectors::default();
                for (name, vector) in p.vectors {
                    named = named.add_vector(name, vector);
                }
                let payload = json_to_payload(p.payload)?;
                structs.push(PointStruct::new(p.id, named, payload));
            }
            self.client
                .upsert_points(UpsertPointsBuilder::new(&collection, structs))
                .await
                .map_err(|e| StoreError::Upsert(e.to_string()))?;
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
            let mut builder = SearchPointsBuilder::new(&collection, vector, limit)
                .vector_name(vector_name)
                .with_payload(true);
            if let Some(min) = score_threshold {
                builder = builder.score_threshold(min);
            }
            if let Some(f) = &filter {
                builder = builder.filter(build_filter(f));
            }

            let results = self
                .client
                .search_points(builder)
                .await
                .map_err(|e| StoreError::Search(e.to_string()))?;

            Ok(results
                .result
                .iter()
                .map(|p| ScoredVectorPoint {
                    id: point_id_string(p.id.as_ref()),
                    score: p.score,
                    payload: payload_to_json(&p.payload),
                })
                .collect())
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
            let mut builder = QueryPointsBuilder::new(&collection)
                .query(Query::new_fusion(Fusion::Rrf))
                .limit(limit)
                .with_payload(true);

            for pre in prefetches {
                let mut leg = PrefetchQueryBuilder::default()
                    .query(Query::new_nearest(pre.vector))
                    .using(pre.vector_name)
                    .limit(pre.limit);
                if let Some(f) = &filter {
                    leg = leg.filter(build_filter(f));
                }
                builder = builder.add_prefetch(leg);
            }
            if let Some(f) = &filter {
                builder = builder.filter(build_filter(f));
            }

            let results = self
                .client
                .query(builder)
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;

            Ok(results
                .result
                .iter()
                .map(|p| ScoredVectorPoint {
                    id: point_id_string(p.id.as_ref()),
                    score: p.score,
                    payload: payload_to_json(&p.payload),
                })
                .collect())
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
            let point_ids: Vec<PointId> = ids.into_iter().map(Into::into).collect();
            self.client
                .delete_points(
                    DeletePointsBuilder::new(&collection)
                        .points(PointsIdsList { ids: point_ids }),
                )
                .await
                .map_err(|e| StoreError::Delete(e.to_string()))?;
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
            self.client
                .delete_points(
                    DeletePointsBuilder::new(&collection).points(build_filter(&filter)),
                )
                .await
                .map_err(|e| StoreError::Delete(e.to_string()))?;
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
            let point_ids: Vec<PointId> = ids.into_iter().map(Into::into).collect();
            let response = self
                .client
                .get_points(
                    GetPointsBuilder::new(&collection, point_ids)
                        .with_payload(true)
                        .with_vectors(with_vectors),
                )
                .await
                .map_err(|e| StoreError::Scroll(e.to_string()))?;

            Ok(response
                .result
                .iter()
                .map(|p| StoredVectorPoint {
                    id: point_id_string(p.id.as_ref()),
                    payload: payload_to_json(&p.payload),
                    vectors: extract_vectors(p.vectors.as_ref()),
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
            let limit = u32::try_from(limit).unwrap_or(u32::MAX);
            let mut builder = ScrollPointsBuilder::new(&collection)
                .with_payload(true)
                .with_vectors(with_vectors)
                .limit(limit);
            if let Some(f) = &filter {
                builder = builder.filter(build_filter(f));
            }
            if let Some(off) = offset {
                builder = builder.offset(PointId::from(off));
            }

            let response = self
                .client
                .scroll(builder)
                .await
                .map_err(|e| StoreError::Scroll(e.to_string()))?;

            let points = response
                .result
                .iter()
                .map(|p| StoredVectorPoint {
                    id: point_id_string(p.id.as_ref()),
                    payload: payload_to_json(&p.payload),
                    vectors: extract_vectors(p.vectors.as_ref()),
                })
                .collect();
            let next = response
                .next_page_offset
                .as_ref()
                .map(|id| point_id_string(Some(id)));

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
            let mut builder = CountPointsBuilder::new(&collection).exact(true);
            if let Some(f) = &filter {
                builder = builder.filter(build_filter(f));
            }
            let response = self
                .client
                .count(builder)
                .await
                .map_err(|e| StoreError::Scroll(e.to_string()))?;
            Ok(response.result.map_or(0, |r| r.count))
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
            let point_ids: Vec<PointId> = ids.into_iter().map(Into::into).collect();
            let payload = Payload::try_from(serde_json::Value::Object(
                payload.into_iter().collect(),
            ))
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
            self.client
                .set_payload(
                    SetPayloadPointsBuilder::new(&collection, payload)
                        .points_selector(PointsIdsList { ids: point_ids }),
                )
                .await
                .map_err(|e| StoreError::Payload(e.to_string()))?;
            Ok(())
        })
    }
}
