//! Qdrant vector index backend implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, Filter, ListValue, PointStruct,
    SearchPointsBuilder, Struct, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use serde_json::{Map, Number};
use tracing::debug;

use super::{QueryRequest, VectorIndex};
use crate::error::VectorStoreError;
use crate::models::{IndexStats, NAMESPACE_FIELD, QueryMatch, VectorRecord, VectorStoreConfig};

/// Qdrant backend. Namespaces are a payload field filtered on every query.
pub struct QdrantBackend {
    client: Qdrant,
    collection: String,
}

impl QdrantBackend {
    pub fn new(config: &VectorStoreConfig) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            collection: config.index.clone(),
        })
    }

    fn build_filter(namespace: &str, required_field: Option<&str>) -> Filter {
        let mut filter = Filter::must([Condition::matches(NAMESPACE_FIELD, namespace.to_string())]);
        if let Some(field) = required_field {
            filter.must_not = vec![Condition::is_empty(field), Condition::is_null(field)];
        }
        filter
    }
}

#[async_trait]
impl VectorIndex for QdrantBackend {
    async fn describe_index_stats(&self) -> Result<IndexStats, VectorStoreError> {
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(|e| VectorStoreError::IndexError(e.to_string()))?;

        let result = info.result.ok_or_else(|| {
            VectorStoreError::IndexError(format!("collection {} not found", self.collection))
        })?;

        let dimension = result
            .config
            .as_ref()
            .and_then(|c| c.params.as_ref())
            .and_then(|p| p.vectors_config.as_ref())
            .and_then(|v| v.config.as_ref())
            .and_then(|c| match c {
                VectorsConfigKind::Params(params) => Some(params.size),
                VectorsConfigKind::ParamsMap(_) => None,
            })
            .unwrap_or(0);

        Ok(IndexStats {
            dimension,
            total_record_count: result.points_count.unwrap_or(0),
        })
    }

    async fn ensure_index(&self, dimension: u64) -> Result<(), VectorStoreError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;
        if exists {
            return Ok(());
        }

        let create_collection = CreateCollectionBuilder::new(&self.collection)
            .vectors_config(VectorParamsBuilder::new(dimension, Distance::Cosine));

        self.client
            .create_collection(create_collection)
            .await
            .map_err(|e| VectorStoreError::IndexError(e.to_string()))?;

        debug!(collection = %self.collection, dimension, "Created collection");
        Ok(())
    }

    async fn upsert(
        &self,
        namespace: &str,
        records: Vec<VectorRecord>,
    ) -> Result<(), VectorStoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = records
            .into_iter()
            .map(|record| {
                let point_id = record.point_uuid();
                let mut payload: HashMap<String, Value> = record
                    .metadata
                    .into_iter()
                    .map(|(k, v)| (k, json_to_value(v)))
                    .collect();
                payload.insert("id".to_string(), record.id.into());
                payload.insert(NAMESPACE_FIELD.to_string(), namespace.to_string().into());

                PointStruct::new(point_id, record.values, payload)
            })
            .collect();

        let upsert = UpsertPointsBuilder::new(&self.collection, points).wait(true);

        self.client
            .upsert_points(upsert)
            .await
            .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;

        Ok(())
    }

    async fn query(&self, request: QueryRequest) -> Result<Vec<QueryMatch>, VectorStoreError> {
        let filter = Self::build_filter(&request.namespace, request.required_field.as_deref());
        let search = SearchPointsBuilder::new(&self.collection, request.vector, request.top_k)
            .filter(filter)
            .with_payload(true);

        let results = self
            .client
            .search_points(search)
            .await
            .map_err(|e| VectorStoreError::SearchError(e.to_string()))?;

        Ok(results
            .result
            .into_iter()
            .map(|point| {
                let mut metadata: Map<String, serde_json::Value> = point
                    .payload
                    .into_iter()
                    .map(|(k, v)| (k, value_to_json(v)))
                    .collect();
                metadata.remove(NAMESPACE_FIELD);
                let id = match metadata.remove("id") {
                    Some(serde_json::Value::String(id)) => id,
                    _ => String::new(),
                };
                QueryMatch {
                    id,
                    score: point.score,
                    metadata,
                }
            })
            .collect())
    }

    fn index_name(&self) -> &str {
        &self.collection
    }
}

fn json_to_value(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value {
            kind: Some(Kind::NullValue(0)),
        },
        serde_json::Value::Bool(b) => b.into(),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => i.into(),
            None => n.as_f64().unwrap_or_default().into(),
        },
        serde_json::Value::String(s) => s.into(),
        serde_json::Value::Array(items) => Value {
            kind: Some(Kind::ListValue(ListValue {
                values: items.into_iter().map(json_to_value).collect(),
            })),
        },
        serde_json::Value::Object(map) => Value {
            kind: Some(Kind::StructValue(Struct {
                fields: map.into_iter().map(|(k, v)| (k, json_to_value(v))).collect(),
            })),
        },
    }
}

fn value_to_json(value: Value) -> serde_json::Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => Number::from_f64(d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(s)) => serde_json::Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, value_to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_conversion_roundtrip() {
        let original = json!({
            "text": "ETF",
            "chunkIndex": 3,
            "score": 0.5,
            "flag": true,
            "tags": ["a", "b"],
            "nested": {"k": null}
        });
        let converted = value_to_json(json_to_value(original.clone()));
        assert_eq!(converted, original);
    }

    #[test]
    fn test_build_filter_requires_field() {
        let filter = QdrantBackend::build_filter("etf-docs", Some("source"));
        assert_eq!(filter.must.len(), 1);
        assert_eq!(filter.must_not.len(), 2);

        let filter = QdrantBackend::build_filter("etf-docs", None);
        assert!(filter.must_not.is_empty());
    }

    #[test]
    fn test_backend_creation() {
        let backend = QdrantBackend::new(&VectorStoreConfig::default()).unwrap();
        assert_eq!(backend.index_name(), "etf-assistant");
    }
}
