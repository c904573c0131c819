//! Records exchanged with the embedding service and the vector index.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::document::{ChunkMetadata, ProcessedChunk};

/// Payload field holding the logical partition a record belongs to.
pub const NAMESPACE_FIELD: &str = "namespace";

/// Plain-text input for `embed_and_store`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestDocument {
    pub text: String,
    /// Must carry a non-empty `source` string.
    pub metadata: Map<String, Value>,
}

impl IngestDocument {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = Map::new();
        metadata.insert("source".to_string(), Value::String(source.into()));
        Self {
            text: text.into(),
            metadata,
        }
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata
            .get("source")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

/// A processed chunk paired with its vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResult {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
    pub content: String,
}

impl EmbeddingResult {
    pub fn new(chunk: &ProcessedChunk, embedding: Vec<f32>) -> Self {
        Self {
            id: chunk.id.clone(),
            embedding,
            metadata: chunk.metadata.clone(),
            content: chunk.content.clone(),
        }
    }

    /// Record to upsert; `text_key` names the payload field holding the content.
    pub fn into_record(self, text_key: &str) -> VectorRecord {
        let metadata = self.metadata.payload(&self.id, &self.content, text_key);
        VectorRecord {
            id: self.id,
            values: self.embedding,
            metadata,
        }
    }
}

/// Atomic unit upserted to the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Map<String, Value>,
}

impl VectorRecord {
    pub fn generate_id(epoch_ms: i64, document_key: &str, chunk_index: usize) -> String {
        format!("doc_{}_{}_{}", epoch_ms, document_key, chunk_index)
    }

    /// Deterministic UUID for backends whose point ids must be UUIDs.
    pub fn point_uuid(&self) -> String {
        uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, self.id.as_bytes()).to_string()
    }
}

/// What `describe_index_stats` reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub dimension: u64,
    pub total_record_count: u64,
}

/// Raw nearest-neighbour match returned by an index backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    pub metadata: Map<String, Value>,
}

/// A similarity-search hit with its text pulled out of the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub id: String,
    pub score: f32,
    pub text: String,
    pub metadata: Map<String, Value>,
}
