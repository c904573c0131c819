//! Vector index abstraction layer.
//!
//! The ingestion pipeline only needs three things from an index: its
//! configured dimension, a batch upsert, and a filtered nearest-neighbour
//! query. Backends (Qdrant, PostgreSQL/pgvector, in-memory) implement
//! [`VectorIndex`] and are picked from configuration.

mod memory;
mod pgvector;
mod qdrant;

pub use memory::MemoryBackend;
pub use pgvector::PgVectorBackend;
pub use qdrant::QdrantBackend;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::VectorStoreError;
use crate::models::{IndexStats, QueryMatch, VectorRecord, VectorStoreConfig};

/// Nearest-neighbour request scoped to one namespace.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub namespace: String,
    pub vector: Vec<f32>,
    pub top_k: u64,
    /// Only records whose payload has this field are returned.
    pub required_field: Option<String>,
}

/// Operations the pipeline relies on from an external vector index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Report the configured dimension and record count.
    async fn describe_index_stats(&self) -> Result<IndexStats, VectorStoreError>;

    /// Create the index with the given dimension if it does not exist yet.
    async fn ensure_index(&self, dimension: u64) -> Result<(), VectorStoreError>;

    /// Insert or replace records by id inside `namespace`.
    async fn upsert(
        &self,
        namespace: &str,
        records: Vec<VectorRecord>,
    ) -> Result<(), VectorStoreError>;

    /// Most similar records first.
    async fn query(&self, request: QueryRequest) -> Result<Vec<QueryMatch>, VectorStoreError>;

    /// Name of the collection/table backing this index.
    fn index_name(&self) -> &str;
}

/// Create an index backend based on configuration.
pub async fn create_index(
    config: &VectorStoreConfig,
    dimension: u64,
) -> Result<Arc<dyn VectorIndex>, VectorStoreError> {
    use crate::models::VectorDriver;

    match config.driver {
        VectorDriver::Qdrant => Ok(Arc::new(QdrantBackend::new(config)?)),
        VectorDriver::PostgreSQL => Ok(Arc::new(PgVectorBackend::new(config, dimension).await?)),
        VectorDriver::Memory => Ok(Arc::new(MemoryBackend::new(&config.index, dimension))),
    }
}

/// Cosine similarity; zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
