//! In-process vector index, used for dry runs and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{QueryRequest, VectorIndex, cosine_similarity};
use crate::error::VectorStoreError;
use crate::models::{IndexStats, QueryMatch, VectorRecord};

pub struct MemoryBackend {
    name: String,
    dimension: AtomicU64,
    namespaces: RwLock<HashMap<String, HashMap<String, VectorRecord>>>,
    upsert_calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new(name: impl Into<String>, dimension: u64) -> Self {
        Self {
            name: name.into(),
            dimension: AtomicU64::new(dimension),
            namespaces: RwLock::new(HashMap::new()),
            upsert_calls: AtomicUsize::new(0),
        }
    }

    /// Number of upsert calls received so far.
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub async fn records(&self, namespace: &str) -> Vec<VectorRecord> {
        let namespaces = self.namespaces.read().await;
        let mut records: Vec<VectorRecord> = namespaces
            .get(namespace)
            .map(|ns| ns.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }
}

#[async_trait]
impl VectorIndex for MemoryBackend {
    async fn describe_index_stats(&self) -> Result<IndexStats, VectorStoreError> {
        let namespaces = self.namespaces.read().await;
        Ok(IndexStats {
            dimension: self.dimension.load(Ordering::SeqCst),
            total_record_count: namespaces.values().map(|ns| ns.len() as u64).sum(),
        })
    }

    async fn ensure_index(&self, dimension: u64) -> Result<(), VectorStoreError> {
        let namespaces = self.namespaces.read().await;
        if namespaces.is_empty() {
            self.dimension.store(dimension, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn upsert(
        &self,
        namespace: &str,
        records: Vec<VectorRecord>,
    ) -> Result<(), VectorStoreError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        let dimension = self.dimension.load(Ordering::SeqCst) as usize;
        if let Some(bad) = records.iter().find(|r| r.values.len() != dimension) {
            return Err(VectorStoreError::UpsertError(format!(
                "record {} has {} values, index expects {}",
                bad.id,
                bad.values.len(),
                dimension
            )));
        }

        let mut namespaces = self.namespaces.write().await;
        let ns = namespaces.entry(namespace.to_string()).or_default();
        for record in records {
            ns.insert(record.id.clone(), record);
        }
        Ok(())
    }

    async fn query(&self, request: QueryRequest) -> Result<Vec<QueryMatch>, VectorStoreError> {
        let namespaces = self.namespaces.read().await;
        let Some(ns) = namespaces.get(&request.namespace) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<QueryMatch> = ns
            .values()
            .filter(|r| {
                request
                    .required_field
                    .as_ref()
                    .is_none_or(|field| r.metadata.get(field).is_some_and(|v| !v.is_null()))
            })
            .map(|r| QueryMatch {
                id: r.id.clone(),
                score: cosine_similarity(&request.vector, &r.values),
                metadata: r.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(request.top_k as usize);
        Ok(matches)
    }

    fn index_name(&self) -> &str {
        &self.name
    }
}
