//! Embedding and storage of chunked text.
//!
//! Owns the boundary between locally chunked text and the external
//! embedding service and vector index. Every write path checks the index
//! dimension first and performs a single upsert only after all embeddings
//! have resolved, so a failed call never leaves a partial batch behind.

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::embedding::{EmbeddingClient, EmbeddingService};
use super::text_splitter::RecursiveCharacterSplitter;
use super::vector_store::{QueryRequest, VectorIndex, create_index};
use crate::error::{ConfigError, EmbeddingError, IngestError};
use crate::models::{
    Config, Credentials, EmbeddingResult, IndexStats, IngestDocument, ProcessedDocument,
    RawDocument, ScoredRecord, VectorRecord, new_document_key,
};
use crate::processors::ProcessorRegistry;

/// Metadata field a record must carry to be returned by similarity search.
pub const REQUIRED_FIELD: &str = "source";

/// Embed `text` with newlines replaced by spaces and check the vector width.
pub async fn get_embedding(
    service: &dyn EmbeddingService,
    text: &str,
    dimension: usize,
) -> Result<Vec<f32>, EmbeddingError> {
    let input = text.replace('\n', " ");
    let embedding = service.embed(&input).await?;

    if embedding.len() != dimension {
        return Err(EmbeddingError::InvalidResponse(format!(
            "model {} returned {} dimensions, expected {}",
            service.model(),
            embedding.len(),
            dimension
        )));
    }
    Ok(embedding)
}

/// Fail with a configuration error unless the index reports `expected` dimensions.
pub async fn check_dimension(
    index: &dyn VectorIndex,
    expected: u64,
) -> Result<IndexStats, IngestError> {
    let stats = index.describe_index_stats().await?;
    if stats.dimension != expected {
        return Err(ConfigError::DimensionMismatch {
            expected,
            actual: stats.dimension,
        }
        .into());
    }
    Ok(stats)
}

pub struct IngestPipeline {
    embedder: Arc<dyn EmbeddingService>,
    index: Arc<dyn VectorIndex>,
    registry: ProcessorRegistry,
    splitter: RecursiveCharacterSplitter,
    dimension: u64,
    namespace: String,
    text_key: String,
    concurrency: usize,
}

impl IngestPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingService>,
        index: Arc<dyn VectorIndex>,
        config: &Config,
    ) -> Self {
        let chunking = &config.chunking;
        Self {
            embedder,
            index,
            registry: ProcessorRegistry::from_config(chunking),
            splitter: RecursiveCharacterSplitter::new(chunking.chunk_size, chunking.chunk_overlap),
            dimension: u64::from(config.embedding.dimension),
            namespace: config.vector_store.namespace.clone(),
            text_key: config.vector_store.text_key.clone(),
            concurrency: config.embedding.concurrency.max(1),
        }
    }

    /// Build the HTTP embedding client and the configured index backend.
    pub async fn connect(config: &Config, credentials: &Credentials) -> Result<Self, IngestError> {
        let embedder = EmbeddingClient::new(&config.embedding, &credentials.embedding_api_key)?;

        let mut store_config = config.vector_store.clone();
        store_config.index = credentials.index_name.clone();
        let index = create_index(&store_config, u64::from(config.embedding.dimension)).await?;

        Ok(Self::new(Arc::new(embedder), index, config))
    }

    #[must_use]
    pub fn with_registry(mut self, registry: ProcessorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    pub async fn get_embedding(&self, text: &str) -> Result<Vec<f32>, IngestError> {
        Ok(get_embedding(self.embedder.as_ref(), text, self.dimension as usize).await?)
    }

    pub async fn check_dimension(&self) -> Result<IndexStats, IngestError> {
        check_dimension(self.index.as_ref(), self.dimension).await
    }

    /// Split, embed and upsert plain-text documents. Returns the number of
    /// records written.
    ///
    /// Pipeline fields (`chunkIndex`, `totalChunks`, `timestamp` and the
    /// text field) overwrite caller metadata with the same name.
    pub async fn embed_and_store(
        &self,
        documents: &[IngestDocument],
        splitter: Option<&RecursiveCharacterSplitter>,
    ) -> Result<usize, IngestError> {
        for (i, document) in documents.iter().enumerate() {
            if document.source().is_none() {
                return Err(IngestError::InvalidDocument(format!(
                    "document {i} has no source in its metadata"
                )));
            }
        }

        self.check_dimension().await?;

        let splitter = splitter.unwrap_or(&self.splitter);
        let split: Vec<Vec<String>> = documents
            .iter()
            .map(|d| splitter.split_text(&d.text))
            .collect();
        let texts: Vec<String> = split.iter().flatten().cloned().collect();
        let embeddings = self.embed_all(&texts).await?;

        let epoch_ms = chrono::Utc::now().timestamp_millis();
        let timestamp = chrono::Utc::now().to_rfc3339();
        let mut embeddings = embeddings.into_iter();
        let mut records = Vec::with_capacity(texts.len());

        for (document, chunks) in documents.iter().zip(split) {
            let document_key = new_document_key();
            let total_chunks = chunks.len();

            let chunks = chunks.into_iter().zip(embeddings.by_ref());
            for (chunk_index, (text, values)) in chunks.enumerate() {
                let mut metadata: Map<String, Value> = document.metadata.clone();
                metadata.insert("chunkIndex".to_string(), chunk_index.into());
                metadata.insert("totalChunks".to_string(), total_chunks.into());
                metadata.insert("timestamp".to_string(), timestamp.clone().into());
                metadata.insert(self.text_key.clone(), text.into());

                records.push(VectorRecord {
                    id: VectorRecord::generate_id(epoch_ms, &document_key, chunk_index),
                    values,
                    metadata,
                });
            }
        }

        self.store(records).await
    }

    /// Embed and upsert the chunks of a processed document.
    pub async fn embed_processed(&self, document: &ProcessedDocument) -> Result<usize, IngestError> {
        self.check_dimension().await?;

        let texts: Vec<String> = document.chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embed_all(&texts).await?;

        let records = document
            .chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                EmbeddingResult::new(chunk, embedding).into_record(&self.text_key)
            })
            .collect();

        self.store(records).await
    }

    /// Process an upload with the processor registered for its MIME type,
    /// then embed and store its chunks.
    pub async fn ingest(&self, raw: &RawDocument) -> Result<ProcessedDocument, IngestError> {
        let processor = self.registry.get(&raw.mime_type)?;
        let document = processor.process(&raw.bytes)?;
        let stored = self.embed_processed(&document).await?;

        info!(
            processor = processor.name(),
            chunks = stored,
            checksum = %document.metadata.checksum,
            "Ingested document"
        );
        Ok(document)
    }

    /// Read side of the index scoped to the configured namespace.
    pub async fn init_vector_store(&self) -> Result<SimilarityStore, IngestError> {
        self.check_dimension().await?;

        Ok(SimilarityStore {
            embedder: Arc::clone(&self.embedder),
            index: Arc::clone(&self.index),
            namespace: self.namespace.clone(),
            text_key: self.text_key.clone(),
            dimension: self.dimension as usize,
        })
    }

    /// Embed all texts with bounded concurrency, returning vectors in input order.
    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        let mut indexed: Vec<(usize, Vec<f32>)> = stream::iter(texts.iter().enumerate())
            .map(|(i, text)| async move { self.get_embedding(text).await.map(|v| (i, v)) })
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        indexed.sort_by_key(|(i, _)| *i);
        debug!(count = indexed.len(), "Embedded chunks");
        Ok(indexed.into_iter().map(|(_, v)| v).collect())
    }

    async fn store(&self, records: Vec<VectorRecord>) -> Result<usize, IngestError> {
        let count = records.len();
        if count == 0 {
            return Ok(0);
        }

        self.index.upsert(&self.namespace, records).await?;
        info!(
            index = self.index.index_name(),
            namespace = %self.namespace,
            records = count,
            "Upserted records"
        );
        Ok(count)
    }
}

/// Similarity search over records in one namespace that carry a `source`.
pub struct SimilarityStore {
    embedder: Arc<dyn EmbeddingService>,
    index: Arc<dyn VectorIndex>,
    namespace: String,
    text_key: String,
    dimension: usize,
}

impl SimilarityStore {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn text_key(&self) -> &str {
        &self.text_key
    }

    pub async fn similarity_search(
        &self,
        query: &str,
        k: u64,
    ) -> Result<Vec<ScoredRecord>, IngestError> {
        let vector = get_embedding(self.embedder.as_ref(), query, self.dimension).await?;
        let matches = self
            .index
            .query(QueryRequest {
                namespace: self.namespace.clone(),
                vector,
                top_k: k,
                required_field: Some(REQUIRED_FIELD.to_string()),
            })
            .await?;

        Ok(matches
            .into_iter()
            .map(|m| {
                let mut metadata = m.metadata;
                let text = match metadata.remove(&self.text_key) {
                    Some(Value::String(text)) => text,
                    _ => String::new(),
                };
                ScoredRecord {
                    id: m.id,
                    score: m.score,
                    text,
                    metadata,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_EMBEDDING_DIMENSION;
    use crate::services::vector_store::MemoryBackend;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    const DIM: usize = DEFAULT_EMBEDDING_DIMENSION as usize;

    /// Encodes the input length in the first component. Inputs containing
    /// "FAIL" error; shorter inputs take longer to finish.
    #[derive(Default)]
    struct FakeEmbedder {
        inputs: Mutex<Vec<String>>,
        dimension: Option<usize>,
    }

    #[async_trait]
    impl EmbeddingService for FakeEmbedder {
        async fn embed(&self, input: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.inputs.lock().unwrap().push(input.to_string());
            if input.contains("FAIL") {
                return Err(EmbeddingError::ServerError("status 500".to_string()));
            }

            let delay = 40u64.saturating_sub(input.len() as u64);
            tokio::time::sleep(Duration::from_millis(delay)).await;

            let mut vector = vec![0.0; self.dimension.unwrap_or(DIM)];
            vector[0] = input.len() as f32;
            vector[1] = 1.0;
            Ok(vector)
        }

        fn model(&self) -> &str {
            "fake-embedding"
        }
    }

    fn setup(index_dimension: u64) -> (Arc<FakeEmbedder>, Arc<MemoryBackend>, IngestPipeline) {
        let embedder = Arc::new(FakeEmbedder::default());
        let index = Arc::new(MemoryBackend::new("test-index", index_dimension));
        let pipeline = IngestPipeline::new(embedder.clone(), index.clone(), &Config::default());
        (embedder, index, pipeline)
    }

    #[tokio::test]
    async fn test_get_embedding_replaces_newlines() {
        let (embedder, _, pipeline) = setup(1536);
        let vector = pipeline.get_embedding("line one\nline two").await.unwrap();

        assert_eq!(vector.len(), DIM);
        assert_eq!(embedder.inputs.lock().unwrap().as_slice(), ["line one line two"]);
    }

    #[tokio::test]
    async fn test_get_embedding_rejects_wrong_width() {
        let embedder = FakeEmbedder {
            dimension: Some(768),
            ..Default::default()
        };
        let result = get_embedding(&embedder, "text", DIM).await;
        assert!(matches!(result, Err(EmbeddingError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_fatal_before_upsert() {
        let (embedder, index, pipeline) = setup(768);
        let documents = vec![IngestDocument::new("ETF basics for beginners.", "guide.md")];

        let result = pipeline.embed_and_store(&documents, None).await;
        assert!(matches!(
            result,
            Err(IngestError::Config(ConfigError::DimensionMismatch {
                expected: 1536,
                actual: 768
            }))
        ));
        assert_eq!(index.upsert_calls(), 0);
        assert!(embedder.inputs.lock().unwrap().is_empty());

        assert!(matches!(
            pipeline.init_vector_store().await,
            Err(IngestError::Config(ConfigError::DimensionMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn test_missing_source_fails_fast() {
        let (_, index, pipeline) = setup(1536);
        let mut anonymous = IngestDocument::new("No provenance here.", "");
        anonymous.metadata.remove("source");
        let documents = vec![
            IngestDocument::new("Has a source.", "faq.md"),
            IngestDocument::new("Blank source.", "  "),
        ];

        assert!(matches!(
            pipeline.embed_and_store(&documents, None).await,
            Err(IngestError::InvalidDocument(_))
        ));
        assert!(matches!(
            pipeline.embed_and_store(&[anonymous], None).await,
            Err(IngestError::InvalidDocument(_))
        ));
        assert_eq!(index.upsert_calls(), 0);
    }

    #[tokio::test]
    async fn test_embed_and_store_single_batch() {
        let (_, index, pipeline) = setup(1536);
        let splitter = RecursiveCharacterSplitter::new(20, 0);
        let documents = vec![
            IngestDocument::new("First line here.\nSecond line here.", "a.md")
                .with_field("chunkIndex", 99)
                .with_field("author", "ops"),
            IngestDocument::new("Only one.", "b.md"),
        ];

        let count = pipeline
            .embed_and_store(&documents, Some(&splitter))
            .await
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(index.upsert_calls(), 1);

        let records = index.records("etf-docs").await;
        assert_eq!(records.len(), 3);

        let first = records
            .iter()
            .find(|r| r.metadata["text"] == "First line here.")
            .unwrap();
        assert!(first.id.starts_with("doc_"));
        assert!(first.id.ends_with("_0"));
        assert_eq!(first.metadata["chunkIndex"], 0);
        assert_eq!(first.metadata["totalChunks"], 2);
        assert_eq!(first.metadata["source"], "a.md");
        assert_eq!(first.metadata["author"], "ops");
        assert!(first.metadata["timestamp"].is_string());

        let second = records
            .iter()
            .find(|r| r.metadata["text"] == "Second line here.")
            .unwrap();
        assert_eq!(second.metadata["chunkIndex"], 1);

        let only = records.iter().find(|r| r.metadata["source"] == "b.md").unwrap();
        assert_eq!(only.metadata["totalChunks"], 1);
    }

    #[tokio::test]
    async fn test_concurrent_embeddings_keep_chunk_order() {
        let (_, index, pipeline) = setup(1536);
        let splitter = RecursiveCharacterSplitter::new(30, 0);
        let text = "a.\nbb bb.\nccc ccc ccc.\ndddd dddd dddd dddd.\ne.";
        let documents = vec![IngestDocument::new(text, "order.md")];

        pipeline
            .embed_and_store(&documents, Some(&splitter))
            .await
            .unwrap();

        for record in index.records("etf-docs").await {
            let text = record.metadata["text"].as_str().unwrap();
            assert_eq!(record.values[0], text.len() as f32);
        }
    }

    #[tokio::test]
    async fn test_embedding_failure_voids_batch() {
        let (_, index, pipeline) = setup(1536);
        let documents = vec![
            IngestDocument::new("Healthy document.", "ok.md"),
            IngestDocument::new("This one will FAIL.", "bad.md"),
        ];

        assert!(matches!(
            pipeline.embed_and_store(&documents, None).await,
            Err(IngestError::Embedding(EmbeddingError::ServerError(_)))
        ));
        assert_eq!(index.upsert_calls(), 0);
    }

    #[tokio::test]
    async fn test_ingest_markdown_upload() {
        let (_, index, pipeline) = setup(1536);
        let raw = RawDocument::new(
            "# ETF 가이드\n\nETF는 상장지수펀드입니다. 주식처럼 거래됩니다.".as_bytes(),
            "text/markdown",
        );

        let document = pipeline.ingest(&raw).await.unwrap();
        let records = index.records("etf-docs").await;
        assert_eq!(records.len(), document.chunks.len());

        let record = &records[0];
        assert_eq!(record.id, document.chunks[0].id);
        assert!(record.id.starts_with("chunk_"));
        assert_eq!(record.metadata["type"], "markdown");
        assert_eq!(record.metadata["source"], "markdown_upload");
        assert_eq!(record.metadata["language"], "ko");
        assert_eq!(record.metadata["text"], document.chunks[0].content.as_str());
    }

    #[tokio::test]
    async fn test_ingest_unsupported_format() {
        let (_, index, pipeline) = setup(1536);
        let raw = RawDocument::new(vec![0u8; 8], "image/png");

        assert!(matches!(
            pipeline.ingest(&raw).await,
            Err(IngestError::UnsupportedFormat(_))
        ));
        assert_eq!(index.upsert_calls(), 0);
    }

    #[tokio::test]
    async fn test_ingest_extraction_error() {
        let (_, _, pipeline) = setup(1536);
        let raw = RawDocument::new("too short".as_bytes(), "text/markdown");
        assert!(matches!(
            pipeline.ingest(&raw).await,
            Err(IngestError::Extraction(_))
        ));
    }

    #[tokio::test]
    async fn test_similarity_search() {
        let (_, _, pipeline) = setup(1536);
        let documents = vec![
            IngestDocument::new("short", "a.md"),
            IngestDocument::new("a considerably longer passage of text", "b.md"),
        ];
        pipeline.embed_and_store(&documents, None).await.unwrap();

        let store = pipeline.init_vector_store().await.unwrap();
        assert_eq!(store.namespace(), "etf-docs");
        assert_eq!(store.text_key(), "text");

        let results = store.similarity_search("query", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "short");
        assert_eq!(results[0].metadata["source"], "a.md");
        assert!(!results[0].metadata.contains_key("text"));
    }
}
