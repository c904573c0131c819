mod config;
mod document;
mod output;
mod record;

pub use config::{
    ChunkingConfig, Config, Credentials, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_LANGUAGE, DEFAULT_NAMESPACE, DEFAULT_TEXT_KEY, EmbeddingConfig, TokenizerConfig,
    VectorDriver, VectorStoreConfig,
};
pub use document::{
    ChunkMetadata, ChunkingOptions, DocumentMetadata, DocumentType, ProcessedChunk,
    ProcessedDocument, RawDocument, Section, SectionMetadata, new_document_key,
};
pub use output::OutputFormat;
pub use record::{
    EmbeddingResult, IndexStats, IngestDocument, NAMESPACE_FIELD, QueryMatch, ScoredRecord,
    VectorRecord,
};
