//! Error types for the ingestion pipeline.

use thiserror::Error;

/// Errors raised by the token encoder while splitting or counting.
#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("failed to load tokenizer: {0}")]
    LoadError(String),

    #[error("failed to encode text: {0}")]
    EncodeError(String),

    #[error("failed to decode tokens: {0}")]
    DecodeError(String),
}

/// Errors turning an upload into clean text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("document buffer is empty")]
    EmptyBuffer,

    #[error("failed to parse PDF: {0}")]
    Pdf(String),

    #[error("PDF contains no pages")]
    NoPages,

    #[error("no text could be extracted from the document")]
    NoText,

    #[error("extracted text is mostly invalid characters ({invalid} of {total})")]
    TooNoisy { invalid: usize, total: usize },

    #[error("extracted text is too short ({length} < {minimum} characters)")]
    TooShort { length: usize, minimum: usize },

    #[error("chunking failed: {0}")]
    Tokenizer(#[from] TokenizerError),
}

/// MIME type with no registered processor.
#[derive(Debug, Error)]
#[error("unsupported document format: {0}")]
pub struct UnsupportedFormatError(pub String);

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding service: {0}")]
    ConnectionError(String),

    #[error("embedding service error: {0}")]
    ServerError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding timeout")]
    Timeout,
}

/// Errors related to vector store operations.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("failed to connect to vector store: {0}")]
    ConnectionError(String),

    #[error("index error: {0}")]
    IndexError(String),

    #[error("upsert error: {0}")]
    UpsertError(String),

    #[error("search error: {0}")]
    SearchError(String),

    #[error("PostgreSQL error: {0}")]
    PostgresError(String),

    #[error("pgvector extension error: {0}")]
    PgVectorExtensionError(String),
}

/// Errors related to configuration. Always fatal, never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("vector index dimension mismatch: expected {expected}, index reports {actual}")]
    DimensionMismatch { expected: u64, actual: u64 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Errors surfaced by ingestion calls.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    UnsupportedFormat(#[from] UnsupportedFormatError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_format_names_mime() {
        let err = UnsupportedFormatError("image/png".to_string());
        assert!(err.to_string().contains("image/png"));

        let wrapped: IngestError = err.into();
        assert!(wrapped.to_string().contains("image/png"));
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = ConfigError::DimensionMismatch {
            expected: 1536,
            actual: 768,
        };
        let msg = err.to_string();
        assert!(msg.contains("1536"));
        assert!(msg.contains("768"));
    }

    #[test]
    fn test_app_error_wraps_domain_errors() {
        let ingest: IngestError = ExtractionError::NoPages.into();
        let app: AppError = ingest.into();
        assert_eq!(
            app.to_string(),
            "ingest error: extraction error: PDF contains no pages"
        );

        let app: AppError = ConfigError::MissingEnv("OPENAI_API_KEY".into()).into();
        assert!(matches!(app, AppError::Config(ConfigError::MissingEnv(_))));
    }
}
