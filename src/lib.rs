pub mod cli;
pub mod error;
pub mod models;
pub mod processors;
pub mod services;
pub mod utils;

pub use cli::{Cli, Commands};
pub use error::{AppError, ExtractionError, IngestError};
pub use models::{Config, OutputFormat, ProcessedDocument, RawDocument};
pub use processors::{DocumentProcessor, ProcessorRegistry, get_document_processor};
pub use services::{IngestPipeline, SimilarityStore, TokenCounter};
