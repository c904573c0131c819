//! Document processors: raw upload bytes in, chunked document out.

mod markdown;
mod pdf;
mod registry;

pub use markdown::{
    MARKDOWN_MIME_TYPES, MAX_TOKENS_PER_CHUNK, MarkdownProcessor, preprocess_markdown,
};
pub use pdf::{PDF_MIME_TYPES, PdfProcessor};
pub use registry::{ProcessorRegistry, get_document_processor};

use crate::error::ExtractionError;
use crate::models::{ChunkingOptions, DocumentType, ProcessedDocument};

/// One implementation per document format.
///
/// `process` either returns a complete document or fails; it never yields a
/// partially built one.
pub trait DocumentProcessor: Send + Sync {
    fn process(&self, buffer: &[u8]) -> Result<ProcessedDocument, ExtractionError>;

    fn doc_type(&self) -> DocumentType;

    /// MIME types this processor is registered under.
    fn supported_types(&self) -> &[&'static str];

    fn options(&self) -> &ChunkingOptions;

    /// Get the processor name for logging.
    fn name(&self) -> &str;
}
