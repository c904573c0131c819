//! Processor registry for MIME type to processor mapping.

use std::sync::Arc;

use tracing::debug;

use super::markdown::{MARKDOWN_MIME_TYPES, MarkdownProcessor};
use super::pdf::{PDF_MIME_TYPES, PdfProcessor};
use super::DocumentProcessor;
use crate::error::UnsupportedFormatError;
use crate::models::{ChunkingConfig, ChunkingOptions, DEFAULT_LANGUAGE};
use crate::services::TokenCounter;

/// Stateless dispatch table from MIME type to processor.
pub struct ProcessorRegistry {
    processors: Vec<Arc<dyn DocumentProcessor>>,
}

impl ProcessorRegistry {
    /// Registry with the PDF and Markdown processors.
    pub fn new(options: ChunkingOptions, counter: TokenCounter, language: &str) -> Self {
        let processors: Vec<Arc<dyn DocumentProcessor>> = vec![
            Arc::new(PdfProcessor::new(options, counter.clone()).with_language(language)),
            Arc::new(MarkdownProcessor::new(options, counter).with_language(language)),
        ];
        Self { processors }
    }

    /// Registry built from the `[chunking]` section with the shared counter.
    pub fn from_config(chunking: &ChunkingConfig) -> Self {
        let options = ChunkingOptions::default()
            .with_min_length(chunking.min_length)
            .with_max_length(chunking.max_length)
            .with_overlap(chunking.overlap);
        Self::new(options, TokenCounter::shared(), &chunking.language)
    }

    /// Get the processor registered for `mime_type`.
    pub fn get(&self, mime_type: &str) -> Result<Arc<dyn DocumentProcessor>, UnsupportedFormatError> {
        let normalized = normalize_mime(mime_type);
        let processor = self
            .processors
            .iter()
            .find(|p| p.supported_types().contains(&normalized.as_str()))
            .cloned()
            .ok_or_else(|| UnsupportedFormatError(mime_type.to_string()))?;

        debug!(processor = processor.name(), mime_type, "Selected processor");
        Ok(processor)
    }

    /// Register a custom processor ahead of the built-in ones.
    pub fn register(&mut self, processor: Arc<dyn DocumentProcessor>) {
        self.processors.insert(0, processor);
    }

    /// List all supported MIME types.
    pub fn supported_types(&self) -> Vec<&'static str> {
        self.processors
            .iter()
            .flat_map(|p| p.supported_types().iter().copied())
            .collect()
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new(ChunkingOptions::default(), TokenCounter::shared(), DEFAULT_LANGUAGE)
    }
}

/// Processor for `mime_type` with default options and the shared counter.
pub fn get_document_processor(
    mime_type: &str,
) -> Result<Arc<dyn DocumentProcessor>, UnsupportedFormatError> {
    let normalized = normalize_mime(mime_type);
    let counter = TokenCounter::shared();
    let options = ChunkingOptions::default();

    if PDF_MIME_TYPES.contains(&normalized.as_str()) {
        Ok(Arc::new(PdfProcessor::new(options, counter)))
    } else if MARKDOWN_MIME_TYPES.contains(&normalized.as_str()) {
        Ok(Arc::new(MarkdownProcessor::new(options, counter)))
    } else {
        Err(UnsupportedFormatError(mime_type.to_string()))
    }
}

/// Lowercase and drop parameters such as `; charset=utf-8`.
fn normalize_mime(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentType;

    #[test]
    fn test_pdf_aliases() {
        for mime in [
            "application/pdf",
            "application/x-pdf",
            "application/acrobat",
            "application/vnd.pdf",
        ] {
            assert_eq!(get_document_processor(mime).unwrap().doc_type(), DocumentType::Pdf);
        }
    }

    #[test]
    fn test_markdown_aliases() {
        for mime in ["text/markdown", "text/x-markdown", "Text/Markdown; charset=utf-8"] {
            assert_eq!(
                get_document_processor(mime).unwrap().doc_type(),
                DocumentType::Markdown
            );
        }
    }

    #[test]
    fn test_unsupported_mime() {
        let err = get_document_processor("image/png").err().unwrap();
        assert_eq!(err.0, "image/png");
        assert_eq!(err.to_string(), "unsupported document format: image/png");
        assert!(get_document_processor("text/plain").is_err());
    }

    #[test]
    fn test_registry_matches_free_function() {
        let registry = ProcessorRegistry::default();
        assert_eq!(registry.supported_types().len(), 6);
        assert_eq!(registry.get("application/pdf").unwrap().name(), "pdf");
        assert_eq!(registry.get("text/x-markdown").unwrap().name(), "markdown");
        assert!(registry.get("image/png").is_err());
    }

    #[test]
    fn test_from_config_carries_chunking_options() {
        let chunking = ChunkingConfig {
            min_length: 50,
            max_length: 800,
            ..ChunkingConfig::default()
        };
        let registry = ProcessorRegistry::from_config(&chunking);
        let processor = registry.get("application/pdf").unwrap();
        let options = processor.options();
        assert_eq!(options.min_length, 50);
        assert_eq!(options.max_length, 800);
        assert_eq!(options.overlap, 200);
    }

    #[test]
    fn test_processors_share_chunking_options() {
        let options = ChunkingOptions::default()
            .with_min_length(20)
            .with_max_length(300);
        let registry = ProcessorRegistry::new(options, TokenCounter::char_level(), "en");
        let pdf = registry.get("application/pdf").unwrap();
        let markdown = registry.get("text/markdown").unwrap();
        assert_eq!(*pdf.options(), options);
        assert_eq!(*markdown.options(), options);
    }

    #[test]
    fn test_register_takes_priority() {
        let mut registry = ProcessorRegistry::default();
        let custom = MarkdownProcessor::new(
            ChunkingOptions::default().with_max_length(500),
            TokenCounter::char_level(),
        );
        registry.register(Arc::new(custom));
        assert_eq!(registry.get("text/markdown").unwrap().options().max_length, 500);
        assert_eq!(registry.supported_types().len(), 8);
    }
}
