use std::sync::LazyLock;

use lopdf::Document;
use regex::Regex;
use tracing::debug;

use super::DocumentProcessor;
use crate::error::ExtractionError;
use crate::models::{
    ChunkingOptions, DEFAULT_LANGUAGE, DocumentMetadata, DocumentType, ProcessedDocument, Section,
};
use crate::services::{ChunkSplitter, SAFE_CHUNK_SIZE, TokenCounter};
use crate::utils::collapse_blank_lines;
use crate::utils::text::{
    MIN_CONTENT_LENGTH, has_meaningful_content, invalid_char_count, is_invalid_char, is_too_noisy,
    non_whitespace_count,
};

pub const PDF_MIME_TYPES: [&str; 4] = [
    "application/pdf",
    "application/x-pdf",
    "application/acrobat",
    "application/vnd.pdf",
];

const SECTION_TITLE: &str = "PDF Document";

/// Percent-codes left behind when a fragment is not valid UTF-8 once decoded.
const SYMBOL_ESCAPES: [(&str, &str); 12] = [
    ("%20", " "),
    ("%21", "!"),
    ("%22", "\""),
    ("%27", "'"),
    ("%28", "("),
    ("%29", ")"),
    ("%2C", ","),
    ("%2E", "."),
    ("%2F", "/"),
    ("%3A", ":"),
    ("%3B", ";"),
    ("%3F", "?"),
];

static HORIZONTAL_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\S\n]+").expect("valid regex"));
static SPACE_AROUND_NEWLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" ?\n ?").expect("valid regex"));

pub struct PdfProcessor {
    options: ChunkingOptions,
    splitter: ChunkSplitter,
    language: String,
}

impl PdfProcessor {
    pub fn new(options: ChunkingOptions, counter: TokenCounter) -> Self {
        Self {
            options,
            splitter: ChunkSplitter::new(counter, SAFE_CHUNK_SIZE),
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Per-page text joined by blank lines, plus the page count.
    pub fn extract_text(buffer: &[u8]) -> Result<(String, u32), ExtractionError> {
        if buffer.is_empty() {
            return Err(ExtractionError::EmptyBuffer);
        }

        let document =
            Document::load_mem(buffer).map_err(|e| ExtractionError::Pdf(e.to_string()))?;
        let pages = document.get_pages();
        if pages.is_empty() {
            return Err(ExtractionError::NoPages);
        }

        let mut page_texts = Vec::with_capacity(pages.len());
        for &page_number in pages.keys() {
            match document.extract_text(&[page_number]) {
                Ok(text) => page_texts.push(join_fragments(text.lines())),
                Err(e) => debug!(page = page_number, error = %e, "Could not extract page text"),
            }
        }

        Ok((join_pages(&page_texts), pages.len() as u32))
    }

    /// Validate raw extracted text and build the chunked document from it.
    fn build(&self, raw: &str, page_count: u32) -> Result<ProcessedDocument, ExtractionError> {
        let text = validate_and_clean(raw)?;

        let contents = if self.splitter.counter().count_tokens(&text) > SAFE_CHUNK_SIZE {
            self.splitter.split_fail_soft(&text)
        } else {
            vec![text.clone()]
        };

        let mut metadata = DocumentMetadata::new(DocumentType::Pdf, &text, &self.language);
        metadata.page_count = Some(page_count);

        let sections = vec![Section::new(SECTION_TITLE, text, 1)];
        let document = ProcessedDocument::assemble(metadata, sections, contents, SAFE_CHUNK_SIZE);

        debug!(
            pages = page_count,
            chunks = document.chunks.len(),
            "Processed PDF document"
        );
        Ok(document)
    }
}

impl DocumentProcessor for PdfProcessor {
    fn process(&self, buffer: &[u8]) -> Result<ProcessedDocument, ExtractionError> {
        let (raw, page_count) = Self::extract_text(buffer)?;
        self.build(&raw, page_count)
    }

    fn doc_type(&self) -> DocumentType {
        DocumentType::Pdf
    }

    fn supported_types(&self) -> &[&'static str] {
        &PDF_MIME_TYPES
    }

    fn options(&self) -> &ChunkingOptions {
        &self.options
    }

    fn name(&self) -> &str {
        "pdf"
    }
}

fn join_fragments<'a>(fragments: impl Iterator<Item = &'a str>) -> String {
    fragments
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(decode_fragment)
        .collect::<Vec<_>>()
        .join(" ")
}

fn join_pages(pages: &[String]) -> String {
    pages
        .iter()
        .filter(|p| !p.trim().is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn decode_fragment(fragment: &str) -> String {
    if !fragment.contains('%') {
        return fragment.to_string();
    }
    percent_decode(fragment).unwrap_or_else(|| unescape_symbols(fragment))
}

/// Decode `%XX` escapes; stray `%` signs pass through. `None` when the
/// decoded bytes are not UTF-8.
fn percent_decode(fragment: &str) -> Option<String> {
    let bytes = fragment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8(out).ok()
}

fn hex_value(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

fn unescape_symbols(fragment: &str) -> String {
    SYMBOL_ESCAPES
        .iter()
        .fold(fragment.to_string(), |acc, (code, symbol)| {
            acc.replace(code, symbol).replace(&code.to_lowercase(), symbol)
        })
}

fn clean_text(raw: &str) -> String {
    let stripped: String = raw
        .replace("\r\n", "\n")
        .chars()
        .filter(|&c| !is_invalid_char(c))
        .collect();
    let collapsed = HORIZONTAL_WHITESPACE.replace_all(&stripped, " ");
    let tidied = SPACE_AROUND_NEWLINE.replace_all(&collapsed, "\n");
    collapse_blank_lines(&tidied).trim().to_string()
}

/// Reject empty, noisy or too-short text; return the cleaned text otherwise.
fn validate_and_clean(raw: &str) -> Result<String, ExtractionError> {
    if raw.trim().is_empty() {
        return Err(ExtractionError::NoText);
    }
    if is_too_noisy(raw) {
        return Err(ExtractionError::TooNoisy {
            invalid: invalid_char_count(raw),
            total: raw.chars().count(),
        });
    }

    let text = clean_text(raw);
    if !has_meaningful_content(&text) {
        return Err(ExtractionError::TooShort {
            length: non_whitespace_count(&text),
            minimum: MIN_CONTENT_LENGTH,
        });
    }
    Ok(text)
}
