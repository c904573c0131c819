//! Markdown to plain prose, then token-bounded chunks.
//!
//! Preprocessing turns markup into text an embedding model reads well:
//! tables become "Header: cell." sentences, checkboxes become labels, and
//! formatting markers are dropped while their text is kept.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::DocumentProcessor;
use crate::error::ExtractionError;
use crate::models::{
    ChunkingOptions, DEFAULT_LANGUAGE, DocumentMetadata, DocumentType, ProcessedDocument, Section,
};
use crate::services::{ChunkSplitter, TokenCounter};
use crate::utils::collapse_blank_lines;
use crate::utils::text::MIN_CONTENT_LENGTH;

pub const MAX_TOKENS_PER_CHUNK: usize = 7000;

pub const MARKDOWN_MIME_TYPES: [&str; 2] = ["text/markdown", "text/x-markdown"];

const SECTION_TITLE: &str = "Markdown Document";
const DONE_LABEL: &str = "완료: ";
const TODO_LABEL: &str = "할일: ";
const BULLET: &str = "• ";

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex")
}

static FRONT_MATTER: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?s)\A---[ \t]*\r?\n.*?\r?\n---[ \t]*(?:\r?\n|\z)"));
static IMAGE: LazyLock<Regex> = LazyLock::new(|| compile(r"!\[[^\]]*\]\([^)]*\)"));
static LINK: LazyLock<Regex> = LazyLock::new(|| compile(r"\[([^\]]+)\]\([^)]*\)"));
static HTML_BLOCK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)</?(?:p|div|br|hr|h[1-6]|li|ul|ol|table|thead|tbody|tr|td|th|section|article|header|footer|blockquote|pre)\b[^>]*>",
    )
});
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| compile(r"<[^>\n]+>"));
static BLOCKQUOTE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?m)^[ \t]*(?:>[ \t]?)+"));
static FENCED_CODE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?s)```[^\n]*\n(.*?)```"));
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| compile(r"`([^`\n]+)`"));
static BOLD_STARS: LazyLock<Regex> = LazyLock::new(|| compile(r"\*\*([^*\n]+)\*\*"));
static BOLD_UNDERSCORES: LazyLock<Regex> = LazyLock::new(|| compile(r"__([^_\n]+)__"));
static ITALIC_STAR: LazyLock<Regex> = LazyLock::new(|| compile(r"\*([^*\s][^*\n]*?)\*"));
static ITALIC_UNDERSCORE: LazyLock<Regex> = LazyLock::new(|| compile(r"\b_([^_\n]+)_\b"));
static CHECKBOX_DONE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?m)^[ \t]*[-*+][ \t]+\[[xX]\][ \t]*"));
static CHECKBOX_TODO: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?m)^[ \t]*[-*+][ \t]+\[ \][ \t]*"));
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?m)^[ \t]*#{1,6}[ \t]+(.+?)(?:[ \t]+#+)?[ \t]*$"));
static HEADING_LINE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^[ \t]*(#{1,6})[ \t]+(.+?)(?:[ \t]+#+)?[ \t]*$"));
static BULLET_MARKER: LazyLock<Regex> = LazyLock::new(|| compile(r"(?m)^([ \t]*)[-*+][ \t]+"));
static HORIZONTAL_RULE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?m)^[ \t]*(?:(?:-[ \t]*){3,}|(?:\*[ \t]*){3,}|(?:_[ \t]*){3,})$")
});

pub struct MarkdownProcessor {
    options: ChunkingOptions,
    splitter: ChunkSplitter,
    language: String,
}

impl MarkdownProcessor {
    pub fn new(options: ChunkingOptions, counter: TokenCounter) -> Self {
        Self {
            options,
            splitter: ChunkSplitter::new(counter, MAX_TOKENS_PER_CHUNK),
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

impl DocumentProcessor for MarkdownProcessor {
    fn process(&self, buffer: &[u8]) -> Result<ProcessedDocument, ExtractionError> {
        if buffer.is_empty() {
            return Err(ExtractionError::EmptyBuffer);
        }

        let source = String::from_utf8_lossy(buffer);
        let text = preprocess_markdown(&source);

        let length = text.trim().chars().count();
        if length < MIN_CONTENT_LENGTH {
            return Err(ExtractionError::TooShort {
                length,
                minimum: MIN_CONTENT_LENGTH,
            });
        }

        let contents = self.splitter.split(&text)?;
        let headings = outline(&FRONT_MATTER.replace(&source, ""));

        let mut metadata = DocumentMetadata::new(DocumentType::Markdown, &text, &self.language);
        metadata.title = headings.first().map(|s| s.title.clone());

        let mut document_section = Section::new(SECTION_TITLE, text, 1);
        for heading in headings {
            document_section.push_child(heading);
        }

        let document = ProcessedDocument::assemble(
            metadata,
            vec![document_section],
            contents,
            MAX_TOKENS_PER_CHUNK,
        );

        debug!(
            sections = document.sections.iter().map(Section::count).sum::<usize>(),
            chunks = document.chunks.len(),
            "Processed markdown document"
        );
        Ok(document)
    }

    fn doc_type(&self) -> DocumentType {
        DocumentType::Markdown
    }

    fn supported_types(&self) -> &[&'static str] {
        &MARKDOWN_MIME_TYPES
    }

    fn options(&self) -> &ChunkingOptions {
        &self.options
    }

    fn name(&self) -> &str {
        "markdown"
    }
}

/// Strip markup, keeping the readable text. Each step runs on the output of
/// the previous one.
pub fn preprocess_markdown(source: &str) -> String {
    let text = source.replace("\r\n", "\n");
    let text = FRONT_MATTER.replace(&text, "");
    let text = convert_tables(&text);
    let text = IMAGE.replace_all(&text, "");
    let text = LINK.replace_all(&text, "${1}");
    let text = HTML_BLOCK_TAG.replace_all(&text, "\n");
    let text = HTML_TAG.replace_all(&text, "");
    let text = BLOCKQUOTE.replace_all(&text, "");
    let text = FENCED_CODE.replace_all(&text, "${1}");
    let text = INLINE_CODE.replace_all(&text, "${1}");
    let text = BOLD_STARS.replace_all(&text, "${1}");
    let text = BOLD_UNDERSCORES.replace_all(&text, "${1}");
    let text = ITALIC_STAR.replace_all(&text, "${1}");
    let text = ITALIC_UNDERSCORE.replace_all(&text, "${1}");
    let text = CHECKBOX_DONE.replace_all(&text, DONE_LABEL);
    let text = CHECKBOX_TODO.replace_all(&text, TODO_LABEL);
    let text = HEADING.replace_all(&text, "${1}\n");
    let text = BULLET_MARKER.replace_all(&text, format!("${{1}}{BULLET}").as_str());
    let text = HORIZONTAL_RULE.replace_all(&text, "");
    let text = collapse_blank_lines(&text);

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Rewrite pipe tables as one "Header: cell." sentence per data row.
fn convert_tables(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;

    while i < lines.len() {
        let is_table_start =
            is_table_row(lines[i]) && lines.get(i + 1).is_some_and(|l| is_separator_row(l));
        if !is_table_start {
            out.push(lines[i].to_string());
            i += 1;
            continue;
        }

        let headers = table_cells(lines[i]);
        i += 2;
        while i < lines.len() && is_table_row(lines[i]) {
            let sentence = headers
                .iter()
                .zip(table_cells(lines[i]))
                .filter(|(_, cell)| !cell.is_empty())
                .map(|(header, cell)| format!("{header}: {cell}."))
                .collect::<Vec<_>>()
                .join(" ");
            if !sentence.is_empty() {
                out.push(sentence);
            }
            i += 1;
        }
    }

    out.join("\n")
}

fn is_table_row(line: &str) -> bool {
    let line = line.trim();
    line.starts_with('|') && line.len() > 1
}

fn is_separator_row(line: &str) -> bool {
    let line = line.trim();
    line.starts_with('|')
        && line.contains('-')
        && line.chars().all(|c| matches!(c, '|' | '-' | ':' | ' ' | '\t'))
}

fn table_cells(line: &str) -> Vec<String> {
    line.trim()
        .trim_start_matches('|')
        .trim_end_matches('|')
        .split('|')
        .map(|cell| cell.trim().to_string())
        .collect()
}

/// Heading tree of the markdown, one level below the document section.
/// Section content is preprocessed like the document body. Headings inside
/// code fences are ignored.
fn outline(source: &str) -> Vec<Section> {
    let mut roots: Vec<Section> = Vec::new();
    let mut stack: Vec<Section> = Vec::new();
    let mut in_fence = false;

    for line in source.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }

        let heading = (!in_fence)
            .then(|| HEADING_LINE.captures(line))
            .flatten();

        match heading {
            Some(caps) => {
                let level = caps[1].len() as u32 + 1;
                while stack.last().is_some_and(|s| s.level >= level) {
                    close_section(&mut stack, &mut roots);
                }
                stack.push(Section::new(caps[2].trim(), String::new(), level));
            }
            None => {
                if let Some(current) = stack.last_mut() {
                    current.content.push_str(line);
                    current.content.push('\n');
                }
            }
        }
    }
    while !stack.is_empty() {
        close_section(&mut stack, &mut roots);
    }
    roots
}

fn close_section(stack: &mut Vec<Section>, roots: &mut Vec<Section>) {
    let Some(mut section) = stack.pop() else {
        return;
    };
    section.content = preprocess_markdown(&section.content);
    match stack.last_mut() {
        Some(parent) => parent.push_child(section),
        None => roots.push(section),
    }
}
