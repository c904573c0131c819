use std::fmt::Write as FmtWrite;

use serde::Serialize;

use crate::models::{OutputFormat, ProcessedDocument, ScoredRecord, Section};

const PREVIEW_CHARS: usize = 200;

pub trait Formatter {
    fn format_document(&self, document: &ProcessedDocument) -> String;
    fn format_ingest_summary(&self, summary: &IngestSummary) -> String;
    fn format_tokens(&self, report: &TokenReport) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_search_results(&self, query: &str, results: &[ScoredRecord]) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    pub files_scanned: u64,
    pub files_ingested: u64,
    pub files_skipped: u64,
    pub chunks_stored: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenReport {
    pub path: String,
    pub tokens: usize,
    pub limit: usize,
    pub exceeds_limit: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub driver: String,
    pub url: String,
    pub index: String,
    pub namespace: String,
    pub connected: bool,
    pub index_dimension: Option<u64>,
    pub expected_dimension: u64,
    pub record_count: Option<u64>,
    pub dimension_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct TextFormatter;

impl TextFormatter {
    fn write_outline(output: &mut String, section: &Section, depth: usize) {
        let _ = writeln!(
            output,
            "{}- {} (level {})",
            "  ".repeat(depth + 1),
            section.title,
            section.level
        );
        for child in &section.children {
            Self::write_outline(output, child, depth + 1);
        }
    }
}

fn preview(content: &str) -> String {
    let head: String = content.chars().take(PREVIEW_CHARS).collect();
    if content.chars().count() > PREVIEW_CHARS {
        format!("{head}...")
    } else {
        head
    }
}

impl Formatter for TextFormatter {
    fn format_document(&self, document: &ProcessedDocument) -> String {
        let meta = &document.metadata;
        let mut output = String::new();
        let _ = writeln!(output, "Document ({})", meta.doc_type.as_str());
        let _ = writeln!(output, "--------");
        if let Some(ref title) = meta.title {
            let _ = writeln!(output, "Title:     {title}");
        }
        if let Some(pages) = meta.page_count {
            let _ = writeln!(output, "Pages:     {pages}");
        }
        let _ = writeln!(output, "Language:  {}", meta.language);
        let _ = writeln!(output, "Words:     {}", meta.word_count);
        let _ = writeln!(output, "Chars:     {}", meta.char_count);
        let _ = writeln!(output, "Checksum:  {}", meta.checksum);
        let _ = writeln!(output, "Chunks:    {}", document.chunks.len());

        let _ = writeln!(output, "Outline:");
        for section in &document.sections {
            Self::write_outline(&mut output, section, 0);
        }
        let _ = writeln!(output);

        for chunk in &document.chunks {
            let m = &chunk.metadata;
            let _ = writeln!(
                output,
                "[{}/{}] {} ({}..{})",
                m.chunk_index + 1,
                m.total_chunks,
                chunk.id,
                m.start_index,
                m.end_index
            );
            for line in preview(&chunk.content).lines() {
                let _ = writeln!(output, "   {line}");
            }
            let _ = writeln!(output);
        }
        output
    }

    fn format_ingest_summary(&self, summary: &IngestSummary) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "Ingestion Complete");
        let _ = writeln!(output, "------------------");
        let _ = writeln!(output, "Files scanned:  {}", summary.files_scanned);
        let _ = writeln!(output, "Files ingested: {}", summary.files_ingested);
        let _ = writeln!(output, "Files skipped:  {}", summary.files_skipped);
        let _ = writeln!(output, "Chunks stored:  {}", summary.chunks_stored);
        let _ = writeln!(output, "Duration:       {}ms", summary.duration_ms);
        output
    }

    fn format_tokens(&self, report: &TokenReport) -> String {
        let verdict = if report.exceeds_limit {
            "[EXCEEDS]"
        } else {
            "[OK]"
        };
        format!(
            "{}: {} tokens (limit {}) {}\n",
            report.path, report.tokens, report.limit, verdict
        )
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "Status");
        let _ = writeln!(output, "------");

        let state = if status.connected {
            "[CONNECTED]"
        } else {
            "[DISCONNECTED]"
        };
        let _ = writeln!(output, "Vector Store:  {} {}", status.driver, state);
        let _ = writeln!(output, "  URL:         {}", status.url);
        let _ = writeln!(output, "  Index:       {}", status.index);
        let _ = writeln!(output, "  Namespace:   {}", status.namespace);
        if let Some(count) = status.record_count {
            let _ = writeln!(output, "  Records:     {count}");
        }

        let dimension = status
            .index_dimension
            .map_or_else(|| "unknown".to_string(), |d| d.to_string());
        let check = if status.dimension_ok {
            "[OK]"
        } else {
            "[MISMATCH]"
        };
        let _ = writeln!(
            output,
            "  Dimension:   {} (expected {}) {}",
            dimension, status.expected_dimension, check
        );
        if let Some(ref error) = status.error {
            let _ = writeln!(output, "  Error:       {error}");
        }
        output
    }

    fn format_search_results(&self, query: &str, results: &[ScoredRecord]) -> String {
        if results.is_empty() {
            return format!("No results found for: {query}\n");
        }

        let mut output = String::new();
        let _ = writeln!(output, "Search results for: \"{query}\"");
        let _ = writeln!(output, "Found {} results\n", results.len());

        for (i, result) in results.iter().enumerate() {
            let _ = writeln!(output, "{}. [Score: {:.3}] {}", i + 1, result.score, result.id);
            if let Some(source) = result.metadata.get("source").and_then(|v| v.as_str()) {
                let _ = writeln!(output, "   Source: {source}");
            }
            let _ = writeln!(output, "   ---");
            for line in preview(&result.text).lines() {
                let _ = writeln!(output, "   {line}");
            }
            let _ = writeln!(output);
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{message}\n")
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {error}\n")
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize + ?Sized>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        let mut text = rendered
            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string());
        text.push('\n');
        text
    }
}

impl Formatter for JsonFormatter {
    fn format_document(&self, document: &ProcessedDocument) -> String {
        self.render(document)
    }

    fn format_ingest_summary(&self, summary: &IngestSummary) -> String {
        self.render(summary)
    }

    fn format_tokens(&self, report: &TokenReport) -> String {
        self.render(report)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        self.render(status)
    }

    fn format_search_results(&self, query: &str, results: &[ScoredRecord]) -> String {
        self.render(&serde_json::json!({
            "query": query,
            "total": results.len(),
            "results": results,
        }))
    }

    fn format_message(&self, message: &str) -> String {
        self.render(&serde_json::json!({ "message": message }))
    }

    fn format_error(&self, error: &str) -> String {
        self.render(&serde_json::json!({ "error": error }))
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}

/// A failed command's error with its context chain, in the requested format.
pub fn render_error(format: OutputFormat, error: &anyhow::Error) -> String {
    get_formatter(format).format_error(&format!("{error:#}"))
}
