use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw upload handed to the ingestion core: bytes plus the declared MIME type.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl RawDocument {
    pub fn new(bytes: impl Into<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Knobs controlling how a processor may merge or split text spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChunkingOptions {
    pub min_length: usize,
    pub max_length: usize,
    pub overlap: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            min_length: 100,
            max_length: 1000,
            overlap: 200,
        }
    }
}

impl ChunkingOptions {
    #[must_use]
    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }

    #[must_use]
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    #[must_use]
    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Pdf,
    Markdown,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Pdf => "pdf",
            DocumentType::Markdown => "markdown",
        }
    }

    /// Provenance label written into every chunk record.
    pub fn upload_source(&self) -> &'static str {
        match self {
            DocumentType::Pdf => "pdf_upload",
            DocumentType::Markdown => "markdown_upload",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub source: String,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub uploaded_at: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub checksum: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    pub word_count: usize,
    pub char_count: usize,
}

impl DocumentMetadata {
    pub fn new(doc_type: DocumentType, text: &str, language: &str) -> Self {
        Self {
            source: doc_type.upload_source().to_string(),
            doc_type,
            uploaded_at: chrono::Utc::now().to_rfc3339(),
            language: language.to_string(),
            title: None,
            checksum: crate::utils::calculate_checksum(text),
            page_count: None,
            word_count: text.split_whitespace().count(),
            char_count: text.chars().count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionMetadata {
    pub title: String,
    pub level: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// A titled span of content. Children are owned exclusively by their parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub content: String,
    pub level: u32,
    pub children: Vec<Section>,
    pub metadata: SectionMetadata,
}

impl Section {
    pub fn new(title: impl Into<String>, content: impl Into<String>, level: u32) -> Self {
        let title = title.into();
        Self {
            metadata: SectionMetadata {
                title: title.clone(),
                level,
                page_number: None,
                index: 0,
                parent: None,
            },
            title,
            content: content.into(),
            level,
            children: Vec::new(),
        }
    }

    /// Attach a child, wiring its index and parent title.
    pub fn push_child(&mut self, mut child: Section) {
        child.metadata.index = self.children.len();
        child.metadata.parent = Some(self.title.clone());
        self.children.push(child);
    }

    /// Number of sections in this subtree, including `self`.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Section::count).sum::<usize>()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    #[serde(flatten)]
    pub document: DocumentMetadata,
    pub section: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_chunk_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_chunk_id: Option<String>,
    pub start_index: usize,
    pub end_index: usize,
}

impl ChunkMetadata {
    /// Payload stored next to the vector; `text_key` names the content field.
    pub fn payload(&self, id: &str, content: &str, text_key: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("id".to_string(), id.into());
        map.insert(text_key.to_string(), content.into());
        map.insert("chunkIndex".to_string(), self.chunk_index.into());
        map.insert("totalChunks".to_string(), self.total_chunks.into());
        map.insert("startIndex".to_string(), self.start_index.into());
        map.insert("endIndex".to_string(), self.end_index.into());
        map.insert("source".to_string(), self.document.source.clone().into());
        map.insert("type".to_string(), self.document.doc_type.as_str().into());
        map.insert(
            "uploadedAt".to_string(),
            self.document.uploaded_at.clone().into(),
        );
        map.insert("language".to_string(), self.document.language.clone().into());
        map.insert("section".to_string(), self.section.clone().into());
        map.insert("checksum".to_string(), self.document.checksum.clone().into());
        if let Some(ref prev) = self.prev_chunk_id {
            map.insert("prevChunkId".to_string(), prev.clone().into());
        }
        if let Some(ref next) = self.next_chunk_id {
            map.insert("nextChunkId".to_string(), next.clone().into());
        }
        map
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedChunk {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl ProcessedChunk {
    pub fn generate_id(epoch_ms: i64, document_key: &str, chunk_index: usize) -> String {
        format!("chunk_{}_{}_{}", epoch_ms, document_key, chunk_index)
    }

    /// Payload stored next to the vector; `text_key` names the content field.
    pub fn record_metadata(&self, text_key: &str) -> Map<String, Value> {
        self.metadata.payload(&self.id, &self.content, text_key)
    }
}

/// Full output of one processor invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub metadata: DocumentMetadata,
    pub sections: Vec<Section>,
    pub chunks: Vec<ProcessedChunk>,
}

impl ProcessedDocument {
    /// Build chunk records from split contents.
    ///
    /// `offset_stride` produces the approximate `startIndex`/`endIndex`
    /// (`index * stride`), an ordering hint rather than a byte range.
    pub fn assemble(
        metadata: DocumentMetadata,
        sections: Vec<Section>,
        contents: Vec<String>,
        offset_stride: usize,
    ) -> Self {
        let epoch_ms = chrono::Utc::now().timestamp_millis();
        let document_key = new_document_key();
        let total_chunks = contents.len();
        let section = sections
            .first()
            .map(|s| s.title.clone())
            .unwrap_or_default();

        let ids: Vec<String> = (0..total_chunks)
            .map(|i| ProcessedChunk::generate_id(epoch_ms, &document_key, i))
            .collect();

        let chunks = contents
            .into_iter()
            .enumerate()
            .map(|(chunk_index, content)| ProcessedChunk {
                id: ids[chunk_index].clone(),
                content,
                metadata: ChunkMetadata {
                    document: metadata.clone(),
                    section: section.clone(),
                    chunk_index,
                    total_chunks,
                    prev_chunk_id: chunk_index.checked_sub(1).map(|i| ids[i].clone()),
                    next_chunk_id: ids.get(chunk_index + 1).cloned(),
                    start_index: chunk_index * offset_stride,
                    end_index: (chunk_index + 1) * offset_stride,
                },
            })
            .collect();

        Self {
            metadata,
            sections,
            chunks,
        }
    }
}

/// Short random component that keeps ids from two uploads in the same
/// millisecond apart.
pub fn new_document_key() -> String {
    let mut key = uuid::Uuid::new_v4().simple().to_string();
    key.truncate(12);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> DocumentMetadata {
        DocumentMetadata::new(DocumentType::Pdf, "ETF 문서 본문입니다", "ko")
    }

    #[test]
    fn test_chunking_options_defaults_and_partial_merge() {
        let defaults = ChunkingOptions::default();
        assert_eq!(defaults.min_length, 100);
        assert_eq!(defaults.max_length, 1000);
        assert_eq!(defaults.overlap, 200);

        let partial: ChunkingOptions = serde_json::from_str(r#"{"maxLength": 500}"#).unwrap();
        assert_eq!(partial.max_length, 500);
        assert_eq!(partial.min_length, 100);
        assert_eq!(partial.overlap, 200);

        let built = ChunkingOptions::default().with_overlap(50);
        assert_eq!(built.overlap, 50);
    }

    #[test]
    fn test_assemble_indexes_and_links_chunks() {
        let doc = ProcessedDocument::assemble(
            sample_metadata(),
            vec![Section::new("PDF Document", "a b c", 1)],
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            7000,
        );

        assert_eq!(doc.chunks.len(), 3);
        for (i, chunk) in doc.chunks.iter().enumerate() {
            assert_eq!(chunk.metadata.chunk_index, i);
            assert_eq!(chunk.metadata.total_chunks, 3);
            assert_eq!(chunk.metadata.start_index, i * 7000);
            assert_eq!(chunk.metadata.end_index, (i + 1) * 7000);
            assert_eq!(chunk.metadata.section, "PDF Document");
            assert!(chunk.id.starts_with("chunk_"));
            assert!(chunk.id.ends_with(&format!("_{i}")));
        }
        assert_eq!(doc.chunks[0].metadata.prev_chunk_id, None);
        assert_eq!(
            doc.chunks[1].metadata.prev_chunk_id.as_deref(),
            Some(doc.chunks[0].id.as_str())
        );
        assert_eq!(
            doc.chunks[1].metadata.next_chunk_id.as_deref(),
            Some(doc.chunks[2].id.as_str())
        );
        assert_eq!(doc.chunks[2].metadata.next_chunk_id, None);
    }

    #[test]
    fn test_chunk_ids_differ_between_documents() {
        let a = ProcessedDocument::assemble(sample_metadata(), vec![], vec!["x".into()], 1);
        let b = ProcessedDocument::assemble(sample_metadata(), vec![], vec!["x".into()], 1);
        assert_ne!(a.chunks[0].id, b.chunks[0].id);
    }

    #[test]
    fn test_record_metadata_shape() {
        let doc = ProcessedDocument::assemble(
            sample_metadata(),
            vec![Section::new("PDF Document", "body", 1)],
            vec!["body".to_string()],
            7000,
        );
        let record = doc.chunks[0].record_metadata("text");

        assert_eq!(record["text"], "body");
        assert_eq!(record["chunkIndex"], 0);
        assert_eq!(record["totalChunks"], 1);
        assert_eq!(record["startIndex"], 0);
        assert_eq!(record["endIndex"], 7000);
        assert_eq!(record["source"], "pdf_upload");
        assert_eq!(record["type"], "pdf");
        assert_eq!(record["language"], "ko");
        assert!(record["uploadedAt"].as_str().unwrap().contains('T'));
        assert!(!record.contains_key("prevChunkId"));
    }

    #[test]
    fn test_chunk_metadata_serializes_flat() {
        let doc = ProcessedDocument::assemble(sample_metadata(), vec![], vec!["x".into()], 1);
        let json = serde_json::to_value(&doc.chunks[0].metadata).unwrap();
        assert_eq!(json["type"], "pdf");
        assert_eq!(json["chunkIndex"], 0);
        assert_eq!(json["source"], "pdf_upload");
    }

    #[test]
    fn test_section_children() {
        let mut root = Section::new("Guide", "", 1);
        root.push_child(Section::new("Basics", "...", 2));
        root.push_child(Section::new("Risks", "...", 2));
        assert_eq!(root.count(), 3);
        assert_eq!(root.children[1].metadata.index, 1);
        assert_eq!(root.children[1].metadata.parent.as_deref(), Some("Guide"));
    }
}
