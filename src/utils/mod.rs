//! Utility modules.

pub mod file;
pub mod text;

pub use file::{
    MARKDOWN_MIME, PDF_MIME, calculate_checksum, find_documents, get_relative_path,
    mime_type_for_path, read_document,
};
pub use text::{collapse_blank_lines, has_meaningful_content, is_too_noisy};
