mod chunk;
mod config;
mod ingest;
mod search;
mod status;
mod tokens;

use std::path::Path;

use anyhow::{Context, Result};

use crate::models::RawDocument;
use crate::utils::{mime_type_for_path, read_document};

pub use chunk::ChunkArgs;
pub use config::ConfigCommand;
pub use ingest::IngestArgs;
pub use search::SearchArgs;
pub use tokens::TokensArgs;

pub use chunk::handle_chunk;
pub use config::handle_config;
pub use ingest::handle_ingest;
pub use search::handle_search;
pub use status::handle_status;
pub use tokens::handle_tokens;

/// Uploads larger than this are rejected before reading.
pub const MAX_DOCUMENT_SIZE: u64 = 50 * 1024 * 1024;

/// Read `path` into a raw upload, taking the MIME type from `mime` or the
/// file extension.
pub(crate) fn load_raw_document(path: &Path, mime: Option<&str>) -> Result<RawDocument> {
    let mime_type = match mime {
        Some(m) => m.to_string(),
        None => mime_type_for_path(path)
            .with_context(|| {
                format!(
                    "cannot infer document type of {}; pass --mime",
                    path.display()
                )
            })?
            .to_string(),
    };

    let bytes = read_document(path, MAX_DOCUMENT_SIZE)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(RawDocument::new(bytes, mime_type))
}
