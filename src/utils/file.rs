//! File utilities for ingestion.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const PDF_MIME: &str = "application/pdf";
pub const MARKDOWN_MIME: &str = "text/markdown";

/// Calculate SHA-256 checksum of content.
pub fn calculate_checksum(content: &str) -> String {
    let hash = Sha256::digest(content.as_bytes());
    hex::encode(hash)
}

/// MIME type inferred from the file extension, for the formats we ingest.
pub fn mime_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    match ext.as_str() {
        "pdf" => Some(PDF_MIME),
        "md" | "markdown" | "mdown" | "mkd" => Some(MARKDOWN_MIME),
        _ => None,
    }
}

/// Read file bytes with size limit.
pub fn read_document(path: &Path, max_size: u64) -> std::io::Result<Vec<u8>> {
    let metadata = fs::metadata(path)?;

    if metadata.len() > max_size {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "file exceeds maximum size: {} > {}",
                metadata.len(),
                max_size
            ),
        ));
    }

    fs::read(path)
}

/// A single file, or every ingestible file below a directory in path order.
/// Hidden entries below the root are skipped; the root itself may be hidden.
pub fn find_documents(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }

    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| mime_type_for_path(p).is_some())
        .collect();
    files.sort();
    files
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str()
        .is_some_and(|s| s.starts_with('.') && s != "." && s != "..")
}

/// Get the relative path from a base directory.
pub fn get_relative_path(base: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(base)
        .ok()
        .map(|p| p.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_calculate_checksum() {
        let checksum = calculate_checksum("hello world");
        assert_eq!(checksum.len(), 64);
        assert_eq!(checksum, calculate_checksum("hello world"));
        assert_ne!(checksum, calculate_checksum("hello world!"));
    }

    #[test]
    fn test_mime_type_for_path() {
        assert_eq!(mime_type_for_path(Path::new("a/guide.pdf")), Some(PDF_MIME));
        assert_eq!(mime_type_for_path(Path::new("GUIDE.PDF")), Some(PDF_MIME));
        assert_eq!(mime_type_for_path(Path::new("notes.md")), Some(MARKDOWN_MIME));
        assert_eq!(mime_type_for_path(Path::new("image.png")), None);
        assert_eq!(mime_type_for_path(Path::new("README")), None);
    }

    #[test]
    fn test_find_documents() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.md"), "# B").unwrap();
        fs::write(dir.path().join("a.pdf"), b"%PDF").unwrap();
        fs::write(dir.path().join("skip.txt"), "x").unwrap();
        fs::create_dir(dir.path().join(".hidden")).unwrap();
        fs::write(dir.path().join(".hidden/c.md"), "# C").unwrap();

        let found: Vec<String> = find_documents(dir.path())
            .iter()
            .filter_map(|p| get_relative_path(dir.path(), p))
            .collect();
        assert_eq!(found, vec!["a.pdf", "b.md"]);

        let single = dir.path().join("b.md");
        assert_eq!(find_documents(&single), vec![single]);
    }

    #[test]
    fn test_find_documents_under_hidden_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join(".docs");
        fs::create_dir_all(root.join("guides")).unwrap();
        fs::create_dir_all(root.join(".cache")).unwrap();
        fs::write(root.join("a.md"), "# A").unwrap();
        fs::write(root.join("guides/b.pdf"), b"%PDF").unwrap();
        fs::write(root.join(".cache/c.md"), "# C").unwrap();
        fs::write(root.join(".draft.md"), "# D").unwrap();

        let found: Vec<String> = find_documents(&root)
            .iter()
            .filter_map(|p| get_relative_path(&root, p))
            .collect();
        assert_eq!(found, vec!["a.md", "guides/b.pdf"]);
    }

    #[test]
    fn test_read_document_size_limit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.md");
        fs::write(&path, "0123456789").unwrap();
        assert!(read_document(&path, 5).is_err());
        assert_eq!(read_document(&path, 100).unwrap(), b"0123456789");
    }
}
