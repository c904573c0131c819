use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

use super::MAX_DOCUMENT_SIZE;
use crate::cli::output::{TokenReport, get_formatter};
use crate::models::OutputFormat;
use crate::processors::{PDF_MIME_TYPES, PdfProcessor};
use crate::services::{MAX_TOKENS, TokenCounter};
use crate::utils::{mime_type_for_path, read_document};

#[derive(Debug, Args)]
pub struct TokensArgs {
    /// File to count; PDFs are counted on their extracted text
    #[arg(required = true)]
    pub path: PathBuf,

    /// Token limit to compare against
    #[arg(long, short = 'l', default_value_t = MAX_TOKENS)]
    pub limit: usize,

    /// Override the MIME type inferred from the file extension
    #[arg(long)]
    pub mime: Option<String>,
}

pub async fn handle_tokens(args: TokensArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let formatter = get_formatter(format);
    let bytes = read_document(&args.path, MAX_DOCUMENT_SIZE)
        .with_context(|| format!("failed to read {}", args.path.display()))?;

    let mime = args
        .mime
        .clone()
        .or_else(|| mime_type_for_path(&args.path).map(str::to_string))
        .unwrap_or_default()
        .to_ascii_lowercase();
    let text = if PDF_MIME_TYPES.contains(&mime.as_str()) {
        PdfProcessor::extract_text(&bytes)?.0
    } else {
        String::from_utf8_lossy(&bytes).into_owned()
    };

    let report = token_report(&args.path, &text, args.limit, &TokenCounter::shared());
    if verbose {
        eprintln!("{} chars, {} tokens", text.chars().count(), report.tokens);
    }
    print!("{}", formatter.format_tokens(&report));

    Ok(())
}

fn token_report(path: &Path, text: &str, limit: usize, counter: &TokenCounter) -> TokenReport {
    TokenReport {
        path: path.display().to_string(),
        tokens: counter.count_tokens(text),
        limit,
        exceeds_limit: counter.exceeds_token_limit(text, limit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_report_limit_boundary() {
        let counter = TokenCounter::char_level();
        let path = Path::new("guide.md");

        let at_limit = token_report(path, "상장지수펀드", 6, &counter);
        assert_eq!(at_limit.tokens, 6);
        assert_eq!(at_limit.limit, 6);
        assert!(!at_limit.exceeds_limit);
        assert_eq!(at_limit.path, "guide.md");

        let over = token_report(path, "상장지수펀드", 5, &counter);
        assert!(over.exceeds_limit);

        assert!(!token_report(path, "", 0, &counter).exceeds_limit);
    }
}
