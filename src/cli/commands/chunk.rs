use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use super::load_raw_document;
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::processors::ProcessorRegistry;

#[derive(Debug, Args)]
pub struct ChunkArgs {
    /// PDF or Markdown file to process
    #[arg(required = true)]
    pub path: PathBuf,

    /// Override the MIME type inferred from the file extension
    #[arg(long)]
    pub mime: Option<String>,
}

pub async fn handle_chunk(args: ChunkArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let raw = load_raw_document(&args.path, args.mime.as_deref())?;
    let registry = ProcessorRegistry::from_config(&config.chunking);
    let processor = registry.get(&raw.mime_type)?;

    if verbose {
        eprintln!(
            "Processing {} with the {} processor ({} bytes)",
            args.path.display(),
            processor.name(),
            raw.bytes.len()
        );
    }

    let document = processor
        .process(&raw.bytes)
        .with_context(|| format!("failed to process {}", args.path.display()))?;
    print!("{}", formatter.format_document(&document));

    Ok(())
}
