//! Ingest command implementation.

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;
use tracing::warn;

use super::load_raw_document;
use crate::cli::output::{IngestSummary, get_formatter};
use crate::error::IngestError;
use crate::models::{Config, Credentials, OutputFormat};
use crate::processors::ProcessorRegistry;
use crate::services::IngestPipeline;
use crate::utils::{find_documents, get_relative_path};

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// PDF/Markdown file, or a directory to scan for them
    #[arg(required = true)]
    pub path: PathBuf,

    /// Override the MIME type inferred from the file extension
    #[arg(long)]
    pub mime: Option<String>,

    /// Process and print chunks without contacting the services
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn handle_ingest(args: IngestArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    if !args.path.exists() {
        anyhow::bail!("path does not exist: {}", args.path.display());
    }

    let files = find_documents(&args.path);
    if files.is_empty() {
        print!(
            "{}",
            formatter.format_message("No PDF or Markdown files found to ingest.")
        );
        return Ok(());
    }

    if args.dry_run {
        let registry = ProcessorRegistry::from_config(&config.chunking);
        for file in &files {
            let raw = load_raw_document(file, args.mime.as_deref())?;
            let processor = registry.get(&raw.mime_type)?;
            let document = processor
                .process(&raw.bytes)
                .with_context(|| format!("failed to process {}", file.display()))?;
            print!("{}", formatter.format_document(&document));
        }
        return Ok(());
    }

    let credentials = Credentials::from_env()?;
    let pipeline = IngestPipeline::connect(&config, &credentials)
        .await
        .context("failed to connect to the embedding service or vector index")?;
    pipeline
        .index()
        .ensure_index(u64::from(config.embedding.dimension))
        .await
        .context("failed to prepare vector index")?;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .context("invalid progress template")?
            .progress_chars("#>-"),
    );

    let mut summary = IngestSummary {
        files_scanned: files.len() as u64,
        ..Default::default()
    };

    for file in &files {
        pb.inc(1);
        let label = get_relative_path(&args.path, file)
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| file.display().to_string());

        let raw = match load_raw_document(file, args.mime.as_deref()) {
            Ok(raw) => raw,
            Err(e) => {
                if verbose {
                    pb.println(format!("Skipping {label}: {e:#}"));
                }
                summary.files_skipped += 1;
                continue;
            }
        };

        match pipeline.ingest(&raw).await {
            Ok(document) => {
                summary.files_ingested += 1;
                summary.chunks_stored += document.chunks.len() as u64;
            }
            Err(e @ (IngestError::Extraction(_) | IngestError::UnsupportedFormat(_))) => {
                warn!(file = %label, error = %e, "Skipping document");
                summary.files_skipped += 1;
            }
            Err(e) => {
                pb.finish_and_clear();
                return Err(e).with_context(|| format!("failed to ingest {label}"));
            }
        }
    }

    pb.finish_and_clear();
    summary.duration_ms = start_time.elapsed().as_millis() as u64;
    print!("{}", formatter.format_ingest_summary(&summary));

    Ok(())
}
