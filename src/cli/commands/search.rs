use anyhow::{Context, Result};
use clap::Args;
use std::time::Instant;

use crate::cli::output::get_formatter;
use crate::models::{Config, Credentials, OutputFormat};
use crate::services::IngestPipeline;

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, help = "Search query text")]
    pub query: String,

    #[arg(
        long,
        short = 'n',
        default_value_t = 4,
        help = "Maximum number of results to return"
    )]
    pub limit: u64,
}

pub async fn handle_search(args: SearchArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        anyhow::bail!("search query cannot be empty");
    }
    if args.limit == 0 {
        anyhow::bail!("limit must be at least 1");
    }

    let config = Config::load()?;
    let credentials = Credentials::from_env()?;
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    let pipeline = IngestPipeline::connect(&config, &credentials)
        .await
        .context("failed to connect to the embedding service or vector index")?;
    let store = pipeline.init_vector_store().await?;

    if verbose {
        eprintln!("Query: \"{query}\"");
        eprintln!("  Namespace: {}", store.namespace());
        eprintln!("  Limit: {}", args.limit);
    }

    let results = store
        .similarity_search(query, args.limit)
        .await
        .context("search failed")?;

    if verbose {
        eprintln!("  Took: {}ms", start_time.elapsed().as_millis());
        eprintln!();
    }

    print!("{}", formatter.format_search_results(query, &results));

    Ok(())
}
