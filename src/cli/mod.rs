//! Command-line interface for ETF document ingestion.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Ingest ETF PDF and Markdown documents into a vector index and search them.
#[derive(Debug, Parser)]
#[command(name = "etfdocs")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'f',
        global = true,
        default_value_t = OutputFormat::Text,
        help = "Output format: text or json"
    )]
    pub format: OutputFormat,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Process, embed and store documents
    Ingest(commands::IngestArgs),

    /// Process one document and print its chunks
    Chunk(commands::ChunkArgs),

    /// Count the tokens of a document
    Tokens(commands::TokensArgs),

    /// Check the vector index and its dimension
    Status,

    /// Similarity search over ingested documents
    Search(commands::SearchArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
