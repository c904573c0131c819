use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use etfdocs::cli::commands::{
    handle_chunk, handle_config, handle_ingest, handle_search, handle_status, handle_tokens,
};
use etfdocs::cli::output::render_error;
use etfdocs::cli::{Cli, Commands};
use etfdocs::models::{Config, OutputFormat};
use etfdocs::services::TokenCounter;

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "etfdocs=debug" } else { "etfdocs=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // The vocabulary must be installed before any processor is built.
    let config = Config::load().unwrap_or_default();
    let counter =
        TokenCounter::from_config(&config.tokenizer).context("failed to load tokenizer")?;
    TokenCounter::install(counter);

    let format = cli.format;
    let verbose = cli.verbose;

    tokio::select! {
        result = run_command(cli.command, format, verbose) => {
            if let Err(e) = result {
                eprint!("{}", render_error(format, &e));
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            eprintln!("\nReceived shutdown signal, exiting.");
        }
    }

    Ok(())
}

async fn run_command(command: Commands, format: OutputFormat, verbose: bool) -> Result<()> {
    match command {
        Commands::Ingest(args) => handle_ingest(args, format, verbose).await,
        Commands::Chunk(args) => handle_chunk(args, format, verbose).await,
        Commands::Tokens(args) => handle_tokens(args, format, verbose).await,
        Commands::Status => handle_status(format, verbose).await,
        Commands::Search(args) => handle_search(args, format, verbose).await,
        Commands::Config(cmd) => handle_config(cmd, format, verbose).await,
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
