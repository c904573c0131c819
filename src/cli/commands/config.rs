use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::{Formatter, get_formatter};
use crate::models::{Config, OutputFormat};

const MASKED: &str = "********";

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Write a config file with default values")]
    Init {
        #[arg(long, help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show the effective configuration")]
    Show,
    #[command(about = "Show the configuration file path")]
    Path,
}

pub async fn handle_config(cmd: ConfigCommand, format: OutputFormat, _verbose: bool) -> Result<()> {
    let formatter = get_formatter(format);

    match cmd {
        ConfigCommand::Init { force } => handle_init(force, formatter.as_ref()),
        ConfigCommand::Show => handle_show(format),
        ConfigCommand::Path => handle_path(formatter.as_ref()),
    }
}

fn handle_init(force: bool, formatter: &dyn Formatter) -> Result<()> {
    let config_path = Config::config_path()
        .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config already exists at: {}\nUse --force to overwrite.",
            config_path.display()
        );
    }

    let path = Config::default()
        .save()
        .context("failed to create config")?;
    print!(
        "{}",
        formatter.format_message(&format!("Created config at: {}", path.display()))
    );
    Ok(())
}

fn handle_show(format: OutputFormat) -> Result<()> {
    let config = masked(Config::load()?);

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    if let Some(path) = Config::config_path().filter(|p| p.exists()) {
        println!("# Config: {}", path.display());
    } else {
        println!("# Config: defaults (no config file)");
    }
    println!();
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn handle_path(formatter: &dyn Formatter) -> Result<()> {
    let path = Config::config_path()
        .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;
    let state = if path.exists() { "" } else { " (not found)" };
    print!(
        "{}",
        formatter.format_message(&format!("{}{state}", path.display()))
    );
    Ok(())
}

fn masked(mut config: Config) -> Config {
    if config.vector_store.api_key.is_some() {
        config.vector_store.api_key = Some(MASKED.to_string());
    }
    config
}
