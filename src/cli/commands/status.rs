use anyhow::Result;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::error::{ConfigError, IngestError};
use crate::models::{Config, OutputFormat, VectorDriver};
use crate::services::{check_dimension, create_index};

pub async fn handle_status(format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let store = &config.vector_store;
    let expected = u64::from(config.embedding.dimension);

    let mut status = StatusInfo {
        driver: store.driver.to_string(),
        url: store.url.clone(),
        index: store.index.clone(),
        namespace: store.namespace.clone(),
        connected: false,
        index_dimension: None,
        expected_dimension: expected,
        record_count: None,
        dimension_ok: false,
        error: None,
    };

    match create_index(store, expected).await {
        Ok(index) => match check_dimension(index.as_ref(), expected).await {
            Ok(stats) => {
                status.connected = true;
                status.index_dimension = Some(stats.dimension);
                status.record_count = Some(stats.total_record_count);
                status.dimension_ok = true;
            }
            Err(IngestError::Config(ConfigError::DimensionMismatch { actual, .. })) => {
                status.connected = true;
                status.index_dimension = Some(actual);
                status.error = Some(format!(
                    "index dimension {actual} does not match embedding dimension {expected}"
                ));
            }
            Err(e) => status.error = Some(e.to_string()),
        },
        Err(e) => status.error = Some(e.to_string()),
    }

    print!("{}", formatter.format_status(&status));

    if !status.connected {
        eprintln!();
        match store.driver {
            VectorDriver::Qdrant => {
                eprintln!("Warning: Qdrant not reachable at {}.", store.url);
                eprintln!("         Start it with: docker run -p 6334:6334 qdrant/qdrant");
            }
            VectorDriver::PostgreSQL => {
                eprintln!("Warning: PostgreSQL not accessible. Check connection settings.");
            }
            VectorDriver::Memory => {}
        }
    } else if verbose && !status.dimension_ok {
        eprintln!("Hint: re-create the index or set embedding.dimension to match it.");
    }

    Ok(())
}
