use anyhow::Context;
use bqmeta::client::bigquery::BigQueryMetadataClient;
use bqmeta::connection::{Connection, Driver};
use bqmeta_config::environment::Environment;
use bqmeta_config::shared::AppConfig;
use bqmeta_config::{load_config, load_config_from};
use serde::Serialize;
use std::io::{self, Write};
use std::time::Instant;
use tracing::info;

use crate::args::{AppArgs, Command};

pub async fn run(args: AppArgs) -> anyhow::Result<()> {
    let mut config: AppConfig = match &args.config_dir {
        Some(directory) => load_config_from(directory, Environment::load()?)?,
        None => load_config()?,
    };
    apply_overrides(&mut config, &args);

    let driver = Driver::from_config(&config)
        .await
        .context("failed to create metadata driver")?;
    let connection = driver.connect();

    for attempt in 1..=args.repeat.max(1) {
        let started = Instant::now();
        let count = list(&connection, &args.command, attempt == args.repeat.max(1)).await?;
        info!(
            attempt,
            count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "listing finished"
        );
    }

    connection.close();

    Ok(())
}

fn apply_overrides(config: &mut AppConfig, args: &AppArgs) {
    if args.lazy {
        config.metadata_cache.lazy_load = true;
    }
    if args.no_cache {
        config.metadata_cache.cache_enabled = false;
    }
}

/// Runs one listing and returns how many items it produced, printing them when `print` is set.
async fn list(
    connection: &Connection<BigQueryMetadataClient>,
    command: &Command,
    print: bool,
) -> anyhow::Result<usize> {
    let metadata = connection.metadata()?;

    match command {
        Command::Catalogs => emit(&metadata.list_catalogs().await?, print),
        Command::Schemas(filter) => emit(
            &metadata
                .list_schemas(filter.catalog.as_deref(), filter.schema.as_deref())
                .await?,
            print,
        ),
        Command::Tables {
            filter,
            table,
            table_types,
        } => {
            let table_types: Vec<&str> = table_types.iter().map(String::as_str).collect();
            let table_types = (!table_types.is_empty()).then_some(table_types.as_slice());
            emit(
                &metadata
                    .list_tables(
                        filter.catalog.as_deref(),
                        filter.schema.as_deref(),
                        table.as_deref(),
                        table_types,
                    )
                    .await?,
                print,
            )
        }
        Command::Columns {
            filter,
            table,
            column,
        } => emit(
            &metadata
                .list_columns(
                    filter.catalog.as_deref(),
                    filter.schema.as_deref(),
                    table.as_deref(),
                    column.as_deref(),
                )
                .await?,
            print,
        ),
    }
}

fn emit<T: Serialize>(items: &[T], print: bool) -> anyhow::Result<usize> {
    if print {
        let mut stdout = io::stdout().lock();
        for item in items {
            serde_json::to_writer(&mut stdout, item)?;
            writeln!(stdout)?;
        }
    }

    Ok(items.len())
}
