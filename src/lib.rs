pub mod batch;
pub mod classify;
pub mod cli;
pub mod config;
pub mod decimal;
pub mod error;
pub mod ingest;
pub mod io_utils;
pub mod load;
pub mod planner;
pub mod sql_type;
pub mod sqlite;
pub mod store;
pub mod table;
pub mod widen;

use std::{env, path::Path, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    batch::Batch,
    cli::{Cli, Commands, IngestArgs, OutputFormat, ProbeArgs},
    config::IngestConfig,
    ingest::Ingestor,
    sqlite::SqliteStore,
    table::TextTable,
};

pub use crate::{
    batch::normalize_name,
    error::{IngestError, IngestResult, StoreError},
    store::{Cell, ColumnDef, Store, TableRef},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("table_ingest", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Ingest(args) => handle_ingest(&args),
        Commands::Probe(args) => handle_probe(&args),
        Commands::Plan(args) => handle_plan(&args),
    }
}

fn load_config(path: Option<&Path>) -> Result<IngestConfig> {
    match path {
        Some(path) => {
            IngestConfig::load(path).with_context(|| format!("Loading config from {path:?}"))
        }
        None => Ok(IngestConfig::default()),
    }
}

fn read_input(
    input: &Path,
    delimiter: Option<u8>,
    input_encoding: Option<&str>,
) -> Result<Batch> {
    let delimiter = io_utils::resolve_input_delimiter(input, delimiter);
    let encoding = io_utils::resolve_encoding(input_encoding)?;
    let batch = io_utils::read_batch(input, delimiter, encoding)?;
    debug!(
        "Read {} row(s) across {} column(s) from {:?}",
        batch.row_count(),
        batch.columns().len(),
        input
    );
    Ok(batch)
}

fn handle_ingest(args: &IngestArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let batch = read_input(&args.input, args.delimiter, args.input_encoding.as_deref())?;
    let ingestor = Ingestor::new(config)?;
    let mut store = SqliteStore::open(&args.database)
        .with_context(|| format!("Opening database {:?}", args.database))?;
    let report = ingestor
        .ingest(&batch, &args.table, Some(args.schema.as_str()), &mut store)
        .with_context(|| format!("Ingesting {:?} into table '{}'", args.input, args.table))?;
    let changes = report
        .migrations
        .iter()
        .filter(|migration| migration.is_change())
        .count();
    info!(
        "✓ {}: {} schema change(s), {} of {} row(s) inserted",
        report.table, changes, report.load.inserted_rows, report.load.batch_rows
    );
    Ok(())
}

fn handle_plan(args: &IngestArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let batch = read_input(&args.input, args.delimiter, args.input_encoding.as_deref())?;
    let ingestor = Ingestor::new(config)?;
    let mut store = SqliteStore::open(&args.database)
        .with_context(|| format!("Opening database {:?}", args.database))?;
    let migrations = ingestor
        .plan(&batch, &args.table, Some(args.schema.as_str()), &mut store)
        .with_context(|| format!("Planning {:?} into table '{}'", args.input, args.table))?;
    let mut table = TextTable::new(["step", "migration"]);
    for (idx, migration) in migrations.iter().enumerate() {
        table.push_row([(idx + 1).to_string(), migration.to_string()]);
    }
    print!("{}", table.render());
    Ok(())
}

fn handle_probe(args: &ProbeArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    info!("Probing '{}'", args.input.display());
    let batch = read_input(&args.input, args.delimiter, args.input_encoding.as_deref())?;
    let classifier = classify::TypeClassifier::new(&config)?;
    let inferred = batch
        .columns()
        .iter()
        .map(|column| (column.name.as_str(), classifier.classify(&column.values)))
        .collect::<Vec<_>>();
    match args.format {
        OutputFormat::Table => {
            let mut table = TextTable::new(["column", "type"]);
            for (name, ty) in &inferred {
                table.push_row([name.to_string(), ty.to_string()]);
            }
            print!("{}", table.render());
        }
        OutputFormat::Json => {
            let entries = inferred
                .iter()
                .map(|(name, ty)| {
                    serde_json::json!({
                        "column": name,
                        "inferred": ty,
                        "sql_type": ty.sql_type().ddl(),
                    })
                })
                .collect::<Vec<_>>();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }
    Ok(())
}
