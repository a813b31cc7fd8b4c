//! Ingest orchestration: plan, migrate, then load.
//!
//! [`Ingestor`] owns the configuration for a series of ingest calls. Each call
//! plans per-column migrations, applies them in column order, re-reads the
//! table definition from the store and hands the batch to the load engine.
//! The whole call runs in one transaction, with each widen and the load
//! nested inside it, so a failure anywhere leaves the table as it was.
//! The connection is released on every exit path unless the configuration
//! asks to retain it.

use log::{debug, error, info};
use serde::Serialize;

use crate::{
    batch::{Batch, normalize_name},
    classify::TypeClassifier,
    config::{ConnectionPolicy, IngestConfig},
    error::{IngestError, IngestResult},
    load::{LoadReport, load_batch},
    planner::{Migration, SchemaPlanner},
    store::{Store, TableRef},
    widen::widen_column,
};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IngestReport {
    pub table: String,
    pub migrations: Vec<Migration>,
    pub load: LoadReport,
}

#[derive(Debug, Clone)]
pub struct Ingestor {
    config: IngestConfig,
    classifier: TypeClassifier,
}

impl Ingestor {
    pub fn new(config: IngestConfig) -> IngestResult<Self> {
        let classifier = TypeClassifier::new(&config)?;
        Ok(Self { config, classifier })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn classifier(&self) -> &TypeClassifier {
        &self.classifier
    }

    /// Target table for `table_name`, lowercased when written all in upper case.
    pub fn table_ref(table_name: &str, schema: Option<&str>) -> TableRef {
        TableRef::new(schema, &normalize_name(table_name))
    }

    /// Computes the migrations `batch` would trigger without applying them.
    pub fn plan(
        &self,
        batch: &Batch,
        table_name: &str,
        schema: Option<&str>,
        store: &mut dyn Store,
    ) -> IngestResult<Vec<Migration>> {
        let table = Self::table_ref(table_name, schema);
        SchemaPlanner::new(&self.classifier).plan(store, &table, batch)
    }

    pub fn ingest(
        &self,
        batch: &Batch,
        table_name: &str,
        schema: Option<&str>,
        store: &mut dyn Store,
    ) -> IngestResult<IngestReport> {
        let table = Self::table_ref(table_name, schema);
        info!("Begin sql import into the table named {table}");

        let outcome = self.ingest_atomically(batch, &table, store);
        let released = match self.config.connection {
            ConnectionPolicy::Release => store.release().map_err(IngestError::from),
            ConnectionPolicy::Retain => Ok(()),
        };

        info!("End sql import procedure into the table named {table}");
        match (outcome, released) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(_), Err(release_err)) => Err(release_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release_err)) => {
                error!("Releasing the connection after a failed import also failed: {release_err}");
                Err(err)
            }
        }
    }

    fn ingest_atomically(
        &self,
        batch: &Batch,
        table: &TableRef,
        store: &mut dyn Store,
    ) -> IngestResult<IngestReport> {
        store.begin()?;
        let outcome = self
            .migrate_and_load(batch, table, store)
            .and_then(|report| store.commit().map(|()| report).map_err(IngestError::from));
        if outcome.is_err() {
            error!("Rollback of the sql import into the table named {table}");
            if let Err(rollback_err) = store.rollback() {
                error!("Rollback of {table} failed: {rollback_err}");
            }
        }
        outcome
    }

    fn migrate_and_load(
        &self,
        batch: &Batch,
        table: &TableRef,
        store: &mut dyn Store,
    ) -> IngestResult<IngestReport> {
        let migrations = SchemaPlanner::new(&self.classifier).plan(store, table, batch)?;
        for migration in &migrations {
            apply_migration(store, table, migration)?;
        }

        let final_columns = store.columns(table)?;
        let load = load_batch(store, table, &final_columns, batch)?;
        info!(
            "Loaded {} new record(s) of {} into {table}",
            load.inserted_rows, load.batch_rows
        );
        Ok(IngestReport {
            table: table.to_string(),
            migrations,
            load,
        })
    }
}

fn apply_migration(
    store: &mut dyn Store,
    table: &TableRef,
    migration: &Migration,
) -> IngestResult<()> {
    match migration {
        Migration::CreateTable { columns } => {
            debug!("Create new table for the table named {table}");
            store.create_table(table, columns)?;
        }
        Migration::AddColumn(column) => {
            debug!("Create the column named {} in the table named {table}", column.name);
            store.add_column(table, column)?;
        }
        Migration::WidenType { column, to, .. } => {
            let current = store
                .columns(table)?
                .into_iter()
                .find(|candidate| &candidate.name == column)
                .ok_or_else(|| IngestError::MissingColumn {
                    table: table.to_string(),
                    column: column.clone(),
                })?;
            widen_column(store, table, &current, to)?;
        }
        Migration::NoChange { .. } => {}
    }
    Ok(())
}
