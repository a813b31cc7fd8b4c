//! Set-difference loading.
//!
//! Rows are typed against the table's final columns, deduplicated in memory,
//! staged into a scratch table with the target's exact column set, and only
//! the staged rows the target does not already hold are inserted. Staging,
//! diffing and insertion share one transaction; the scratch table is dropped
//! on every path.

use chrono::{DateTime, NaiveDateTime, Utc};
use itertools::Itertools;
use log::{debug, error};
use serde::Serialize;

use crate::{
    batch::Batch,
    decimal::ExactDecimal,
    error::{ArtifactKind, IngestError, IngestResult, merge_cleanup},
    sql_type::SqlType,
    store::{Cell, ColumnDef, Store, TableRef, artifact_name},
};

const NAIVE_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct LoadReport {
    pub batch_rows: usize,
    pub distinct_rows: usize,
    pub inserted_rows: usize,
}

/// Typed, row-major view of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl TypedRows {
    /// Drops repeated rows, keeping the first occurrence of each.
    pub fn distinct(self) -> Self {
        Self {
            columns: self.columns,
            rows: self.rows.into_iter().unique().collect(),
        }
    }
}

pub fn staging_table_name(table: &TableRef) -> String {
    artifact_name(&table.name)
}

/// Parses a decimal literal exactly, whatever its number of digits.
pub fn parse_decimal(value: &str) -> Option<ExactDecimal> {
    value.parse().ok()
}

/// Parses an ISO-8601 style timestamp; values without an offset are UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn typed_cell(column: &ColumnDef, value: Option<&str>) -> IngestResult<Cell> {
    let Some(value) = value else {
        return Ok(Cell::Null);
    };
    let invalid = |expected: &'static str| IngestError::InvalidValue {
        column: column.name.clone(),
        value: value.to_string(),
        expected,
    };
    match &column.sql_type {
        SqlType::Numeric(_) => parse_decimal(value)
            .map(Cell::Decimal)
            .ok_or_else(|| invalid("an exact decimal")),
        SqlType::Timestamp => parse_timestamp(value)
            .map(Cell::Timestamp)
            .ok_or_else(|| invalid("a timestamp")),
        _ => Ok(Cell::Text(value.to_string())),
    }
}

/// Types every batch value according to the matching column in
/// `final_columns`.
pub fn normalize_rows(
    table: &TableRef,
    final_columns: &[ColumnDef],
    batch: &Batch,
) -> IngestResult<TypedRows> {
    let targets = batch
        .columns()
        .iter()
        .map(|column| {
            final_columns
                .iter()
                .find(|candidate| candidate.name == column.name)
                .map(|target| (target, &column.values))
                .ok_or_else(|| IngestError::MissingColumn {
                    table: table.to_string(),
                    column: column.name.clone(),
                })
        })
        .collect::<IngestResult<Vec<_>>>()?;

    let rows = (0..batch.row_count())
        .map(|row| {
            targets
                .iter()
                .map(|(target, values)| typed_cell(target, values[row].as_deref()))
                .collect::<IngestResult<Vec<_>>>()
        })
        .collect::<IngestResult<Vec<_>>>()?;

    Ok(TypedRows {
        columns: targets
            .iter()
            .map(|(target, _)| target.name.clone())
            .collect(),
        rows,
    })
}

pub fn load_batch(
    store: &mut dyn Store,
    table: &TableRef,
    final_columns: &[ColumnDef],
    batch: &Batch,
) -> IngestResult<LoadReport> {
    let typed = normalize_rows(table, final_columns, batch)?.distinct();
    let mut report = LoadReport {
        batch_rows: batch.row_count(),
        distinct_rows: typed.rows.len(),
        inserted_rows: 0,
    };
    if typed.rows.is_empty() {
        debug!("Nothing to load into {table}");
        return Ok(report);
    }

    let staging = table.sibling(&staging_table_name(table));
    if store.table_exists(&staging)? {
        return Err(IngestError::NameCollision {
            kind: ArtifactKind::StagingTable,
            name: staging.name,
            table: table.to_string(),
        });
    }

    store.begin()?;
    let outcome = stage_and_merge(store, table, &staging, final_columns, &typed)
        .and_then(|inserted| store.commit().map(|()| inserted).map_err(IngestError::from));
    if outcome.is_err() {
        error!("Rollback attempt to insert new records into {table}");
        if let Err(rollback_err) = store.rollback() {
            error!("Rollback of {table} failed: {rollback_err}");
        }
    }

    let cleanup = drop_staging_if_present(store, &staging);
    report.inserted_rows =
        merge_cleanup(outcome, cleanup, ArtifactKind::StagingTable, &staging.name)?;
    Ok(report)
}

fn stage_and_merge(
    store: &mut dyn Store,
    table: &TableRef,
    staging: &TableRef,
    final_columns: &[ColumnDef],
    typed: &TypedRows,
) -> IngestResult<usize> {
    debug!("Create the staging table {staging}");
    store.create_table(staging, final_columns)?;

    debug!("Insert {} record(s) into {staging}", typed.rows.len());
    store.insert_rows(staging, &typed.columns, &typed.rows)?;

    debug!("Select and insert unique records into {table}");
    let all_columns = final_columns
        .iter()
        .map(|column| column.name.clone())
        .collect::<Vec<_>>();
    let inserted = store.insert_difference(table, staging, &all_columns)?;
    debug!("Inserted {inserted} new record(s) into {table}");
    Ok(inserted)
}

fn drop_staging_if_present(store: &mut dyn Store, staging: &TableRef) -> IngestResult<()> {
    if store.table_exists(staging)? {
        debug!("Drop the staging table {staging}");
        store.drop_table(staging)?;
    }
    Ok(())
}
