//! Per-column migration decisions.
//!
//! The planner compares what the classifier makes of an incoming column with
//! the type the target table currently declares and emits a [`Migration`].
//! Widening decisions never shrink precision, scale or length.

use std::fmt;

use log::debug;
use serde::Serialize;

use crate::{
    batch::{Batch, BatchColumn},
    classify::{DigitCounts, TypeClassifier, has_values, max_length, non_null},
    error::{IngestError, IngestResult},
    sql_type::{DecimalSpec, SqlType},
    store::{ColumnDef, Store, TableRef},
};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum Migration {
    CreateTable { columns: Vec<ColumnDef> },
    AddColumn(ColumnDef),
    WidenType {
        column: String,
        from: SqlType,
        to: SqlType,
    },
    NoChange { column: String },
}

impl Migration {
    pub fn is_change(&self) -> bool {
        !matches!(self, Migration::NoChange { .. })
    }
}

impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Migration::CreateTable { columns } => {
                let rendered = columns
                    .iter()
                    .map(|column| format!("{} {}", column.name, column.sql_type))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "create table ({rendered})")
            }
            Migration::AddColumn(column) => {
                write!(f, "add column {} {}", column.name, column.sql_type)
            }
            Migration::WidenType { column, from, to } => {
                write!(f, "widen {column} from {from} to {to}")
            }
            Migration::NoChange { column } => write!(f, "keep {column}"),
        }
    }
}

pub struct SchemaPlanner<'a> {
    classifier: &'a TypeClassifier,
}

impl<'a> SchemaPlanner<'a> {
    pub fn new(classifier: &'a TypeClassifier) -> Self {
        Self { classifier }
    }

    /// Plans the migrations needed for `batch` to fit `table`. A missing
    /// table yields a single [`Migration::CreateTable`].
    pub fn plan(
        &self,
        store: &mut dyn Store,
        table: &TableRef,
        batch: &Batch,
    ) -> IngestResult<Vec<Migration>> {
        if !store.table_exists(table)? {
            let columns = batch
                .columns()
                .iter()
                .map(|column| self.fresh_column(column))
                .collect();
            return Ok(vec![Migration::CreateTable { columns }]);
        }

        let existing = store.columns(table)?;
        let mut migrations = Vec::with_capacity(batch.columns().len());
        for column in batch.columns() {
            let migration = match existing.iter().find(|vendor| vendor.name == column.name) {
                None => Migration::AddColumn(self.fresh_column(column)),
                Some(vendor) => self.decide(table, column, vendor, || {
                    let length = store
                        .max_rendered_length(table, &vendor.name)?
                        .unwrap_or(0);
                    debug!(
                        "Longest stored value of {table}.{} ({}) renders as {length} character(s)",
                        vendor.name, vendor.sql_type
                    );
                    Ok(length)
                })?,
            };
            debug!("Planned for {table}: {migration}");
            migrations.push(migration);
        }
        Ok(migrations)
    }

    fn fresh_column(&self, column: &BatchColumn) -> ColumnDef {
        ColumnDef::nullable(
            &column.name,
            self.classifier.classify(&column.values).sql_type(),
        )
    }

    /// Decides how an existing `vendor` column must change to hold `column`.
    /// `rendered_length` is only consulted when textual data meets a
    /// non-character column.
    pub fn decide<F>(
        &self,
        table: &TableRef,
        column: &BatchColumn,
        vendor: &ColumnDef,
        rendered_length: F,
    ) -> IngestResult<Migration>
    where
        F: FnOnce() -> IngestResult<u32>,
    {
        let values = &column.values;
        let numeric = self.classifier.is_numeric(values);
        let timestamp = !numeric && self.classifier.is_timestamp(values);
        let keep = || Migration::NoChange {
            column: column.name.clone(),
        };
        let widen = |to: SqlType| Migration::WidenType {
            column: column.name.clone(),
            from: vendor.sql_type.clone(),
            to,
        };

        match &vendor.sql_type {
            SqlType::Numeric(spec) if numeric => {
                let counts = DigitCounts::from_values(non_null(values));
                Ok(widen_numeric(spec, counts).map_or_else(keep, widen))
            }
            SqlType::Timestamp if timestamp => Ok(keep()),
            SqlType::Timestamp | SqlType::Numeric(_) if numeric || timestamp => {
                Err(IngestError::UnhandledType {
                    table: table.to_string(),
                    column: column.name.clone(),
                    vendor: vendor.sql_type.clone(),
                    incoming: self.classifier.classify(values),
                })
            }
            vendor_type if has_values(values) => {
                let incoming_length = max_length(values);
                match vendor_type {
                    SqlType::VarChar(length) if incoming_length > *length => {
                        Ok(widen(SqlType::VarChar(incoming_length)))
                    }
                    SqlType::VarChar(_) | SqlType::Text => Ok(keep()),
                    _ => {
                        let existing = rendered_length()?;
                        Ok(widen(SqlType::VarChar(incoming_length.max(existing).max(1))))
                    }
                }
            }
            _ => Ok(keep()),
        }
    }
}

/// Returns the widened spec when incoming digits exceed `vendor`.
fn widen_numeric(vendor: &DecimalSpec, counts: DigitCounts) -> Option<SqlType> {
    let (incoming_whole, incoming_fractional) = counts.migration_parts();
    let vendor_whole = vendor.whole_digits();
    if incoming_whole > vendor_whole || incoming_fractional > vendor.scale {
        let whole = incoming_whole.max(vendor_whole);
        let fractional = incoming_fractional.max(vendor.scale);
        Some(SqlType::numeric(whole.saturating_add(fractional), fractional))
    } else {
        None
    }
}
