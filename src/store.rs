//! The relational store seen through the operations ingestion needs.
//!
//! [`Store`] covers introspection, the handful of DDL statements used by
//! schema migration, bulk inserts, the set-difference insert used for
//! deduplication, and nestable transactions. [`crate::sqlite::SqliteStore`]
//! is the bundled implementation.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{decimal::ExactDecimal, error::StoreError, sql_type::SqlType};

const ARTIFACT_NAME_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: Option<&str>, name: &str) -> Self {
        Self {
            schema: schema.map(str::to_string),
            name: name.to_string(),
        }
    }

    /// Another table in the same schema.
    pub fn sibling(&self, name: &str) -> Self {
        Self {
            schema: self.schema.clone(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A column as defined in (or destined for) the target table. Every column
/// managed by ingestion is nullable.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
}

impl ColumnDef {
    pub fn nullable(name: &str, sql_type: SqlType) -> Self {
        Self {
            name: name.to_string(),
            sql_type,
            nullable: true,
        }
    }
}

/// A single normalized value ready to be bound into a statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Cell {
    Null,
    Decimal(ExactDecimal),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl Cell {
    pub fn render(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Decimal(value) => Some(value.to_string()),
            Cell::Timestamp(value) => Some(value.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Cell::Text(value) => Some(value.clone()),
        }
    }
}

pub trait Store {
    /// Names of the tables in `schema` (the default schema when `None`).
    fn table_names(&mut self, schema: Option<&str>) -> Result<Vec<String>, StoreError>;

    /// Columns of `table` in declaration order.
    fn columns(&mut self, table: &TableRef) -> Result<Vec<ColumnDef>, StoreError>;

    fn create_table(&mut self, table: &TableRef, columns: &[ColumnDef]) -> Result<(), StoreError>;

    fn add_column(&mut self, table: &TableRef, column: &ColumnDef) -> Result<(), StoreError>;

    fn drop_column(&mut self, table: &TableRef, column: &str) -> Result<(), StoreError>;

    fn rename_column(&mut self, table: &TableRef, from: &str, to: &str)
    -> Result<(), StoreError>;

    /// Sets `target = CAST(source AS sql_type)` on every row.
    fn copy_with_cast(
        &mut self,
        table: &TableRef,
        source: &str,
        target: &str,
        sql_type: &SqlType,
    ) -> Result<usize, StoreError>;

    /// Longest textual rendering of any value in `column`; `None` when the
    /// column holds no non-null values.
    fn max_rendered_length(
        &mut self,
        table: &TableRef,
        column: &str,
    ) -> Result<Option<u32>, StoreError>;

    fn insert_rows(
        &mut self,
        table: &TableRef,
        columns: &[String],
        rows: &[Vec<Cell>],
    ) -> Result<usize, StoreError>;

    /// Inserts into `target` every row of `source` that `target` does not
    /// already contain, comparing all of `columns`.
    fn insert_difference(
        &mut self,
        target: &TableRef,
        source: &TableRef,
        columns: &[String],
    ) -> Result<usize, StoreError>;

    fn drop_table(&mut self, table: &TableRef) -> Result<(), StoreError>;

    fn begin(&mut self) -> Result<(), StoreError>;

    fn commit(&mut self) -> Result<(), StoreError>;

    fn rollback(&mut self) -> Result<(), StoreError>;

    /// Closes the underlying connection.
    fn release(&mut self) -> Result<(), StoreError>;

    fn table_exists(&mut self, table: &TableRef) -> Result<bool, StoreError> {
        Ok(self
            .table_names(table.schema.as_deref())?
            .iter()
            .any(|name| name == &table.name))
    }

    fn column_names(&mut self, table: &TableRef) -> Result<Vec<String>, StoreError> {
        Ok(self
            .columns(table)?
            .into_iter()
            .map(|column| column.name)
            .collect())
    }
}

/// Deterministic name for an ephemeral object derived from `seed`.
pub fn artifact_name(seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    digest
        .iter()
        .take(ARTIFACT_NAME_LEN / 2)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
