//! [`Store`] backed by SQLite through `rusqlite`.
//!
//! Transactions are savepoints, so a widen or load unit opened here nests
//! inside any transaction the caller already holds. SQLite treats DDL as
//! transactional, which makes a rolled-back shadow swap or staging load
//! disappear completely.

use std::path::Path;

use log::debug;
use rusqlite::{
    Connection, ToSql, params_from_iter,
    types::{ToSqlOutput, Value, ValueRef},
};

use crate::{
    decimal::ExactDecimal,
    error::StoreError,
    sql_type::SqlType,
    store::{Cell, ColumnDef, Store, TableRef},
};

const SAVEPOINT_PREFIX: &str = "table_ingest_sp";
const MAX_REAL_DIGITS: usize = 15;
const MIN_REAL_EXPONENT: i64 = -4;

pub struct SqliteStore {
    conn: Option<Connection>,
    savepoints: Vec<String>,
    next_savepoint: usize,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        debug!("Opening SQLite database {path:?}");
        Ok(Self::from_connection(Connection::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Some(conn),
            savepoints: Vec::new(),
            next_savepoint: 0,
        }
    }

    /// The live connection, or `None` once released.
    pub fn connection(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }

    pub fn is_released(&self) -> bool {
        self.conn.is_none()
    }

    fn conn(&self) -> Result<&Connection, StoreError> {
        self.conn.as_ref().ok_or(StoreError::Released)
    }

    fn execute(&self, sql: &str) -> Result<usize, StoreError> {
        debug!("sqlite: {sql}");
        Ok(self.conn()?.execute(sql, [])?)
    }
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualified(table: &TableRef) -> String {
    match &table.schema {
        Some(schema) => format!(
            "{}.{}",
            quote_identifier(schema),
            quote_identifier(&table.name)
        ),
        None => quote_identifier(&table.name),
    }
}

fn schema_prefix(schema: Option<&str>) -> String {
    schema
        .map(|schema| format!("{}.", quote_identifier(schema)))
        .unwrap_or_default()
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|column| quote_identifier(column))
        .collect::<Vec<_>>()
        .join(", ")
}

fn column_definition(column: &ColumnDef) -> String {
    let null_clause = if column.nullable { "NULL" } else { "NOT NULL" };
    format!(
        "{} {} {null_clause}",
        quote_identifier(&column.name),
        column.sql_type.ddl()
    )
}

impl Store for SqliteStore {
    fn table_names(&mut self, schema: Option<&str>) -> Result<Vec<String>, StoreError> {
        let sql = format!(
            "SELECT name FROM {}sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            schema_prefix(schema)
        );
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn columns(&mut self, table: &TableRef) -> Result<Vec<ColumnDef>, StoreError> {
        let sql = format!(
            "PRAGMA {}table_info({})",
            schema_prefix(table.schema.as_deref()),
            quote_identifier(&table.name)
        );
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let columns = stmt
            .query_map([], |row| {
                let name: String = row.get("name")?;
                let declared: String = row.get("type")?;
                let not_null: bool = row.get("notnull")?;
                Ok(ColumnDef {
                    name,
                    sql_type: SqlType::from_declared(&declared),
                    nullable: !not_null,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        if columns.is_empty() {
            return Err(StoreError::MissingTable(table.to_string()));
        }
        Ok(columns)
    }

    fn create_table(&mut self, table: &TableRef, columns: &[ColumnDef]) -> Result<(), StoreError> {
        let definitions = columns
            .iter()
            .map(column_definition)
            .collect::<Vec<_>>()
            .join(", ");
        self.execute(&format!("CREATE TABLE {} ({definitions})", qualified(table)))?;
        Ok(())
    }

    fn add_column(&mut self, table: &TableRef, column: &ColumnDef) -> Result<(), StoreError> {
        self.execute(&format!(
            "ALTER TABLE {} ADD COLUMN {}",
            qualified(table),
            column_definition(column)
        ))?;
        Ok(())
    }

    fn drop_column(&mut self, table: &TableRef, column: &str) -> Result<(), StoreError> {
        self.execute(&format!(
            "ALTER TABLE {} DROP COLUMN {}",
            qualified(table),
            quote_identifier(column)
        ))?;
        Ok(())
    }

    fn rename_column(
        &mut self,
        table: &TableRef,
        from: &str,
        to: &str,
    ) -> Result<(), StoreError> {
        self.execute(&format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            qualified(table),
            quote_identifier(from),
            quote_identifier(to)
        ))?;
        Ok(())
    }

    fn copy_with_cast(
        &mut self,
        table: &TableRef,
        source: &str,
        target: &str,
        sql_type: &SqlType,
    ) -> Result<usize, StoreError> {
        // A CAST to NUMERIC goes through a double; plain assignment keeps
        // integers, reals and blob-held decimals as they are.
        let value = match sql_type {
            SqlType::Numeric(_) => quote_identifier(source),
            _ => format!("CAST({} AS {})", quote_identifier(source), sql_type.ddl()),
        };
        self.execute(&format!(
            "UPDATE {} SET {} = {value}",
            qualified(table),
            quote_identifier(target),
        ))
    }

    fn max_rendered_length(
        &mut self,
        table: &TableRef,
        column: &str,
    ) -> Result<Option<u32>, StoreError> {
        let sql = format!(
            "SELECT MAX(LENGTH(CAST({} AS TEXT))) FROM {}",
            quote_identifier(column),
            qualified(table)
        );
        let length: Option<i64> = self.conn()?.query_row(&sql, [], |row| row.get(0))?;
        Ok(length.map(|length| u32::try_from(length.max(0)).unwrap_or(u32::MAX)))
    }

    fn insert_rows(
        &mut self,
        table: &TableRef,
        columns: &[String],
        rows: &[Vec<Cell>],
    ) -> Result<usize, StoreError> {
        let placeholders = (1..=columns.len())
            .map(|idx| format!("?{idx}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            qualified(table),
            column_list(columns)
        );
        debug!("sqlite: {sql} x {} row(s)", rows.len());
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut inserted = 0usize;
        for row in rows {
            inserted += stmt.execute(params_from_iter(row.iter()))?;
        }
        Ok(inserted)
    }

    fn insert_difference(
        &mut self,
        target: &TableRef,
        source: &TableRef,
        columns: &[String],
    ) -> Result<usize, StoreError> {
        let columns = column_list(columns);
        self.execute(&format!(
            "INSERT INTO {target} ({columns}) SELECT {columns} FROM {source} EXCEPT SELECT {columns} FROM {target}",
            target = qualified(target),
            source = qualified(source),
        ))
    }

    fn drop_table(&mut self, table: &TableRef) -> Result<(), StoreError> {
        self.execute(&format!("DROP TABLE {}", qualified(table)))?;
        Ok(())
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        let name = format!("{SAVEPOINT_PREFIX}_{}", self.next_savepoint);
        self.conn()?.execute_batch(&format!("SAVEPOINT {name}"))?;
        self.next_savepoint += 1;
        self.savepoints.push(name);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let name = self
            .savepoints
            .last()
            .ok_or(StoreError::NoTransaction("commit"))?;
        self.conn()?.execute_batch(&format!("RELEASE {name}"))?;
        self.savepoints.pop();
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        let name = self
            .savepoints
            .pop()
            .ok_or(StoreError::NoTransaction("roll back"))?;
        self.conn()?
            .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))?;
        Ok(())
    }

    fn release(&mut self) -> Result<(), StoreError> {
        self.savepoints.clear();
        if let Some(conn) = self.conn.take() {
            debug!("Closing SQLite connection");
            conn.close().map_err(|(_, err)| StoreError::Sqlite(err))?;
        }
        Ok(())
    }
}

/// Storage chosen for an exact decimal under NUMERIC affinity.
///
/// Integers that fit 64 bits are stored as INTEGER. Fractions stored as REAL
/// must read back as the same digits, which holds for at most 15 significant
/// digits rendered without an exponent. Everything else is kept as its
/// canonical text in a BLOB, which NUMERIC affinity leaves untouched.
pub fn decimal_value(value: &ExactDecimal) -> Value {
    if let Some(integer) = value.to_i64() {
        return Value::Integer(integer);
    }
    if !value.is_integer()
        && value.significant_digits() <= MAX_REAL_DIGITS
        && value.adjusted_exponent() >= MIN_REAL_EXPONENT
        && let Some(real) = value.to_f64()
    {
        return Value::Real(real);
    }
    Value::Blob(value.to_string().into_bytes())
}

impl ToSql for Cell {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Cell::Null => ToSqlOutput::Owned(Value::Null),
            Cell::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
            Cell::Decimal(value) => ToSqlOutput::Owned(decimal_value(value)),
            Cell::Timestamp(_) => {
                ToSqlOutput::Owned(Value::Text(self.render().unwrap_or_default()))
            }
        })
    }
}
