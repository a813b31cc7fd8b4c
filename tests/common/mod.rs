#![allow(dead_code)]

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use table_ingest::{
    Cell, ColumnDef, Store, StoreError, TableRef,
    batch::Batch,
    config::IngestConfig,
    ingest::Ingestor,
    sql_type::SqlType,
    sqlite::{SqliteStore, quote_identifier},
};
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

pub fn main_table(name: &str) -> TableRef {
    TableRef::new(Some("main"), name)
}

/// Builds a batch from `(name, values)` pairs; `None` is null.
pub fn batch(columns: &[(&str, &[Option<&str>])]) -> Batch {
    Batch::new(columns.iter().map(|(name, values)| {
        (
            name.to_string(),
            values.iter().map(|v| v.map(str::to_string)).collect(),
        )
    }))
    .expect("valid batch")
}

pub fn retaining_ingestor() -> Ingestor {
    Ingestor::new(IngestConfig::default().retain_connection()).expect("ingestor")
}

pub fn memory_store() -> SqliteStore {
    SqliteStore::open_in_memory().expect("in-memory store")
}

/// Creates `table` with `columns` and the given text rows.
pub fn seed_table(
    store: &mut SqliteStore,
    table: &str,
    columns: &[(&str, SqlType)],
    rows: &[&[Option<&str>]],
) {
    let definitions = columns
        .iter()
        .map(|(name, ty)| ColumnDef::nullable(name, ty.clone()))
        .collect::<Vec<_>>();
    store
        .create_table(&main_table(table), &definitions)
        .expect("create seed table");
    let names = columns
        .iter()
        .map(|(name, _)| name.to_string())
        .collect::<Vec<_>>();
    let cells = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|v| v.map_or(Cell::Null, |v| Cell::Text(v.to_string())))
                .collect()
        })
        .collect::<Vec<_>>();
    store
        .insert_rows(&main_table(table), &names, &cells)
        .expect("seed rows");
}

pub fn column_types(store: &mut SqliteStore, table: &str) -> Vec<(String, SqlType)> {
    store
        .columns(&main_table(table))
        .expect("columns")
        .into_iter()
        .map(|column| (column.name, column.sql_type))
        .collect()
}

/// Every row of `table` rendered as text, sorted for stable comparison.
pub fn rows(store: &mut SqliteStore, table: &str) -> Vec<Vec<Option<String>>> {
    let names = store
        .column_names(&main_table(table))
        .expect("column names");
    let select = names
        .iter()
        .map(|name| format!("CAST({} AS TEXT)", quote_identifier(name)))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {select} FROM \"main\".{}",
        quote_identifier(table)
    );
    let conn = store.connection().expect("open connection");
    let mut stmt = conn.prepare(&sql).expect("prepare select");
    let mut rows = stmt
        .query_map([], |row| {
            (0..names.len())
                .map(|idx| row.get::<_, Option<String>>(idx))
                .collect::<Result<Vec<_>, _>>()
        })
        .expect("query rows")
        .collect::<Result<Vec<_>, _>>()
        .expect("read rows");
    rows.sort();
    rows
}

pub fn text_rows(expected: &[&[Option<&str>]]) -> Vec<Vec<Option<String>>> {
    let mut rows = expected
        .iter()
        .map(|row| row.iter().map(|v| v.map(str::to_string)).collect())
        .collect::<Vec<Vec<Option<String>>>>();
    rows.sort();
    rows
}

pub fn table_names(store: &mut SqliteStore) -> Vec<String> {
    store.table_names(Some("main")).expect("table names")
}

/// Wraps a real store and fails chosen calls, optionally pretending the
/// backend cannot roll back DDL.
pub struct FailingStore {
    pub inner: SqliteStore,
    failures: HashMap<&'static str, Vec<usize>>,
    calls: HashMap<&'static str, usize>,
    transactional: bool,
}

impl FailingStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            failures: HashMap::new(),
            calls: HashMap::new(),
            transactional: true,
        }
    }

    /// Fails the `nth` (1-based) call of `operation`.
    pub fn fail_on(mut self, operation: &'static str, nth: usize) -> Self {
        self.failures.entry(operation).or_default().push(nth);
        self
    }

    /// Rollbacks keep every change made since `begin`.
    pub fn without_transactional_ddl(mut self) -> Self {
        self.transactional = false;
        self
    }

    fn check(&mut self, operation: &'static str) -> Result<(), StoreError> {
        let count = self.calls.entry(operation).or_insert(0);
        *count += 1;
        let nth = *count;
        if self
            .failures
            .get(operation)
            .is_some_and(|calls| calls.contains(&nth))
        {
            return Err(StoreError::Backend(format!(
                "injected failure in {operation}"
            )));
        }
        Ok(())
    }
}

impl Store for FailingStore {
    fn table_names(&mut self, schema: Option<&str>) -> Result<Vec<String>, StoreError> {
        self.check("table_names")?;
        self.inner.table_names(schema)
    }

    fn columns(&mut self, table: &TableRef) -> Result<Vec<ColumnDef>, StoreError> {
        self.check("columns")?;
        self.inner.columns(table)
    }

    fn create_table(&mut self, table: &TableRef, columns: &[ColumnDef]) -> Result<(), StoreError> {
        self.check("create_table")?;
        self.inner.create_table(table, columns)
    }

    fn add_column(&mut self, table: &TableRef, column: &ColumnDef) -> Result<(), StoreError> {
        self.check("add_column")?;
        self.inner.add_column(table, column)
    }

    fn drop_column(&mut self, table: &TableRef, column: &str) -> Result<(), StoreError> {
        self.check("drop_column")?;
        self.inner.drop_column(table, column)
    }

    fn rename_column(
        &mut self,
        table: &TableRef,
        from: &str,
        to: &str,
    ) -> Result<(), StoreError> {
        self.check("rename_column")?;
        self.inner.rename_column(table, from, to)
    }

    fn copy_with_cast(
        &mut self,
        table: &TableRef,
        source: &str,
        target: &str,
        sql_type: &SqlType,
    ) -> Result<usize, StoreError> {
        self.check("copy_with_cast")?;
        self.inner.copy_with_cast(table, source, target, sql_type)
    }

    fn max_rendered_length(
        &mut self,
        table: &TableRef,
        column: &str,
    ) -> Result<Option<u32>, StoreError> {
        self.check("max_rendered_length")?;
        self.inner.max_rendered_length(table, column)
    }

    fn insert_rows(
        &mut self,
        table: &TableRef,
        columns: &[String],
        rows: &[Vec<Cell>],
    ) -> Result<usize, StoreError> {
        self.check("insert_rows")?;
        self.inner.insert_rows(table, columns, rows)
    }

    fn insert_difference(
        &mut self,
        target: &TableRef,
        source: &TableRef,
        columns: &[String],
    ) -> Result<usize, StoreError> {
        self.check("insert_difference")?;
        self.inner.insert_difference(target, source, columns)
    }

    fn drop_table(&mut self, table: &TableRef) -> Result<(), StoreError> {
        self.check("drop_table")?;
        self.inner.drop_table(table)
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        self.check("begin")?;
        self.inner.begin()
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.check("commit")?;
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.check("rollback")?;
        if self.transactional {
            self.inner.rollback()
        } else {
            self.inner.commit()
        }
    }

    fn release(&mut self) -> Result<(), StoreError> {
        self.check("release")?;
        self.inner.release()
    }
}
