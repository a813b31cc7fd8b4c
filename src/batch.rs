use std::collections::HashSet;

use crate::error::{IngestError, IngestResult};

/// Lowercases names written entirely in upper case; anything else is kept
/// verbatim. Names without cased characters are unchanged.
pub fn normalize_name(name: &str) -> String {
    let has_upper = name.chars().any(char::is_uppercase);
    let has_lower = name.chars().any(char::is_lowercase);
    if has_upper && !has_lower {
        name.to_lowercase()
    } else {
        name.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchColumn {
    pub name: String,
    pub values: Vec<Option<String>>,
}

/// Column-oriented set of textual rows awaiting ingestion. `None` is null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    columns: Vec<BatchColumn>,
    row_count: usize,
}

impl Batch {
    pub fn new<N, I>(columns: I) -> IngestResult<Self>
    where
        N: AsRef<str>,
        I: IntoIterator<Item = (N, Vec<Option<String>>)>,
    {
        let mut seen = HashSet::new();
        let mut normalized = Vec::new();
        for (name, values) in columns {
            let name = normalize_name(name.as_ref());
            if !seen.insert(name.clone()) {
                return Err(IngestError::DuplicateColumn { column: name });
            }
            normalized.push(BatchColumn { name, values });
        }

        let row_count = normalized.first().map_or(0, |column| column.values.len());
        if let Some(ragged) = normalized
            .iter()
            .find(|column| column.values.len() != row_count)
        {
            return Err(IngestError::RaggedBatch {
                column: ragged.name.clone(),
                expected: row_count,
                found: ragged.values.len(),
            });
        }

        Ok(Self {
            columns: normalized,
            row_count,
        })
    }

    /// Builds a batch from row-major data. Short rows are padded with nulls.
    pub fn from_rows(headers: &[String], rows: Vec<Vec<Option<String>>>) -> IngestResult<Self> {
        let mut columns: Vec<Vec<Option<String>>> =
            vec![Vec::with_capacity(rows.len()); headers.len()];
        for row in rows {
            let mut cells = row.into_iter();
            for column in columns.iter_mut() {
                column.push(cells.next().flatten());
            }
        }
        Self::new(headers.iter().zip(columns))
    }

    pub fn columns(&self) -> &[BatchColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&BatchColumn> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }
}
