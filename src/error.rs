use std::fmt;

use thiserror::Error;

use crate::{classify::InferredType, sql_type::SqlType};

/// Failures raised by a [`crate::store::Store`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("connection has already been released")]
    Released,
    #[error("table {0} does not exist")]
    MissingTable(String),
    #[error("no open transaction to {0}")]
    NoTransaction(&'static str),
    #[error("{0}")]
    Backend(String),
}

/// Ephemeral objects created while migrating or loading a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    ShadowColumn,
    StagingTable,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::ShadowColumn => write!(f, "shadow column"),
            ArtifactKind::StagingTable => write!(f, "staging table"),
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Column '{column}' appears more than once in the batch after case normalization")]
    DuplicateColumn { column: String },
    #[error("Column '{column}' holds {found} value(s) but the batch has {expected} row(s)")]
    RaggedBatch {
        column: String,
        expected: usize,
        found: usize,
    },
    #[error("Invalid {kind} pattern '{pattern}'")]
    InvalidPattern {
        kind: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("The {kind} name '{name}' is already present in table {table}")]
    NameCollision {
        kind: ArtifactKind,
        name: String,
        table: String,
    },
    #[error(
        "Unhandled type for the column named '{column}' in table {table}: existing type {vendor}, incoming data {incoming}"
    )]
    UnhandledType {
        table: String,
        column: String,
        vendor: SqlType,
        incoming: InferredType,
    },
    #[error(
        "Refusing to change column '{column}' in table {table} from {from} to {to}: values would not fit"
    )]
    Narrowing {
        table: String,
        column: String,
        from: SqlType,
        to: SqlType,
    },
    #[error("Column '{column}' is missing from table {table}")]
    MissingColumn { table: String, column: String },
    #[error("Value '{value}' in column '{column}' cannot be read as {expected}")]
    InvalidValue {
        column: String,
        value: String,
        expected: &'static str,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Failed to remove {kind} '{name}' after error: {original}")]
    CleanupFailed {
        kind: ArtifactKind,
        name: String,
        original: Box<IngestError>,
        #[source]
        source: Box<IngestError>,
    },
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Combines the outcome of a guarded unit of work with the outcome of its
/// artifact cleanup. The original error always wins; a cleanup failure is
/// attached to it rather than replacing it.
pub(crate) fn merge_cleanup<T>(
    outcome: IngestResult<T>,
    cleanup: IngestResult<()>,
    kind: ArtifactKind,
    name: &str,
) -> IngestResult<T> {
    match (outcome, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(cleanup_err)) => Err(cleanup_err),
        (Err(original), Ok(())) => Err(original),
        (Err(original), Err(cleanup_err)) => Err(IngestError::CleanupFailed {
            kind,
            name: name.to_string(),
            original: Box::new(original),
            source: Box::new(cleanup_err),
        }),
    }
}
