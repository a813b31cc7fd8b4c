//! In-place column type changes through a shadow column.
//!
//! The new type is materialised in a shadow column, the old values are cast
//! into it, the old column is dropped and the shadow takes its name. All four
//! steps run in one transaction. Whatever the outcome, the shadow column is
//! checked for afterwards and dropped if the store left it behind.

use log::{debug, error};

use crate::{
    error::{ArtifactKind, IngestError, IngestResult, merge_cleanup},
    sql_type::SqlType,
    store::{ColumnDef, Store, TableRef, artifact_name},
};

/// Shadow column name for a table whose columns are `column_names`.
pub fn shadow_column_name(column_names: &[String]) -> String {
    artifact_name(&column_names.concat())
}

/// True when every value of `from` survives a cast to `to`.
pub fn is_widening(from: &SqlType, to: &SqlType) -> bool {
    match (from, to) {
        (SqlType::Numeric(old), SqlType::Numeric(new)) => new.covers(old),
        (SqlType::VarChar(old), SqlType::VarChar(new)) => new >= old,
        (SqlType::Text, SqlType::VarChar(_)) => false,
        (_, SqlType::VarChar(_) | SqlType::Text) => true,
        (old, new) => old == new,
    }
}

pub fn widen_column(
    store: &mut dyn Store,
    table: &TableRef,
    column: &ColumnDef,
    new_type: &SqlType,
) -> IngestResult<()> {
    if !is_widening(&column.sql_type, new_type) {
        return Err(IngestError::Narrowing {
            table: table.to_string(),
            column: column.name.clone(),
            from: column.sql_type.clone(),
            to: new_type.clone(),
        });
    }

    let column_names = store.column_names(table)?;
    let shadow_name = shadow_column_name(&column_names);
    if column_names.contains(&shadow_name) {
        return Err(IngestError::NameCollision {
            kind: ArtifactKind::ShadowColumn,
            name: shadow_name,
            table: table.to_string(),
        });
    }

    debug!(
        "Change the type of the column named {} in table {table} from {} to {new_type}",
        column.name, column.sql_type
    );
    store.begin()?;
    let outcome = swap_through_shadow(store, table, column, &shadow_name, new_type)
        .and_then(|()| store.commit().map_err(IngestError::from));
    if outcome.is_err() {
        error!(
            "Rollback attempt to change the type of the column named {} from {} to {new_type}",
            column.name, column.sql_type
        );
        if let Err(rollback_err) = store.rollback() {
            error!("Rollback of {table} failed: {rollback_err}");
        }
    }

    let cleanup = drop_shadow_if_present(store, table, &shadow_name);
    merge_cleanup(outcome, cleanup, ArtifactKind::ShadowColumn, &shadow_name)
}

fn swap_through_shadow(
    store: &mut dyn Store,
    table: &TableRef,
    column: &ColumnDef,
    shadow_name: &str,
    new_type: &SqlType,
) -> IngestResult<()> {
    store.add_column(table, &ColumnDef::nullable(shadow_name, new_type.clone()))?;
    let copied = store.copy_with_cast(table, &column.name, shadow_name, new_type)?;
    debug!("Re-cast {copied} row(s) of {table}.{}", column.name);
    store.drop_column(table, &column.name)?;
    store.rename_column(table, shadow_name, &column.name)?;
    Ok(())
}

fn drop_shadow_if_present(
    store: &mut dyn Store,
    table: &TableRef,
    shadow_name: &str,
) -> IngestResult<()> {
    if store
        .column_names(table)?
        .iter()
        .any(|name| name == shadow_name)
    {
        debug!("Drop the leftover shadow column {shadow_name} from {table}");
        store.drop_column(table, shadow_name)?;
    }
    Ok(())
}
