mod common;

use common::{
    FailingStore, batch, column_types, main_table, memory_store, retaining_ingestor, rows,
    seed_table, table_names, text_rows,
};
use table_ingest::{
    ColumnDef, IngestError, Store, StoreError,
    config::IngestConfig,
    error::ArtifactKind,
    ingest::Ingestor,
    load::{load_batch, staging_table_name},
    sql_type::SqlType,
    sqlite::SqliteStore,
    widen::{shadow_column_name, widen_column},
};

fn seeded_orders() -> SqliteStore {
    let mut store = memory_store();
    seed_table(
        &mut store,
        "orders",
        &[("id", SqlType::numeric(2, 0)), ("label", SqlType::VarChar(3))],
        &[&[Some("12"), Some("abc")], &[Some("34"), None]],
    );
    store
}

fn injected(err: &IngestError, operation: &str) -> bool {
    matches!(err, IngestError::Store(StoreError::Backend(message)) if message.contains(operation))
}

fn original_columns() -> Vec<(String, SqlType)> {
    vec![
        ("id".to_string(), SqlType::numeric(2, 0)),
        ("label".to_string(), SqlType::VarChar(3)),
    ]
}

fn original_rows() -> Vec<Vec<Option<String>>> {
    text_rows(&[&[Some("12"), Some("abc")], &[Some("34"), None]])
}

#[test]
fn failed_swap_restores_column_type_and_values() {
    for operation in ["copy_with_cast", "drop_column", "rename_column", "commit"] {
        let mut store = FailingStore::new(seeded_orders()).fail_on(operation, 1);
        let err = retaining_ingestor()
            .ingest(
                &batch(&[("id", &[Some("123")]), ("label", &[None])]),
                "orders",
                Some("main"),
                &mut store,
            )
            .expect_err("injected failure");

        assert!(injected(&err, operation), "{operation}: {err:?}");
        assert_eq!(column_types(&mut store.inner, "orders"), original_columns());
        assert_eq!(rows(&mut store.inner, "orders"), original_rows());
    }
}

#[test]
fn leftover_shadow_column_is_dropped_when_rollback_keeps_ddl() {
    let shadow = shadow_column_name(&["id".to_string(), "label".to_string()]);
    let mut store = FailingStore::new(seeded_orders())
        .fail_on("rename_column", 1)
        .without_transactional_ddl();

    let err = widen_column(
        &mut store,
        &main_table("orders"),
        &ColumnDef::nullable("id", SqlType::numeric(2, 0)),
        &SqlType::numeric(3, 0),
    )
    .expect_err("rename fails");

    assert!(injected(&err, "rename_column"));
    let columns = store
        .inner
        .column_names(&main_table("orders"))
        .expect("names");
    assert!(!columns.contains(&shadow), "shadow left behind: {columns:?}");
}

#[test]
fn shadow_cleanup_failure_keeps_the_original_error() {
    let mut store = FailingStore::new(seeded_orders())
        .fail_on("rename_column", 1)
        .fail_on("drop_column", 2)
        .without_transactional_ddl();

    let err = widen_column(
        &mut store,
        &main_table("orders"),
        &ColumnDef::nullable("id", SqlType::numeric(2, 0)),
        &SqlType::numeric(3, 0),
    )
    .expect_err("both fail");

    match err {
        IngestError::CleanupFailed {
            kind,
            name,
            original,
            source,
        } => {
            assert_eq!(kind, ArtifactKind::ShadowColumn);
            assert_eq!(
                name,
                shadow_column_name(&["id".to_string(), "label".to_string()])
            );
            assert!(injected(&original, "rename_column"));
            assert!(injected(&source, "drop_column"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn narrowing_is_refused_before_any_change() {
    let mut store = seeded_orders();
    let err = widen_column(
        &mut store,
        &main_table("orders"),
        &ColumnDef::nullable("id", SqlType::numeric(2, 0)),
        &SqlType::numeric(1, 0),
    )
    .expect_err("narrowing");

    assert!(matches!(err, IngestError::Narrowing { .. }));
    assert_eq!(column_types(&mut store, "orders"), original_columns());
}

#[test]
fn failed_load_leaves_existing_rows_and_no_staging_table() {
    for operation in ["insert_rows", "insert_difference", "commit"] {
        let mut store = FailingStore::new(seeded_orders()).fail_on(operation, 1);
        let err = retaining_ingestor()
            .ingest(
                &batch(&[("id", &[Some("56")]), ("label", &[Some("new")])]),
                "orders",
                Some("main"),
                &mut store,
            )
            .expect_err("injected failure");

        assert!(injected(&err, operation), "{operation}: {err:?}");
        assert_eq!(rows(&mut store.inner, "orders"), original_rows());
        assert_eq!(table_names(&mut store.inner), vec!["orders"]);
    }
}

#[test]
fn leftover_staging_table_is_dropped_when_rollback_keeps_ddl() {
    let mut store = FailingStore::new(seeded_orders())
        .fail_on("insert_difference", 1)
        .without_transactional_ddl();
    let final_columns = store.columns(&main_table("orders")).expect("columns");

    let err = load_batch(
        &mut store,
        &main_table("orders"),
        &final_columns,
        &batch(&[("id", &[Some("56")])]),
    )
    .expect_err("insert fails");

    assert!(injected(&err, "insert_difference"));
    assert_eq!(table_names(&mut store.inner), vec!["orders"]);
}

#[test]
fn staging_cleanup_failure_keeps_the_original_error() {
    let mut store = FailingStore::new(seeded_orders())
        .fail_on("insert_difference", 1)
        .fail_on("drop_table", 1)
        .without_transactional_ddl();
    let final_columns = store.columns(&main_table("orders")).expect("columns");

    let err = load_batch(
        &mut store,
        &main_table("orders"),
        &final_columns,
        &batch(&[("id", &[Some("56")])]),
    )
    .expect_err("both fail");

    match err {
        IngestError::CleanupFailed {
            kind,
            original,
            source,
            ..
        } => {
            assert_eq!(kind, ArtifactKind::StagingTable);
            assert!(injected(&original, "insert_difference"));
            assert!(injected(&source, "drop_table"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn cleanup_failure_after_success_is_reported() {
    let mut store = FailingStore::new(seeded_orders()).fail_on("drop_table", 1);
    let final_columns = store.columns(&main_table("orders")).expect("columns");

    let err = load_batch(
        &mut store,
        &main_table("orders"),
        &final_columns,
        &batch(&[("id", &[Some("56")])]),
    )
    .expect_err("drop fails");

    assert!(injected(&err, "drop_table"));
}

#[test]
fn existing_staging_table_is_a_collision_and_is_left_alone() {
    let mut store = seeded_orders();
    let staging = staging_table_name(&main_table("orders"));
    seed_table(
        &mut store,
        &staging,
        &[("stale", SqlType::VarChar(5))],
        &[&[Some("stale")]],
    );

    let err = retaining_ingestor()
        .ingest(
            &batch(&[("id", &[Some("56")])]),
            "orders",
            Some("main"),
            &mut store,
        )
        .expect_err("collision");

    assert!(matches!(
        err,
        IngestError::NameCollision { kind: ArtifactKind::StagingTable, ref name, .. } if *name == staging
    ));
    assert_eq!(rows(&mut store, "orders"), original_rows());
    assert_eq!(rows(&mut store, &staging), text_rows(&[&[Some("stale")]]));
}

#[test]
fn failed_ingest_still_releases_the_connection() {
    let mut store = FailingStore::new(seeded_orders()).fail_on("insert_difference", 1);
    let err = Ingestor::new(IngestConfig::default())
        .expect("ingestor")
        .ingest(
            &batch(&[("id", &[Some("56")])]),
            "orders",
            Some("main"),
            &mut store,
        )
        .expect_err("injected failure");

    assert!(injected(&err, "insert_difference"));
    assert!(store.inner.is_released());
}

#[test]
fn release_failure_after_success_is_reported() {
    let mut store = FailingStore::new(seeded_orders()).fail_on("release", 1);
    let err = Ingestor::new(IngestConfig::default())
        .expect("ingestor")
        .ingest(
            &batch(&[("id", &[Some("56")])]),
            "orders",
            Some("main"),
            &mut store,
        )
        .expect_err("release fails");

    assert!(injected(&err, "release"));
}

#[test]
fn release_failure_does_not_hide_the_original_error() {
    let mut store = FailingStore::new(seeded_orders())
        .fail_on("insert_rows", 1)
        .fail_on("release", 1);
    let err = Ingestor::new(IngestConfig::default())
        .expect("ingestor")
        .ingest(
            &batch(&[("id", &[Some("56")])]),
            "orders",
            Some("main"),
            &mut store,
        )
        .expect_err("both fail");

    assert!(injected(&err, "insert_rows"));
}

#[test]
fn failed_load_undoes_the_widens_of_the_same_call() {
    for operation in ["insert_rows", "insert_difference", "commit"] {
        // Both widens commit first, so the load's commit is the third.
        let nth = if operation == "commit" { 3 } else { 1 };
        let mut store = FailingStore::new(seeded_orders()).fail_on(operation, nth);
        let err = retaining_ingestor()
            .ingest(
                &batch(&[("id", &[Some("123")]), ("label", &[Some("longer")])]),
                "orders",
                Some("main"),
                &mut store,
            )
            .expect_err("injected failure");

        assert!(injected(&err, operation), "{operation}: {err:?}");
        assert_eq!(column_types(&mut store.inner, "orders"), original_columns());
        assert_eq!(rows(&mut store.inner, "orders"), original_rows());
        assert_eq!(table_names(&mut store.inner), vec!["orders"]);
    }
}

#[test]
fn failed_first_load_leaves_no_table_behind() {
    let mut store = FailingStore::new(memory_store()).fail_on("insert_rows", 1);
    let err = retaining_ingestor()
        .ingest(
            &batch(&[("id", &[Some("1")]), ("label", &[Some("abc")])]),
            "orders",
            Some("main"),
            &mut store,
        )
        .expect_err("injected failure");

    assert!(injected(&err, "insert_rows"));
    assert!(table_names(&mut store.inner).is_empty());
}

fn comma_decimal_ingestor() -> Ingestor {
    Ingestor::new(
        IngestConfig {
            number_patterns: vec![r"[0-9]+(,[0-9]+)?".to_string()],
            ..IngestConfig::default()
        }
        .retain_connection(),
    )
    .expect("ingestor")
}

#[test]
fn unparseable_value_rolls_back_the_created_table() {
    let mut store = memory_store();
    let err = comma_decimal_ingestor()
        .ingest(
            &batch(&[("id", &[Some("1,5")])]),
            "orders",
            Some("main"),
            &mut store,
        )
        .expect_err("comma is not a decimal point");

    assert!(matches!(err, IngestError::InvalidValue { ref value, .. } if value == "1,5"));
    assert!(table_names(&mut store).is_empty());
}

#[test]
fn unparseable_value_rolls_back_widens_and_added_columns() {
    let mut store = seeded_orders();
    let err = comma_decimal_ingestor()
        .ingest(
            &batch(&[
                ("id", &[Some("123,5")]),
                ("label", &[Some("longer")]),
                ("note", &[Some("x")]),
            ]),
            "orders",
            Some("main"),
            &mut store,
        )
        .expect_err("comma is not a decimal point");

    assert!(matches!(err, IngestError::InvalidValue { .. }), "{err:?}");
    assert_eq!(column_types(&mut store, "orders"), original_columns());
    assert_eq!(rows(&mut store, "orders"), original_rows());
}
