mod common;

use common::{row, users_table};
use scylla_cql::frame::response::result::CqlValue;
use scylla_cql::frame::value::CqlDate;
use scylla_rust_admin::error::ValidationError;
use scylla_rust_admin::mutation;
use scylla_rust_admin::{Column, ColumnKind, Table, TableRef};
use serde_json::json;

fn users() -> TableRef {
    TableRef::new("ks", "users")
}

/// Time-series layout: one partition per sensor, one row per day.
fn events_table() -> Table {
    let mut t = Table::new("ks", "events");
    t.add_column(Column::new("sensor", "text", ColumnKind::PartitionKey, 0));
    t.add_column(Column::new("day", "date", ColumnKind::ClusteringKey, 0));
    t.add_column(Column::new("order", "int", ColumnKind::Regular, -1));
    t.add_column(Column::new("reading", "decimal", ColumnKind::Regular, -1));
    t
}

#[test]
fn insert_requires_every_key_column() {
    let table = users_table();
    let err = mutation::insert(&table, &row(json!({"id": "u1", "name": "Ann"}))).unwrap_err();
    assert_eq!(
        err,
        ValidationError::MissingPrimaryKeyColumn {
            table: users(),
            column: "signup_date".into(),
            role: ColumnKind::ClusteringKey,
        }
    );

    let err = mutation::insert(&table, &row(json!({"signup_date": 0}))).unwrap_err();
    assert!(matches!(
        err,
        ValidationError::MissingPrimaryKeyColumn { ref column, role: ColumnKind::PartitionKey, .. } if column == "id"
    ));
}

#[test]
fn insert_treats_null_key_as_missing() {
    let table = users_table();
    let err = mutation::insert(
        &table,
        &row(json!({"id": null, "signup_date": "2024-01-01"})),
    )
    .unwrap_err();
    assert_eq!(err.code(), "MISSING_PRIMARY_KEY_COLUMN");
}

#[test]
fn insert_lists_keys_first_and_skips_unknown_keys() {
    let table = users_table();
    let stmt = mutation::insert(
        &table,
        &row(json!({
            "name": "Ann",
            "bio": "hi",
            "id": "u1",
            "signup_date": "2024-01-01",
            "not_a_column": 1
        })),
    )
    .unwrap();
    assert_eq!(
        stmt.cql,
        "INSERT INTO ks.users (id, signup_date, bio, name) VALUES (?, ?, ?, ?)"
    );
    assert_eq!(stmt.values.len(), 4);
    assert_eq!(stmt.values[0], Some(CqlValue::Text("u1".into())));
    assert_eq!(stmt.values[3], Some(CqlValue::Text("Ann".into())));
}

#[test]
fn update_of_regular_column_requires_clustering_key() {
    let table = users_table();
    let err = mutation::update(&table, &row(json!({"id": "u1", "name": "Ann"}))).unwrap_err();
    assert_eq!(
        err,
        ValidationError::MissingIdentifyingColumn {
            table: users(),
            column: "signup_date".into(),
            role: ColumnKind::ClusteringKey,
        }
    );
}

#[test]
fn static_only_update_is_addressed_by_partition() {
    let table = users_table();
    let stmt = mutation::update(
        &table,
        &row(json!({"id": "u1", "signup_date": "2024-01-01", "bio": "hi"})),
    )
    .unwrap();
    assert_eq!(stmt.cql, "UPDATE ks.users SET bio = ? WHERE id = ?");
    assert_eq!(
        stmt.values,
        vec![
            Some(CqlValue::Text("hi".into())),
            Some(CqlValue::Text("u1".into()))
        ]
    );

    let stmt = mutation::update(&table, &row(json!({"id": "u1", "bio": "hi"}))).unwrap();
    assert_eq!(stmt.cql, "UPDATE ks.users SET bio = ? WHERE id = ?");
}

#[test]
fn mixing_static_and_regular_requires_full_key() {
    let table = users_table();
    let err = mutation::update(&table, &row(json!({"id": "u1", "bio": "hi", "name": "Ann"})))
        .unwrap_err();
    assert_eq!(err.code(), "MISSING_IDENTIFYING_COLUMN");

    let stmt = mutation::update(
        &table,
        &row(json!({"id": "u1", "signup_date": "2024-01-01", "bio": "hi", "name": "Ann"})),
    )
    .unwrap();
    assert_eq!(
        stmt.cql,
        "UPDATE ks.users SET bio = ?, name = ? WHERE id = ? AND signup_date = ?"
    );
    assert_eq!(stmt.values.len(), 4);
}

#[test]
fn update_without_data_columns_fails() {
    let table = users_table();
    let err = mutation::update(
        &table,
        &row(json!({"id": "u1", "signup_date": "2024-01-01", "unknown": 3})),
    )
    .unwrap_err();
    assert_eq!(err, ValidationError::NoColumnsToUpdate { table: users() });
}

#[test]
fn update_binds_null_for_data_columns() {
    let table = users_table();
    let stmt = mutation::update(
        &table,
        &row(json!({"id": "u1", "signup_date": "2024-01-01", "name": null})),
    )
    .unwrap();
    assert_eq!(stmt.values[0], None);
}

#[test]
fn delete_row_needs_full_primary_key() {
    let table = users_table();
    let err = mutation::delete_row(&table, &row(json!({"id": "u1"}))).unwrap_err();
    assert_eq!(err.code(), "MISSING_IDENTIFYING_COLUMN");

    let stmt = mutation::delete_row(
        &table,
        &row(json!({"id": "u1", "signup_date": "2024-01-01", "name": "ignored"})),
    )
    .unwrap();
    assert_eq!(stmt.cql, "DELETE FROM ks.users WHERE id = ? AND signup_date = ?");
    assert_eq!(stmt.values.len(), 2);
}

#[test]
fn delete_columns_rejects_keys_and_unknown_names() {
    let table = users_table();
    let payload = row(json!({"id": "u1", "signup_date": "2024-01-01"}));

    let err = mutation::delete_columns(&table, &["id"], &payload).unwrap_err();
    assert_eq!(
        err,
        ValidationError::CannotModifyPartitionKey {
            table: users(),
            column: "id".into()
        }
    );

    let err = mutation::delete_columns(&table, &["nickname"], &payload).unwrap_err();
    assert_eq!(
        err,
        ValidationError::UnknownColumn {
            table: users(),
            column: "nickname".into()
        }
    );

    let err = mutation::delete_columns(&table, &["signup_date"], &payload).unwrap_err();
    assert_eq!(err.code(), "CANNOT_MODIFY_CLUSTERING_KEY");

    let none: [&str; 0] = [];
    let err = mutation::delete_columns(&table, &none, &payload).unwrap_err();
    assert_eq!(err.code(), "NO_COLUMNS_TO_UPDATE");
}

#[test]
fn delete_columns_scopes_predicate_by_target_roles() {
    let table = users_table();

    let stmt = mutation::delete_columns(&table, &["bio"], &row(json!({"id": "u1"}))).unwrap();
    assert_eq!(stmt.cql, "DELETE bio FROM ks.users WHERE id = ?");

    let err = mutation::delete_columns(&table, &["bio", "name"], &row(json!({"id": "u1"})))
        .unwrap_err();
    assert_eq!(err.code(), "MISSING_IDENTIFYING_COLUMN");

    let stmt = mutation::delete_columns(
        &table,
        &["name", "bio", "name"],
        &row(json!({"id": "u1", "signup_date": "2024-01-01"})),
    )
    .unwrap();
    assert_eq!(
        stmt.cql,
        "DELETE name, bio FROM ks.users WHERE id = ? AND signup_date = ?"
    );
}

#[test]
fn bad_values_name_the_column() {
    let table = users_table();
    let err = mutation::insert(
        &table,
        &row(json!({"id": "u1", "signup_date": "not a date"})),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ValidationError::InvalidValue { ref column, ref cql_type, .. }
            if column == "signup_date" && cql_type == "timestamp"
    ));
}

#[test]
fn date_keyed_rows_can_be_written_and_removed() {
    let table = events_table();
    let key = row(json!({"sensor": "s1", "day": "2024-01-01"}));
    let day = Some(CqlValue::Date(CqlDate((1 << 31) + 19_723)));

    let mut full = key.clone();
    full.insert("reading".into(), json!("21.5"));
    let stmt = mutation::insert(&table, &full).unwrap();
    assert_eq!(
        stmt.cql,
        "INSERT INTO ks.events (sensor, day, reading) VALUES (?, ?, ?)"
    );
    assert_eq!(stmt.values[1], day);

    let stmt = mutation::update(&table, &full).unwrap();
    assert_eq!(stmt.values.last(), Some(&day));

    let stmt = mutation::delete_row(&table, &key).unwrap();
    assert_eq!(stmt.cql, "DELETE FROM ks.events WHERE sensor = ? AND day = ?");
    assert_eq!(stmt.values[1], day);
}

#[test]
fn reserved_word_columns_are_quoted() {
    let table = events_table();
    let stmt = mutation::update(
        &table,
        &row(json!({"sensor": "s1", "day": "2024-01-01", "order": 3})),
    )
    .unwrap();
    assert_eq!(
        stmt.cql,
        "UPDATE ks.events SET \"order\" = ? WHERE sensor = ? AND day = ?"
    );
    assert_eq!(mutation::quote_ident("reading"), "reading");
    assert_eq!(mutation::quote_ident("Mixed"), "\"Mixed\"");
}
