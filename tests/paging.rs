mod common;

use std::sync::Arc;

use common::{articles_table, cluster_of, row, users_table, FakeClient};
use scylla_cql::frame::response::result::CqlValue;
use scylla_rust_admin::rows::{self, PageRequest};
use scylla_rust_admin::{Admin, Column, ColumnKind, ContinuationToken, Error, Table};
use serde_json::json;

#[test]
fn plain_select_scans_the_table() {
    let stmt = rows::select_statement(&users_table(), None).unwrap();
    assert_eq!(stmt.cql, "SELECT * FROM ks.users");
    assert!(stmt.values.is_empty());
}

#[test]
fn search_binds_query_string_with_ceiling() {
    let stmt = rows::select_statement(&articles_table(), Some("title:rust")).unwrap();
    assert_eq!(stmt.cql, "SELECT * FROM ks.articles WHERE es_query = ? LIMIT 500");
    let Some(Some(CqlValue::Text(predicate))) = stmt.values.first() else {
        panic!("expected a text predicate, got {:?}", stmt.values);
    };
    let predicate: serde_json::Value = serde_json::from_str(predicate).unwrap();
    assert_eq!(
        predicate,
        json!({"query": {"query_string": {"query": "title:rust"}}})
    );
}

#[test]
fn search_on_unindexed_table_is_rejected() {
    let err = rows::select_statement(&users_table(), Some("ann")).unwrap_err();
    assert_eq!(err.code(), "SEARCH_UNSUPPORTED");

    let mut bare = Table::new("ks", "bare");
    bare.add_column(Column::new("id", "int", ColumnKind::PartitionKey, 0));
    bare.set_search_indexed(true);
    let err = rows::select_statement(&bare, Some("x")).unwrap_err();
    assert_eq!(err.code(), "SEARCH_UNSUPPORTED");
}

#[tokio::test]
async fn read_page_forwards_size_and_token() {
    let client = FakeClient::new().page(
        vec![row(json!({"id": "u1", "name": "Ann"}))],
        Some("abc"),
    );
    let request = PageRequest::new(25).after(Some(ContinuationToken::new("prev")));
    let page = rows::read_page(&client, &users_table(), &request).await.unwrap();

    assert_eq!(page.rows.len(), 1);
    assert_eq!(page.next_token, Some(ContinuationToken::new("abc")));
    let calls = client.page_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, 25);
    assert_eq!(calls[0].2, Some(ContinuationToken::new("prev")));
}

#[tokio::test]
async fn page_size_must_be_positive() {
    let client = FakeClient::new();
    let err = rows::read_page(&client, &users_table(), &PageRequest::new(0))
        .await
        .unwrap_err();
    assert_eq!(err.status(), 400);
    assert!(client.page_calls().is_empty());
}

#[tokio::test]
async fn admin_reads_and_maps_lookups() {
    let client = Arc::new(FakeClient::new().page(vec![], None));
    let admin = Admin::with_schema(client.clone(), cluster_of(vec![users_table()]));

    let page = admin
        .read_rows("ks", "users", &PageRequest::new(10))
        .await
        .unwrap();
    assert!(page.next_token.is_none());

    let err = admin
        .read_rows("ks", "nope", &PageRequest::new(10))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(err.status(), 404);
}

#[tokio::test]
async fn backend_failure_is_a_server_error() {
    let client = Arc::new(FakeClient::new().page_error("read timeout"));
    let admin = Admin::with_schema(client, cluster_of(vec![users_table()]));
    let err = admin
        .read_rows("ks", "users", &PageRequest::new(10))
        .await
        .unwrap_err();
    assert_eq!(err.status(), 500);
    assert!(err.to_string().contains("read timeout"));
}

#[tokio::test]
async fn mutations_report_what_they_did() {
    let client = Arc::new(FakeClient::new());
    let admin = Admin::with_schema(client.clone(), cluster_of(vec![users_table()]));
    let key = row(json!({"id": "u1", "signup_date": "2024-01-01"}));
    let mut full = key.clone();
    full.insert("name".into(), json!("Ann"));

    assert_eq!(
        admin.insert_row("ks", "users", &full).await.unwrap(),
        "One row inserted or updated"
    );
    assert_eq!(
        admin.update_row("ks", "users", &full).await.unwrap(),
        "One row inserted or updated"
    );
    assert_eq!(
        admin
            .delete_columns("ks", "users", &["name", "bio"], &key)
            .await
            .unwrap(),
        "2 column(s) deleted"
    );
    assert_eq!(admin.delete_row("ks", "users", &key).await.unwrap(), "One row deleted");

    let executed: Vec<String> = client.executed().into_iter().map(|s| s.cql).collect();
    assert_eq!(executed.len(), 4);
    assert!(executed[0].starts_with("INSERT INTO ks.users"));
    assert!(executed[3].starts_with("DELETE FROM ks.users"));
}

#[tokio::test]
async fn repeated_column_names_count_once() {
    let client = Arc::new(FakeClient::new());
    let admin = Admin::with_schema(client.clone(), cluster_of(vec![users_table()]));
    let key = row(json!({"id": "u1", "signup_date": "2024-01-01"}));
    let text = admin
        .delete_columns("ks", "users", &["name", "name"], &key)
        .await
        .unwrap();
    assert_eq!(text, "1 column(s) deleted");
    assert_eq!(
        client.executed()[0].cql,
        "DELETE name FROM ks.users WHERE id = ? AND signup_date = ?"
    );
}

#[tokio::test]
async fn malformed_token_is_rejected_before_querying() {
    let client = FakeClient::new();
    let request = PageRequest::new(10).after(Some(ContinuationToken::new("not base64!")));
    let err = rows::read_page(&client, &users_table(), &request)
        .await
        .unwrap_err();
    assert_eq!(err.status(), 400);
    assert_eq!(err.code(), "MALFORMED_TOKEN");
    assert!(client.page_calls().is_empty());

    let issued = ContinuationToken::from_bytes(&[0, 1, 2, 250]);
    assert_eq!(issued.to_bytes(), Some(vec![0, 1, 2, 250]));
}

#[tokio::test]
async fn rejected_mutation_never_reaches_the_database() {
    let client = Arc::new(FakeClient::new());
    let admin = Admin::with_schema(client.clone(), cluster_of(vec![users_table()]));
    let err = admin
        .update_row("ks", "users", &row(json!({"id": "u1", "name": "Ann"})))
        .await
        .unwrap_err();
    assert_eq!(err.status(), 400);
    assert_eq!(err.code(), "MISSING_IDENTIFYING_COLUMN");
    assert!(client.executed().is_empty());
}
