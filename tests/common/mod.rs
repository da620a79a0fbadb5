#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use scylla_rust_admin::error::BackendError;
use scylla_rust_admin::{Column, ColumnKind, Keyspace, Table};
use scylla_rust_admin::{Cluster, ContinuationToken, CqlClient, Page, Row, Statement};
use serde_json::Value;

type Rule = Box<dyn Fn(&Statement) -> Option<Result<Vec<Row>, String>> + Send + Sync>;

/// Scripted [`CqlClient`]: queries are answered by the first matching rule,
/// pages are popped in order, executed statements are recorded.
#[derive(Default)]
pub struct FakeClient {
    rules: Vec<Rule>,
    pages: Mutex<VecDeque<Result<Page, String>>>,
    page_calls: Mutex<Vec<(Statement, i32, Option<ContinuationToken>)>>,
    executed: Mutex<Vec<Statement>>,
    fail_execute: Option<String>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers statements whose CQL contains `needle`.
    pub fn on(self, needle: &str, rows: Vec<Row>) -> Self {
        let needle = needle.to_string();
        self.rule(move |s| s.cql.contains(&needle).then(|| Ok(rows.clone())))
    }

    pub fn failing_on(self, needle: &str, message: &str) -> Self {
        let needle = needle.to_string();
        let message = message.to_string();
        self.rule(move |s| s.cql.contains(&needle).then(|| Err(message.clone())))
    }

    pub fn rule(
        mut self,
        f: impl Fn(&Statement) -> Option<Result<Vec<Row>, String>> + Send + Sync + 'static,
    ) -> Self {
        self.rules.push(Box::new(f));
        self
    }

    pub fn page(self, rows: Vec<Row>, next: Option<&str>) -> Self {
        self.pages.lock().unwrap().push_back(Ok(Page {
            rows,
            next_token: next.map(ContinuationToken::new),
        }));
        self
    }

    pub fn page_error(self, message: &str) -> Self {
        self.pages.lock().unwrap().push_back(Err(message.to_string()));
        self
    }

    pub fn failing_execute(mut self, message: &str) -> Self {
        self.fail_execute = Some(message.to_string());
        self
    }

    pub fn executed(&self) -> Vec<Statement> {
        self.executed.lock().unwrap().clone()
    }

    pub fn page_calls(&self) -> Vec<(Statement, i32, Option<ContinuationToken>)> {
        self.page_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CqlClient for FakeClient {
    async fn query_all(&self, statement: &Statement) -> Result<Vec<Row>, BackendError> {
        for rule in &self.rules {
            if let Some(result) = rule(statement) {
                return result.map_err(|m| BackendError::new("fake query failed", m));
            }
        }
        Ok(Vec::new())
    }

    async fn query_page(
        &self,
        statement: &Statement,
        page_size: i32,
        token: Option<&ContinuationToken>,
    ) -> Result<Page, BackendError> {
        self.page_calls
            .lock()
            .unwrap()
            .push((statement.clone(), page_size, token.cloned()));
        let next = self.pages.lock().unwrap().pop_front();
        match next {
            Some(Ok(page)) => Ok(page),
            Some(Err(m)) => Err(BackendError::new("fake page failed", m)),
            None => Ok(Page::default()),
        }
    }

    async fn execute(&self, statement: &Statement) -> Result<(), BackendError> {
        if let Some(m) = &self.fail_execute {
            return Err(BackendError::new("fake execute failed", m.clone()));
        }
        self.executed.lock().unwrap().push(statement.clone());
        Ok(())
    }
}

/// Builds a row from a `json!({...})` object literal.
pub fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("row fixture must be an object, got {other}"),
    }
}

/// `ks.users`: `id` partition key, `signup_date` clustering key, `name`
/// regular, `bio` static.
pub fn users_table() -> Table {
    let mut t = Table::new("ks", "users");
    t.add_column(Column::new("id", "text", ColumnKind::PartitionKey, 0));
    t.add_column(Column::new("signup_date", "timestamp", ColumnKind::ClusteringKey, 0));
    t.add_column(Column::new("name", "text", ColumnKind::Regular, -1));
    t.add_column(Column::new("bio", "text", ColumnKind::Static, -1));
    t
}

/// `ks.articles`: search-indexed, with the `es_query` pseudo-column.
pub fn articles_table() -> Table {
    let mut t = Table::new("ks", "articles");
    t.add_column(Column::new("id", "uuid", ColumnKind::PartitionKey, 0));
    t.add_column(Column::new("title", "text", ColumnKind::Regular, -1));
    t.add_column(Column::new("es_query", "text", ColumnKind::Regular, -1));
    t.set_search_indexed(true);
    t
}

pub fn cluster_of(tables: Vec<Table>) -> Cluster {
    let mut cluster = Cluster::new();
    for table in tables {
        let ks = table.keyspace_name().to_string();
        if cluster.get_keyspace(&ks).is_none() {
            cluster.add_keyspace(Keyspace::new(&ks));
        }
        if let Some(keyspace) = cluster.get_keyspace_mut(&ks) {
            keyspace.add_table(table);
        }
    }
    cluster
}
