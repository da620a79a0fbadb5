//! The database client seam: statements, rows, pages and the async trait the
//! loader, the row reader and the admin service execute against.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use futures_util::future::try_join_all;
use scylla_cql::frame::response::result::CqlValue;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BackendError;

/// A row keyed by column name, as returned to API clients.
pub type Row = Map<String, Value>;

/// CQL text plus positional bind values; `None` binds null.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub cql: String,
    pub values: Vec<Option<CqlValue>>,
}

impl Statement {
    pub fn new(cql: impl Into<String>) -> Self {
        Self {
            cql: cql.into(),
            values: Vec::new(),
        }
    }

    pub fn with_values(cql: impl Into<String>, values: Vec<Option<CqlValue>>) -> Self {
        Self {
            cql: cql.into(),
            values,
        }
    }
}

/// Cursor for resuming a paged scan: the driver's paging state, base64
/// encoded. Clients treat it as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn from_bytes(state: &[u8]) -> Self {
        Self(B64.encode(state))
    }

    /// Raw paging state, or `None` when the token was not issued by us.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        B64.decode(self.0.as_bytes()).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page of rows. `next_token == None` means the scan is exhausted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub rows: Vec<Row>,
    pub next_token: Option<ContinuationToken>,
}

#[async_trait]
pub trait CqlClient: Send + Sync {
    /// Runs `statement` and follows every page.
    async fn query_all(&self, statement: &Statement) -> Result<Vec<Row>, BackendError>;

    /// Fetches one page of at most `page_size` rows, resuming at `token`.
    async fn query_page(
        &self,
        statement: &Statement,
        page_size: i32,
        token: Option<&ContinuationToken>,
    ) -> Result<Page, BackendError>;

    async fn execute(&self, statement: &Statement) -> Result<(), BackendError>;

    /// Runs every statement concurrently. Results keep the input order; the
    /// first failure fails the whole batch and other results are dropped.
    async fn query_each(&self, statements: &[Statement]) -> Result<Vec<Vec<Row>>, BackendError> {
        try_join_all(statements.iter().map(|s| self.query_all(s))).await
    }
}
