//! Paged row reads, optionally filtered by a full-text search predicate.

use scylla_cql::frame::response::result::CqlValue;
use serde_json::json;
use tracing::debug;

use crate::client::{ContinuationToken, CqlClient, Page, Statement};
use crate::error::{Error, ValidationError};
use crate::model::Table;
use crate::mutation::qualified_name;

/// Pseudo-column search-indexed tables expose for query-string predicates.
pub const SEARCH_COLUMN: &str = "es_query";

/// Upper bound on rows scanned by a search-filtered read.
pub const SEARCH_RESULT_CEILING: u32 = 500;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageRequest {
    pub page_size: i32,
    pub token: Option<ContinuationToken>,
    pub search: Option<String>,
}

impl PageRequest {
    pub fn new(page_size: i32) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }

    pub fn after(mut self, token: Option<ContinuationToken>) -> Self {
        self.token = token;
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }
}

/// SELECT over the whole table, or over the search predicate when `search`
/// is given. Search requires a search index and the search column.
pub fn select_statement(table: &Table, search: Option<&str>) -> Result<Statement, ValidationError> {
    let base = format!("SELECT * FROM {}", qualified_name(table));
    let Some(search) = search else {
        return Ok(Statement::new(base));
    };
    if !table.search_indexed() || table.get_column(SEARCH_COLUMN).is_none() {
        return Err(ValidationError::SearchUnsupported {
            table: table.table_ref(),
        });
    }
    let predicate = json!({ "query": { "query_string": { "query": search } } });
    Ok(Statement::with_values(
        format!("{} WHERE {} = ? LIMIT {}", base, SEARCH_COLUMN, SEARCH_RESULT_CEILING),
        vec![Some(CqlValue::Text(predicate.to_string()))],
    ))
}

/// Fetches one page. The returned token resumes the scan; `None` means there
/// are no more rows.
pub async fn read_page<C: CqlClient + ?Sized>(
    client: &C,
    table: &Table,
    request: &PageRequest,
) -> Result<Page, Error> {
    if request.page_size < 1 {
        return Err(ValidationError::InvalidPageSize {
            table: table.table_ref(),
            size: i64::from(request.page_size),
        }
        .into());
    }
    if request.token.as_ref().is_some_and(|t| t.to_bytes().is_none()) {
        return Err(ValidationError::MalformedToken {
            table: table.table_ref(),
        }
        .into());
    }
    let statement = select_statement(table, request.search.as_deref())?;
    let page = client
        .query_page(&statement, request.page_size, request.token.as_ref())
        .await?;
    debug!(
        table = %table.table_ref(),
        rows = page.rows.len(),
        more = page.next_token.is_some(),
        "read page"
    );
    Ok(page)
}
