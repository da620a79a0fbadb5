//! Client-side paging cache for the table currently being viewed.
//!
//! Rows accumulate page by page. The continuation token is paired with an
//! explicit `exhausted` flag: a missing token alone cannot tell "never
//! fetched" from "no more pages".

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::{ContinuationToken, Page, Row};
use crate::error::{NotFoundError, Result, ValidationError};
use crate::model::{ColumnKind, Table, TableRef};

/// Where cached rows come from and where cell edits go.
#[async_trait]
pub trait RowSource: Send + Sync {
    async fn fetch_page(
        &self,
        table: &TableRef,
        size: usize,
        token: Option<&ContinuationToken>,
    ) -> Result<Page>;

    async fn update_row(&self, table: &TableRef, row: &Row) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    Fetching,
    Ready,
    /// Last fetch failed; cached rows are intact and a retry is allowed.
    Error(String),
}

#[derive(Debug, Clone)]
pub struct TableCache {
    table: TableRef,
    rows: Vec<Row>,
    next_token: Option<ContinuationToken>,
    exhausted: bool,
    state: CacheState,
}

impl TableCache {
    pub fn new(table: TableRef) -> Self {
        Self {
            table,
            rows: Vec::new(),
            next_token: None,
            exhausted: false,
            state: CacheState::Empty,
        }
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn next_token(&self) -> Option<&ContinuationToken> {
        self.next_token.as_ref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn state(&self) -> &CacheState {
        &self.state
    }

    /// Ensures at least `target` rows are cached, issuing at most one request
    /// for exactly the missing count. No-op when enough rows are cached or the
    /// scan is exhausted.
    pub async fn fetch_until<S: RowSource + ?Sized>(
        &mut self,
        source: &S,
        target: usize,
    ) -> Result<&[Row]> {
        let cached = self.rows.len();
        if cached >= target || self.exhausted {
            return Ok(&self.rows);
        }
        let missing = target - cached;
        self.state = CacheState::Fetching;
        match source
            .fetch_page(&self.table, missing, self.next_token.as_ref())
            .await
        {
            Ok(page) => {
                debug!(
                    table = %self.table,
                    requested = missing,
                    received = page.rows.len(),
                    "page appended"
                );
                self.rows.extend(page.rows);
                self.exhausted = page.next_token.is_none();
                self.next_token = page.next_token;
                self.state = CacheState::Ready;
                Ok(&self.rows)
            }
            Err(e) => {
                warn!(table = %self.table, error = %e, "page fetch failed");
                self.state = CacheState::Error(e.to_string());
                Err(e)
            }
        }
    }

    /// Writes one cell remotely, then applies it to the cached row.
    ///
    /// A regular column is addressed by the row's partition and clustering
    /// keys, a static column by its partition keys alone. Key columns cannot
    /// be edited. An empty string clears the cell. On remote failure the
    /// cached row is left untouched.
    pub async fn edit_cell<S: RowSource + ?Sized>(
        &mut self,
        source: &S,
        schema: &Table,
        row_index: usize,
        column: &str,
        value: Value,
    ) -> Result<()> {
        let value = match value {
            Value::String(s) if s.is_empty() => Value::Null,
            other => other,
        };
        let col = schema
            .get_column(column)
            .ok_or_else(|| ValidationError::UnknownColumn {
                table: schema.table_ref(),
                column: column.to_string(),
            })?;
        let mut keys = schema.partition_keys();
        match col.kind() {
            ColumnKind::Regular => keys.extend(schema.clustering_keys()),
            ColumnKind::Static => {}
            ColumnKind::PartitionKey => {
                return Err(ValidationError::CannotModifyPartitionKey {
                    table: schema.table_ref(),
                    column: column.to_string(),
                }
                .into())
            }
            ColumnKind::ClusteringKey => {
                return Err(ValidationError::CannotModifyClusteringKey {
                    table: schema.table_ref(),
                    column: column.to_string(),
                }
                .into())
            }
        }
        let cached = self.rows.get(row_index).ok_or_else(|| NotFoundError::Row {
            table: self.table.clone(),
            index: row_index,
        })?;

        let mut update = Row::new();
        for key in keys {
            let v = cached.get(key.name()).cloned().unwrap_or(Value::Null);
            update.insert(key.name().to_string(), v);
        }
        update.insert(column.to_string(), value.clone());

        source.update_row(&self.table, &update).await?;
        if let Some(row) = self.rows.get_mut(row_index) {
            row.insert(column.to_string(), value);
        }
        Ok(())
    }
}

/// Owns the cache of the table on screen; selecting another table starts over.
#[derive(Debug, Default)]
pub struct TableView {
    cache: Option<TableCache>,
}

impl TableView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, table: TableRef) -> &mut TableCache {
        let same = self.cache.as_ref().is_some_and(|c| c.table == table);
        if !same {
            debug!(%table, "viewed table changed; cache discarded");
            self.cache = Some(TableCache::new(table.clone()));
        }
        self.cache.get_or_insert_with(|| TableCache::new(table))
    }

    pub fn current(&self) -> Option<&TableCache> {
        self.cache.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut TableCache> {
        self.cache.as_mut()
    }
}
