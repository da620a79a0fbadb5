//! Request-level façade over the schema snapshot and the database client.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, info_span, Instrument};

use crate::cache::RowSource;
use crate::client::{ContinuationToken, CqlClient, Page, Row, Statement};
use crate::error::{Result, ValidationError};
use crate::loader;
use crate::model::{Cluster, Keyspace, SchemaCache, Table, TableRef};
use crate::mutation;
use crate::rows::{self, PageRequest};

pub struct Admin<C: ?Sized> {
    client: Arc<C>,
    schema: SchemaCache,
}

impl<C: CqlClient + ?Sized> Admin<C> {
    /// Starts with an empty schema; call [`Admin::reload`] before serving.
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            schema: SchemaCache::default(),
        }
    }

    pub fn with_schema(client: Arc<C>, cluster: Cluster) -> Self {
        Self {
            client,
            schema: SchemaCache::new(cluster),
        }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn schema_cache(&self) -> &SchemaCache {
        &self.schema
    }

    pub async fn schema(&self) -> Arc<Cluster> {
        self.schema.snapshot().await
    }

    pub async fn reload(&self) -> Result<Arc<Cluster>> {
        Ok(loader::reload(self.client.as_ref(), &self.schema).await?)
    }

    pub async fn keyspace(&self, keyspace: &str) -> Result<Keyspace> {
        let cluster = self.schema().await;
        Ok(cluster.resolve_keyspace(keyspace)?.clone())
    }

    pub async fn table(&self, keyspace: &str, table: &str) -> Result<Table> {
        let cluster = self.schema().await;
        Ok(cluster.resolve_table(keyspace, table)?.clone())
    }

    pub async fn read_rows(
        &self,
        keyspace: &str,
        table: &str,
        request: &PageRequest,
    ) -> Result<Page> {
        let cluster = self.schema().await;
        let table = cluster.resolve_table(keyspace, table)?;
        rows::read_page(self.client.as_ref(), table, request).await
    }

    async fn mutate<F>(&self, keyspace: &str, table: &str, op: &'static str, build: F) -> Result<()>
    where
        F: FnOnce(&Table) -> Result<Statement, ValidationError>,
    {
        let cluster = self.schema().await;
        let table = cluster.resolve_table(keyspace, table)?;
        let statement = build(table)?;
        let span = info_span!("mutation", op, table = %table.table_ref());
        self.client.execute(&statement).instrument(span).await?;
        info!(op, table = %table.table_ref(), "mutation applied");
        Ok(())
    }

    pub async fn insert_row(&self, keyspace: &str, table: &str, row: &Row) -> Result<String> {
        self.mutate(keyspace, table, "insert", |t| mutation::insert(t, row))
            .await?;
        Ok("One row inserted or updated".to_string())
    }

    pub async fn update_row(&self, keyspace: &str, table: &str, row: &Row) -> Result<String> {
        self.mutate(keyspace, table, "update", |t| mutation::update(t, row))
            .await?;
        Ok("One row inserted or updated".to_string())
    }

    pub async fn delete_row(&self, keyspace: &str, table: &str, row: &Row) -> Result<String> {
        self.mutate(keyspace, table, "delete", |t| mutation::delete_row(t, row))
            .await?;
        Ok("One row deleted".to_string())
    }

    pub async fn delete_columns<S: AsRef<str> + Sync>(
        &self,
        keyspace: &str,
        table: &str,
        columns: &[S],
        row: &Row,
    ) -> Result<String> {
        self.mutate(keyspace, table, "delete_columns", |t| {
            mutation::delete_columns(t, columns, row)
        })
        .await?;
        let deleted: HashSet<&str> = columns.iter().map(AsRef::as_ref).collect();
        Ok(format!("{} column(s) deleted", deleted.len()))
    }
}

/// In-process row source: the paging cache reads straight from the service.
#[async_trait]
impl<C: CqlClient + ?Sized> RowSource for Admin<C> {
    async fn fetch_page(
        &self,
        table: &TableRef,
        size: usize,
        token: Option<&ContinuationToken>,
    ) -> Result<Page> {
        let request = PageRequest::new(i32::try_from(size).unwrap_or(i32::MAX)).after(token.cloned());
        self.read_rows(&table.keyspace, &table.table, &request).await
    }

    async fn update_row(&self, table: &TableRef, row: &Row) -> Result<()> {
        Admin::update_row(self, &table.keyspace, &table.table, row).await?;
        Ok(())
    }
}
