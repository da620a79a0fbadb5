//! Builds a [`Cluster`] from the `system_schema` introspection tables.
//!
//! Steps run in order because each one attaches to what the previous one
//! created: keyspaces, tables, columns, then one index lookup per table issued
//! concurrently. Any failure aborts the whole load; nothing is published.

use std::sync::Arc;

use scylla_cql::frame::response::result::CqlValue;
use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::client::{CqlClient, Row, Statement};
use crate::error::{BackendError, LoadStep, ReloadFailure};
use crate::model::{Cluster, Column, ColumnKind, Keyspace, SchemaCache, Table, TableRef};

const KEYSPACES_CQL: &str = "SELECT keyspace_name FROM system_schema.keyspaces";
const TABLES_CQL: &str = "SELECT keyspace_name, table_name FROM system_schema.tables";
const COLUMNS_CQL: &str =
    "SELECT keyspace_name, table_name, column_name, kind, position, type FROM system_schema.columns";
const INDEXES_CQL: &str =
    "SELECT index_name, kind, options FROM system_schema.indexes WHERE keyspace_name = ? AND table_name = ?";

/// Custom index implementations that accept full-text search predicates.
pub const SEARCH_INDEX_CLASSES: &[&str] = &["org.elassandra.index.ExtendedElasticSecondaryIndex"];

pub struct SchemaLoader<'a, C: ?Sized> {
    client: &'a C,
    cluster: Cluster,
}

fn text<'r>(row: &'r Row, column: &str) -> Option<&'r str> {
    row.get(column).and_then(Value::as_str)
}

fn failed(step: LoadStep) -> impl FnOnce(BackendError) -> ReloadFailure {
    move |source| ReloadFailure::Query { step, source }
}

impl<'a, C: CqlClient + ?Sized> SchemaLoader<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            cluster: Cluster::new(),
        }
    }

    pub async fn load_keyspaces(&mut self) -> Result<(), ReloadFailure> {
        let rows = self
            .client
            .query_all(&Statement::new(KEYSPACES_CQL))
            .await
            .map_err(failed(LoadStep::Keyspaces))?;
        for row in &rows {
            if let Some(name) = text(row, "keyspace_name") {
                self.cluster.add_keyspace(Keyspace::new(name));
            }
        }
        debug!(keyspaces = rows.len(), "loaded keyspaces");
        Ok(())
    }

    pub async fn load_tables(&mut self) -> Result<(), ReloadFailure> {
        let rows = self
            .client
            .query_all(&Statement::new(TABLES_CQL))
            .await
            .map_err(failed(LoadStep::Tables))?;
        for row in &rows {
            let (Some(ks), Some(name)) = (text(row, "keyspace_name"), text(row, "table_name")) else {
                continue;
            };
            match self.cluster.get_keyspace_mut(ks) {
                Some(keyspace) => keyspace.add_table(Table::new(ks, name)),
                None => warn!(keyspace = %ks, table = %name, "table of unknown keyspace skipped"),
            }
        }
        debug!(tables = rows.len(), "loaded tables");
        Ok(())
    }

    pub async fn load_columns(&mut self) -> Result<(), ReloadFailure> {
        let rows = self
            .client
            .query_all(&Statement::new(COLUMNS_CQL))
            .await
            .map_err(failed(LoadStep::Columns))?;
        for row in &rows {
            let (Some(ks), Some(tb), Some(name)) = (
                text(row, "keyspace_name"),
                text(row, "table_name"),
                text(row, "column_name"),
            ) else {
                continue;
            };
            let kind_tag = text(row, "kind").unwrap_or("regular");
            let kind: ColumnKind =
                kind_tag
                    .parse()
                    .map_err(|kind| ReloadFailure::UnknownColumnKind {
                        table: TableRef::new(ks, tb),
                        column: name.to_string(),
                        kind,
                    })?;
            let position = match kind {
                ColumnKind::PartitionKey | ColumnKind::ClusteringKey => {
                    let raw = row.get("position").and_then(Value::as_i64).unwrap_or(-1);
                    i32::try_from(raw).map_err(|_| ReloadFailure::InconsistentTable {
                        table: TableRef::new(ks, tb),
                        reason: format!("position {} of column '{}' is out of range", raw, name),
                    })?
                }
                ColumnKind::Static | ColumnKind::Regular => -1,
            };
            let cql_type = text(row, "type").unwrap_or_default();
            match self
                .cluster
                .get_keyspace_mut(ks)
                .and_then(|k| k.get_table_mut(tb))
            {
                Some(table) => table.add_column(Column::new(name, cql_type, kind, position)),
                None => warn!(keyspace = %ks, table = %tb, column = %name, "column of unknown table skipped"),
            }
        }
        debug!(columns = rows.len(), "loaded columns");
        Ok(())
    }

    /// One lookup per table, all in flight at once. Flags are applied only
    /// once every lookup has succeeded.
    pub async fn load_indexes(&mut self) -> Result<(), ReloadFailure> {
        let targets: Vec<TableRef> = self.cluster.tables().map(Table::table_ref).collect();
        let statements: Vec<Statement> = targets
            .iter()
            .map(|t| {
                Statement::with_values(
                    INDEXES_CQL,
                    vec![
                        Some(CqlValue::Text(t.keyspace.clone())),
                        Some(CqlValue::Text(t.table.clone())),
                    ],
                )
            })
            .collect();
        let results = self
            .client
            .query_each(&statements)
            .await
            .map_err(failed(LoadStep::Indexes))?;

        let mut indexed = 0usize;
        for (target, rows) in targets.iter().zip(results) {
            if !rows.iter().any(is_search_index) {
                continue;
            }
            if let Some(table) = self
                .cluster
                .get_keyspace_mut(&target.keyspace)
                .and_then(|k| k.get_table_mut(&target.table))
            {
                table.set_search_indexed(true);
                indexed += 1;
            }
        }
        debug!(tables = targets.len(), indexed, "loaded indexes");
        Ok(())
    }

    fn check_invariants(&self) -> Result<(), ReloadFailure> {
        for table in self.cluster.tables() {
            table
                .check_key_layout()
                .map_err(|reason| ReloadFailure::InconsistentTable {
                    table: table.table_ref(),
                    reason,
                })?;
        }
        Ok(())
    }

    /// Runs every step against an empty cluster and returns it.
    pub async fn load_all(mut self) -> Result<Cluster, ReloadFailure> {
        self.cluster.clear();
        self.load_keyspaces().await?;
        self.load_tables().await?;
        self.load_columns().await?;
        self.load_indexes().await?;
        self.check_invariants()?;
        Ok(self.cluster)
    }
}

/// An index row is a search index when it is CUSTOM and its implementation
/// class is one of [`SEARCH_INDEX_CLASSES`].
pub fn is_search_index(row: &Row) -> bool {
    let custom = text(row, "kind").is_some_and(|k| k.eq_ignore_ascii_case("custom"));
    let class = row
        .get("options")
        .and_then(|o| o.get("class_name"))
        .and_then(Value::as_str);
    custom && class.is_some_and(|c| SEARCH_INDEX_CLASSES.contains(&c))
}

/// Loads a fresh cluster and publishes it. On failure the current snapshot
/// stays published.
pub async fn reload<C: CqlClient + ?Sized>(
    client: &C,
    cache: &SchemaCache,
) -> Result<Arc<Cluster>, ReloadFailure> {
    let _guard = cache.lock_reload().await;
    let span = info_span!("schema_reload");
    async {
        let cluster = SchemaLoader::new(client).load_all().await.map_err(|e| {
            warn!(error = %e, "schema reload failed; keeping previous snapshot");
            e
        })?;
        info!(
            keyspaces = cluster.keyspaces().count(),
            tables = cluster.tables().count(),
            "schema loaded"
        );
        Ok(cache.publish(cluster).await)
    }
    .instrument(span)
    .await
}
