//! In-memory cluster metadata: cluster → keyspace → table → column.
//!
//! A [`Cluster`] is built once by the schema loader and then published as an
//! immutable snapshot through [`SchemaCache`]. Readers hold an `Arc<Cluster>`
//! and never see a reload in progress.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::error::NotFoundError;

/// Role of a column in the table's primary key structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    PartitionKey,
    #[serde(rename = "clustering")]
    ClusteringKey,
    Static,
    Regular,
}

impl ColumnKind {
    pub fn is_primary_key(self) -> bool {
        matches!(self, ColumnKind::PartitionKey | ColumnKind::ClusteringKey)
    }

    /// Tag used by `system_schema.columns.kind`.
    pub fn as_schema_str(self) -> &'static str {
        match self {
            ColumnKind::PartitionKey => "partition_key",
            ColumnKind::ClusteringKey => "clustering",
            ColumnKind::Static => "static",
            ColumnKind::Regular => "regular",
        }
    }

    fn display_rank(self) -> u8 {
        match self {
            ColumnKind::PartitionKey => 0,
            ColumnKind::ClusteringKey => 1,
            ColumnKind::Regular => 2,
            ColumnKind::Static => 3,
        }
    }
}

impl FromStr for ColumnKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "partition_key" => Ok(ColumnKind::PartitionKey),
            "clustering" => Ok(ColumnKind::ClusteringKey),
            "static" => Ok(ColumnKind::Static),
            "regular" => Ok(ColumnKind::Regular),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ColumnKind::PartitionKey => "partition key",
            ColumnKind::ClusteringKey => "clustering key",
            ColumnKind::Static => "static",
            ColumnKind::Regular => "regular",
        })
    }
}

/// `keyspace.table` identity, carried by errors and row sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableRef {
    pub keyspace: String,
    pub table: String,
}

impl TableRef {
    pub fn new(keyspace: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.keyspace, self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    name: String,
    #[serde(rename = "type")]
    cql_type: String,
    kind: ColumnKind,
    position: i32,
}

impl Column {
    /// `position` is the ordinal inside the partition or clustering key, -1 otherwise.
    pub fn new(
        name: impl Into<String>,
        cql_type: impl Into<String>,
        kind: ColumnKind,
        position: i32,
    ) -> Self {
        Self {
            name: name.into(),
            cql_type: cql_type.into(),
            kind,
            position,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cql_type(&self) -> &str {
        &self.cql_type
    }

    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    pub fn position(&self) -> i32 {
        self.position
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    keyspace_name: String,
    name: String,
    search_indexed: bool,
    columns: BTreeMap<String, Column>,
}

impl Table {
    pub fn new(keyspace_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            keyspace_name: keyspace_name.into(),
            name: name.into(),
            search_indexed: false,
            columns: BTreeMap::new(),
        }
    }

    pub fn keyspace_name(&self) -> &str {
        &self.keyspace_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef::new(&self.keyspace_name, &self.name)
    }

    pub fn search_indexed(&self) -> bool {
        self.search_indexed
    }

    pub fn set_search_indexed(&mut self, indexed: bool) {
        self.search_indexed = indexed;
    }

    pub fn add_column(&mut self, column: Column) {
        self.columns.insert(column.name.clone(), column);
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Columns ordered by name.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.values()
    }

    /// Columns of one role; key columns come back in key position order.
    pub fn columns_of(&self, kind: ColumnKind) -> Vec<&Column> {
        let mut cols: Vec<&Column> = self.columns.values().filter(|c| c.kind == kind).collect();
        if kind.is_primary_key() {
            cols.sort_by_key(|c| c.position);
        }
        cols
    }

    pub fn partition_keys(&self) -> Vec<&Column> {
        self.columns_of(ColumnKind::PartitionKey)
    }

    pub fn clustering_keys(&self) -> Vec<&Column> {
        self.columns_of(ColumnKind::ClusteringKey)
    }

    /// Grid order: partition keys, clustering keys, regular, static.
    pub fn display_order(&self) -> Vec<&Column> {
        let mut cols: Vec<&Column> = self.columns.values().collect();
        cols.sort_by(|a, b| {
            a.kind
                .display_rank()
                .cmp(&b.kind.display_rank())
                .then_with(|| {
                    if a.kind.is_primary_key() {
                        a.position.cmp(&b.position)
                    } else {
                        a.name.cmp(&b.name)
                    }
                })
        });
        cols
    }

    /// Checks the primary key invariants: at least one partition key, and
    /// positions 0..n without gaps inside each key role.
    pub fn check_key_layout(&self) -> Result<(), String> {
        let partition = self.partition_keys();
        if partition.is_empty() {
            return Err("no partition key column".to_string());
        }
        for (kind, cols) in [
            (ColumnKind::PartitionKey, partition),
            (ColumnKind::ClusteringKey, self.clustering_keys()),
        ] {
            for (expected, col) in cols.iter().enumerate() {
                if col.position != expected as i32 {
                    return Err(format!(
                        "{} column '{}' has position {}, expected {}",
                        kind, col.name, col.position, expected
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Keyspace {
    name: String,
    tables: BTreeMap<String, Table>,
}

impl Keyspace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attaches `table`, rewriting its back-reference to this keyspace.
    pub fn add_table(&mut self, mut table: Table) {
        table.keyspace_name = self.name.clone();
        self.tables.insert(table.name.clone(), table);
    }

    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn get_table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn tables_mut(&mut self) -> impl Iterator<Item = &mut Table> {
        self.tables.values_mut()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Cluster {
    keyspaces: BTreeMap<String, Keyspace>,
}

impl Cluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.keyspaces.clear();
    }

    pub fn add_keyspace(&mut self, keyspace: Keyspace) {
        self.keyspaces.insert(keyspace.name.clone(), keyspace);
    }

    pub fn get_keyspace(&self, name: &str) -> Option<&Keyspace> {
        self.keyspaces.get(name)
    }

    pub fn get_keyspace_mut(&mut self, name: &str) -> Option<&mut Keyspace> {
        self.keyspaces.get_mut(name)
    }

    pub fn keyspaces(&self) -> impl Iterator<Item = &Keyspace> {
        self.keyspaces.values()
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.keyspaces.values().flat_map(|ks| ks.tables())
    }

    pub fn tables_mut(&mut self) -> impl Iterator<Item = &mut Table> {
        self.keyspaces.values_mut().flat_map(|ks| ks.tables_mut())
    }

    pub fn is_empty(&self) -> bool {
        self.keyspaces.is_empty()
    }

    pub fn resolve_keyspace(&self, name: &str) -> Result<&Keyspace, NotFoundError> {
        self.get_keyspace(name)
            .ok_or_else(|| NotFoundError::Keyspace(name.to_string()))
    }

    pub fn resolve_table(&self, keyspace: &str, table: &str) -> Result<&Table, NotFoundError> {
        self.resolve_keyspace(keyspace)?
            .get_table(table)
            .ok_or_else(|| NotFoundError::Table(TableRef::new(keyspace, table)))
    }
}

/// Published schema snapshot.
///
/// Lookups clone the current `Arc<Cluster>`; a reload swaps the pointer once
/// the replacement is complete. Reloads are serialized through `reload_lock`.
#[derive(Debug, Default)]
pub struct SchemaCache {
    current: RwLock<Arc<Cluster>>,
    reload_lock: Mutex<()>,
}

impl SchemaCache {
    pub fn new(cluster: Cluster) -> Self {
        Self {
            current: RwLock::new(Arc::new(cluster)),
            reload_lock: Mutex::new(()),
        }
    }

    pub async fn snapshot(&self) -> Arc<Cluster> {
        self.current.read().await.clone()
    }

    pub async fn publish(&self, cluster: Cluster) -> Arc<Cluster> {
        let next = Arc::new(cluster);
        *self.current.write().await = next.clone();
        next
    }

    pub async fn clear(&self) {
        self.publish(Cluster::new()).await;
    }

    /// Held for the duration of a reload so two reloads never interleave.
    pub async fn lock_reload(&self) -> MutexGuard<'_, ()> {
        self.reload_lock.lock().await
    }
}
