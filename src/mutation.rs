//! Schema-driven mutation synthesis.
//!
//! Turns a row payload (column name → JSON value) plus a table's metadata into
//! an INSERT, UPDATE, DELETE-row or DELETE-columns statement, enforcing the
//! primary key rules of wide-column tables:
//!
//! * partition key columns are always required to address a row and can never
//!   be set or deleted on their own;
//! * clustering key columns are required unless only static columns are
//!   touched, since static cells live at the partition level.
//!
//! A key absent from the payload means "not provided". JSON null is a provided
//! value (it binds CQL null) except on key columns, where it counts as missing.
//! Payload keys that are not columns of the table are ignored.

use scylla_cql::frame::response::result::CqlValue;
use serde_json::Value;
use tracing::debug;

use crate::client::{Row, Statement};
use crate::error::ValidationError;
use crate::model::{Column, ColumnKind, Table};
use crate::value::json_to_cql;

/// Payload entries bucketed by column role. Key buckets are in key position
/// order, data buckets in column name order.
#[derive(Debug, Default)]
struct Buckets<'a> {
    partition: Vec<(&'a Column, &'a Value)>,
    clustering: Vec<(&'a Column, &'a Value)>,
    statics: Vec<(&'a Column, &'a Value)>,
    regulars: Vec<(&'a Column, &'a Value)>,
}

impl<'a> Buckets<'a> {
    fn classify(table: &'a Table, payload: &'a Row) -> Self {
        let mut buckets = Buckets::default();
        for column in table.display_order() {
            let Some(value) = payload.get(column.name()) else {
                continue;
            };
            let bucket = match column.kind() {
                ColumnKind::PartitionKey => &mut buckets.partition,
                ColumnKind::ClusteringKey => &mut buckets.clustering,
                ColumnKind::Static => &mut buckets.statics,
                ColumnKind::Regular => &mut buckets.regulars,
            };
            bucket.push((column, value));
        }
        buckets
    }

    /// Static and regular columns being written.
    fn data(&self) -> Vec<(&'a Column, &'a Value)> {
        let mut data: Vec<_> = self.statics.iter().chain(self.regulars.iter()).copied().collect();
        data.sort_by(|a, b| a.0.name().cmp(b.0.name()));
        data
    }
}

fn is_provided(payload: &Row, column: &Column) -> bool {
    payload.get(column.name()).is_some_and(|v| !v.is_null())
}

/// Keywords CQL refuses as bare identifiers.
const RESERVED_WORDS: &[&str] = &[
    "add", "allow", "alter", "and", "apply", "asc", "authorize", "batch", "begin", "by",
    "columnfamily", "create", "default", "delete", "desc", "describe", "drop", "entries",
    "execute", "from", "full", "grant", "if", "in", "index", "infinity", "insert", "into",
    "is", "keyspace", "limit", "materialized", "mbean", "mbeans", "modify", "nan",
    "norecursive", "not", "null", "of", "on", "or", "order", "primary", "rename", "replace",
    "revoke", "schema", "select", "set", "table", "to", "token", "truncate", "unlogged",
    "unset", "update", "use", "using", "view", "where", "with",
];

/// Quotes an identifier unless it is a plain lower-case CQL name that is
/// not a reserved word.
pub fn quote_ident(ident: &str) -> String {
    let bytes = ident.as_bytes();
    let plain = bytes
        .first()
        .is_some_and(|c| c.is_ascii_lowercase() || *c == b'_')
        && bytes
            .iter()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == b'_')
        && !RESERVED_WORDS.contains(&ident);
    if plain {
        ident.to_string()
    } else {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}

pub fn qualified_name(table: &Table) -> String {
    format!("{}.{}", quote_ident(table.keyspace_name()), quote_ident(table.name()))
}

fn bind(table: &Table, column: &Column, value: &Value) -> Result<Option<CqlValue>, ValidationError> {
    json_to_cql(column.cql_type(), value).map_err(|reason| ValidationError::InvalidValue {
        table: table.table_ref(),
        column: column.name().to_string(),
        cql_type: column.cql_type().to_string(),
        reason,
    })
}

/// Builds the `a = ? AND b = ?` predicate addressing the rows to modify.
///
/// Partition keys are always required. Clustering keys are required and
/// included unless `only_static` is set, in which case the predicate stops at
/// the partition.
fn identifying_predicate(
    table: &Table,
    payload: &Row,
    only_static: bool,
) -> Result<(String, Vec<Option<CqlValue>>), ValidationError> {
    let mut identifying = table.partition_keys();
    if !only_static {
        identifying.extend(table.clustering_keys());
    }
    let mut terms = Vec::with_capacity(identifying.len());
    let mut values = Vec::with_capacity(identifying.len());
    for column in identifying {
        let value = match payload.get(column.name()) {
            Some(v) if !v.is_null() => v,
            _ => {
                return Err(ValidationError::MissingIdentifyingColumn {
                    table: table.table_ref(),
                    column: column.name().to_string(),
                    role: column.kind(),
                })
            }
        };
        terms.push(format!("{} = ?", quote_ident(column.name())));
        values.push(bind(table, column, value)?);
    }
    Ok((terms.join(" AND "), values))
}

/// INSERT of every column the payload provides. All partition and clustering
/// key columns of the table must carry a value.
pub fn insert(table: &Table, payload: &Row) -> Result<Statement, ValidationError> {
    for column in table
        .partition_keys()
        .into_iter()
        .chain(table.clustering_keys())
    {
        if !is_provided(payload, column) {
            return Err(ValidationError::MissingPrimaryKeyColumn {
                table: table.table_ref(),
                column: column.name().to_string(),
                role: column.kind(),
            });
        }
    }

    let buckets = Buckets::classify(table, payload);
    let mut provided = buckets.partition.clone();
    provided.extend(buckets.clustering.iter().copied());
    provided.extend(buckets.data());

    let mut names = Vec::with_capacity(provided.len());
    let mut values = Vec::with_capacity(provided.len());
    for (column, value) in provided {
        names.push(quote_ident(column.name()));
        values.push(bind(table, column, value)?);
    }
    let placeholders = vec!["?"; names.len()].join(", ");
    let cql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualified_name(table),
        names.join(", "),
        placeholders
    );
    debug!(%cql, "synthesized insert");
    Ok(Statement::with_values(cql, values))
}

/// UPDATE of the static and regular columns the payload provides.
///
/// When no regular column is written the update is static-only and is
/// addressed by partition key alone; clustering values in the payload are then
/// ignored.
pub fn update(table: &Table, payload: &Row) -> Result<Statement, ValidationError> {
    let buckets = Buckets::classify(table, payload);
    let data = buckets.data();
    if data.is_empty() {
        return Err(ValidationError::NoColumnsToUpdate {
            table: table.table_ref(),
        });
    }
    let only_static = buckets.regulars.is_empty();

    let mut assignments = Vec::with_capacity(data.len());
    let mut values = Vec::with_capacity(data.len());
    for (column, value) in data {
        assignments.push(format!("{} = ?", quote_ident(column.name())));
        values.push(bind(table, column, value)?);
    }
    let (predicate, id_values) = identifying_predicate(table, payload, only_static)?;
    values.extend(id_values);

    let cql = format!(
        "UPDATE {} SET {} WHERE {}",
        qualified_name(table),
        assignments.join(", "),
        predicate
    );
    debug!(%cql, only_static, "synthesized update");
    Ok(Statement::with_values(cql, values))
}

/// DELETE of the whole row addressed by the full primary key.
pub fn delete_row(table: &Table, payload: &Row) -> Result<Statement, ValidationError> {
    let (predicate, values) = identifying_predicate(table, payload, false)?;
    let cql = format!("DELETE FROM {} WHERE {}", qualified_name(table), predicate);
    debug!(%cql, "synthesized row delete");
    Ok(Statement::with_values(cql, values))
}

/// DELETE of the named columns. Only static and regular columns can be
/// deleted; deleting statics alone is addressed by partition key.
pub fn delete_columns<S: AsRef<str>>(
    table: &Table,
    columns: &[S],
    payload: &Row,
) -> Result<Statement, ValidationError> {
    let mut targets: Vec<&Column> = Vec::with_capacity(columns.len());
    for name in columns {
        let name = name.as_ref();
        let column = table
            .get_column(name)
            .ok_or_else(|| ValidationError::UnknownColumn {
                table: table.table_ref(),
                column: name.to_string(),
            })?;
        match column.kind() {
            ColumnKind::PartitionKey => {
                return Err(ValidationError::CannotModifyPartitionKey {
                    table: table.table_ref(),
                    column: name.to_string(),
                })
            }
            ColumnKind::ClusteringKey => {
                return Err(ValidationError::CannotModifyClusteringKey {
                    table: table.table_ref(),
                    column: name.to_string(),
                })
            }
            ColumnKind::Static | ColumnKind::Regular => {}
        }
        if !targets.iter().any(|t| t.name() == column.name()) {
            targets.push(column);
        }
    }
    if targets.is_empty() {
        return Err(ValidationError::NoColumnsToUpdate {
            table: table.table_ref(),
        });
    }
    let only_static = targets.iter().all(|c| c.kind() != ColumnKind::Regular);
    let (predicate, values) = identifying_predicate(table, payload, only_static)?;

    let names: Vec<String> = targets.iter().map(|c| quote_ident(c.name())).collect();
    let cql = format!(
        "DELETE {} FROM {} WHERE {}",
        names.join(", "),
        qualified_name(table),
        predicate
    );
    debug!(%cql, only_static, "synthesized column delete");
    Ok(Statement::with_values(cql, values))
}
