//! Error types shared by the schema loader, the mutation synthesizer, the
//! row reader and the client-side paging cache.

use std::fmt;

use thiserror::Error;

use crate::model::{ColumnKind, TableRef};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error returned by the admin service.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Reload(#[from] ReloadFailure),

    /// Failure reported by a remote admin endpoint (HTTP row source).
    #[error("remote endpoint returned {status}: {message}")]
    Remote { status: u16, message: String },
}

impl Error {
    /// HTTP-equivalent status class of this error.
    pub fn status(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            Error::Backend(_) | Error::Reload(_) => 500,
            Error::Remote { status, .. } => *status,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(e) => e.code(),
            Error::NotFound(_) => "NOT_FOUND",
            Error::Backend(_) => "BACKEND_ERROR",
            Error::Reload(_) => "RELOAD_FAILURE",
            Error::Remote { .. } => "REMOTE_ERROR",
        }
    }
}

/// Payload problems. Never retried; surfaced to the caller as a 400.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing {role} column '{column}' in {table}")]
    MissingPrimaryKeyColumn {
        table: TableRef,
        column: String,
        role: ColumnKind,
    },

    #[error("missing {role} column '{column}' required to address rows of {table}")]
    MissingIdentifyingColumn {
        table: TableRef,
        column: String,
        role: ColumnKind,
    },

    #[error("the request contains no column to update on {table}")]
    NoColumnsToUpdate { table: TableRef },

    #[error("unknown column name '{column}' in {table}")]
    UnknownColumn { table: TableRef, column: String },

    #[error("can't modify partition key column '{column}' of {table}")]
    CannotModifyPartitionKey { table: TableRef, column: String },

    #[error("can't modify clustering key column '{column}' of {table}")]
    CannotModifyClusteringKey { table: TableRef, column: String },

    #[error("invalid value for column '{column}' ({cql_type}) of {table}: {reason}")]
    InvalidValue {
        table: TableRef,
        column: String,
        cql_type: String,
        reason: String,
    },

    #[error("search unsupported on {table}")]
    SearchUnsupported { table: TableRef },

    #[error("invalid page size {size} for {table}")]
    InvalidPageSize { table: TableRef, size: i64 },

    #[error("malformed continuation token for {table}")]
    MalformedToken { table: TableRef },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MissingPrimaryKeyColumn { .. } => "MISSING_PRIMARY_KEY_COLUMN",
            ValidationError::MissingIdentifyingColumn { .. } => "MISSING_IDENTIFYING_COLUMN",
            ValidationError::NoColumnsToUpdate { .. } => "NO_COLUMNS_TO_UPDATE",
            ValidationError::UnknownColumn { .. } => "UNKNOWN_COLUMN",
            ValidationError::CannotModifyPartitionKey { .. } => "CANNOT_MODIFY_PARTITION_KEY",
            ValidationError::CannotModifyClusteringKey { .. } => "CANNOT_MODIFY_CLUSTERING_KEY",
            ValidationError::InvalidValue { .. } => "INVALID_VALUE",
            ValidationError::SearchUnsupported { .. } => "SEARCH_UNSUPPORTED",
            ValidationError::InvalidPageSize { .. } => "INVALID_PAGE_SIZE",
            ValidationError::MalformedToken { .. } => "MALFORMED_TOKEN",
        }
    }

    pub fn table(&self) -> &TableRef {
        match self {
            ValidationError::MissingPrimaryKeyColumn { table, .. }
            | ValidationError::MissingIdentifyingColumn { table, .. }
            | ValidationError::NoColumnsToUpdate { table }
            | ValidationError::UnknownColumn { table, .. }
            | ValidationError::CannotModifyPartitionKey { table, .. }
            | ValidationError::CannotModifyClusteringKey { table, .. }
            | ValidationError::InvalidValue { table, .. }
            | ValidationError::SearchUnsupported { table }
            | ValidationError::InvalidPageSize { table, .. }
            | ValidationError::MalformedToken { table } => table,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotFoundError {
    #[error("the requested keyspace '{0}' couldn't be found")]
    Keyspace(String),

    #[error("the requested table '{0}' couldn't be found")]
    Table(TableRef),

    #[error("row {index} is not cached for {table}")]
    Row { table: TableRef, index: usize },
}

/// Failure of the database client. The driver error is kept as `source`.
#[derive(Debug, Error)]
#[error("{context}: {source}")]
pub struct BackendError {
    pub context: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl BackendError {
    pub fn new(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Raw driver message, forwarded to API clients.
    pub fn cause(&self) -> String {
        self.source.to_string()
    }
}

/// Step of a schema reload, used to report where it aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStep {
    Keyspaces,
    Tables,
    Columns,
    Indexes,
}

impl fmt::Display for LoadStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoadStep::Keyspaces => "keyspaces",
            LoadStep::Tables => "tables",
            LoadStep::Columns => "columns",
            LoadStep::Indexes => "indexes",
        })
    }
}

#[derive(Debug, Error)]
pub enum ReloadFailure {
    #[error("schema reload failed while loading {step}: {source}")]
    Query {
        step: LoadStep,
        #[source]
        source: BackendError,
    },

    #[error("unknown column kind '{kind}' for column '{column}' of {table}")]
    UnknownColumnKind {
        table: TableRef,
        column: String,
        kind: String,
    },

    #[error("table {table} has inconsistent key metadata: {reason}")]
    InconsistentTable { table: TableRef, reason: String },
}
