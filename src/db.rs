use async_trait::async_trait;
use scylla::query::Query;
use scylla::statement::{PagingState, PagingStateResponse};
use scylla::{QueryResult, Session, SessionBuilder};
use tracing::{debug, info};

use crate::client::{ContinuationToken, CqlClient, Page, Row, Statement};
use crate::config::DbConfig;
use crate::error::BackendError;
use crate::value::row_to_json;

/// [`CqlClient`] over a shared scylla session.
pub struct ScyllaClient {
    session: Session,
}

impl ScyllaClient {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn connect(config: &DbConfig) -> anyhow::Result<Self> {
        info!(nodes = ?config.nodes, ssl = config.ssl, "connecting to scylla");
        let mut sb = SessionBuilder::new().known_nodes(&config.nodes);
        if let Some((user, pass)) = &config.credentials {
            sb = sb.user(user, pass);
        }
        if config.ssl {
            use openssl::ssl::{SslContext, SslMethod, SslVerifyMode};
            let mut ctx = SslContext::builder(SslMethod::tls())?;
            if let Some(ca_file) = &config.ca_bundle {
                ctx.set_ca_file(ca_file)?;
            }
            ctx.set_verify(if config.ssl_insecure {
                SslVerifyMode::NONE
            } else {
                SslVerifyMode::PEER
            });
            sb = sb.ssl_context(Some(ctx.build()));
        }
        let session = sb.build().await?;
        Ok(Self::new(session))
    }
}

fn rows_of(result: QueryResult) -> Vec<Row> {
    let specs = result.col_specs().to_owned();
    result
        .rows_or_empty()
        .iter()
        .map(|row| row_to_json(specs.iter().map(|s| s.name.as_str()), &row.columns))
        .collect()
}

fn encode_token(resp: &PagingStateResponse) -> Option<ContinuationToken> {
    match resp {
        PagingStateResponse::HasMorePages { state } => state
            .as_bytes_slice()
            .map(|arc| ContinuationToken::from_bytes(&arc[..])),
        PagingStateResponse::NoMorePages => None,
    }
}

fn decode_token(token: Option<&ContinuationToken>) -> Result<PagingState, BackendError> {
    match token {
        Some(tok) => tok
            .to_bytes()
            .map(PagingState::new_from_raw_bytes)
            .ok_or_else(|| BackendError::new("malformed continuation token", tok.as_str().to_string())),
        None => Ok(PagingState::start()),
    }
}

#[async_trait]
impl CqlClient for ScyllaClient {
    async fn query_all(&self, statement: &Statement) -> Result<Vec<Row>, BackendError> {
        let mut out = Vec::new();
        let mut paging_state = PagingState::start();
        loop {
            let (result, paging_resp) = self
                .session
                .query_single_page(statement.cql.as_str(), &statement.values[..], paging_state)
                .await
                .map_err(|e| BackendError::new("query failed", e))?;
            out.extend(rows_of(result));
            match paging_resp {
                PagingStateResponse::HasMorePages { state } => paging_state = state,
                PagingStateResponse::NoMorePages => break,
            }
        }
        debug!(cql = %statement.cql, rows = out.len(), "query_all");
        Ok(out)
    }

    async fn query_page(
        &self,
        statement: &Statement,
        page_size: i32,
        token: Option<&ContinuationToken>,
    ) -> Result<Page, BackendError> {
        let prepared = self
            .session
            .prepare(Query::new(statement.cql.clone()).with_page_size(page_size))
            .await
            .map_err(|e| BackendError::new("prepare failed", e))?;
        let paging_state = decode_token(token)?;
        let (result, paging_resp) = self
            .session
            .execute_single_page(&prepared, &statement.values[..], paging_state)
            .await
            .map_err(|e| BackendError::new("paged select failed", e))?;
        Ok(Page {
            rows: rows_of(result),
            next_token: encode_token(&paging_resp),
        })
    }

    async fn execute(&self, statement: &Statement) -> Result<(), BackendError> {
        let prepared = self
            .session
            .prepare(statement.cql.as_str())
            .await
            .map_err(|e| BackendError::new("prepare failed", e))?;
        self.session
            .execute_unpaged(&prepared, &statement.values[..])
            .await
            .map_err(|e| BackendError::new("statement failed", e))?;
        Ok(())
    }
}
