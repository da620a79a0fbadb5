//! [`RowSource`] backed by a running admin server, for clients living in
//! another process.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::cache::RowSource;
use crate::client::{ContinuationToken, Page, Row};
use crate::error::{BackendError, Error, Result};
use crate::model::TableRef;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageBody {
    #[serde(default)]
    data: Vec<Row>,
    next_token: Option<ContinuationToken>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

pub struct HttpRowSource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRowSource {
    /// `base_url` is the server root, e.g. `http://localhost:8080`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn table_url(&self, table: &TableRef) -> String {
        format!("{}/api/{}/{}", self.base_url, table.keyspace, table.table)
    }
}

fn transport(e: reqwest::Error) -> Error {
    BackendError::new("admin endpoint unreachable", e).into()
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or(text);
    Err(Error::Remote {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl RowSource for HttpRowSource {
    async fn fetch_page(
        &self,
        table: &TableRef,
        size: usize,
        token: Option<&ContinuationToken>,
    ) -> Result<Page> {
        let mut query = vec![("fetchSize", size.to_string())];
        if let Some(t) = token {
            query.push(("nextToken", t.as_str().to_string()));
        }
        let resp = self
            .http
            .get(self.table_url(table))
            .query(&query)
            .send()
            .await
            .map_err(transport)?;
        let body: PageBody = check(resp).await?.json().await.map_err(transport)?;
        debug!(%table, rows = body.data.len(), "remote page received");
        Ok(Page {
            rows: body.data,
            next_token: body.next_token,
        })
    }

    async fn update_row(&self, table: &TableRef, row: &Row) -> Result<()> {
        let resp = self
            .http
            .put(self.table_url(table))
            .json(row)
            .send()
            .await
            .map_err(transport)?;
        check(resp).await?;
        Ok(())
    }
}
