//! REST surface over [`Admin`], mounted under `/api`.

use std::sync::Arc;

use std::fmt;

use actix_web::error::InternalError;
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use serde::Deserialize;
use serde_json::json;

use crate::client::{ContinuationToken, CqlClient, Row};
use crate::config::DEFAULT_BODY_LIMIT;
use crate::error::Error;
use crate::rows::PageRequest;
use crate::server::server_info;
use crate::service::Admin;

pub struct AppState {
    pub admin: Admin<dyn CqlClient>,
    pub default_fetch_size: i32,
}

impl AppState {
    pub fn new(client: Arc<dyn CqlClient>, default_fetch_size: i32) -> Self {
        Self {
            admin: Admin::new(client),
            default_fetch_size,
        }
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = json!({
            "errorCode": self.status(),
            "error": self.code(),
            "message": self.to_string(),
        });
        if let Error::Backend(e) = self {
            body["message"] = json!("Cassandra driver returned an error");
            body["cassandraError"] = json!(e.cause());
        }
        HttpResponse::build(self.status_code()).json(body)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadParams {
    pub next_token: Option<String>,
    pub fetch_size: Option<i32>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub columns: Option<String>,
}

type Data = web::Data<AppState>;
type TablePath = web::Path<(String, String)>;

async fn index() -> HttpResponse {
    let info = server_info();
    HttpResponse::Ok().json(json!({ "name": info.name, "version": info.version }))
}

async fn get_schema(state: Data) -> HttpResponse {
    HttpResponse::Ok().json(&*state.admin.schema().await)
}

async fn reload_schema(state: Data) -> Result<HttpResponse, Error> {
    let cluster = state.admin.reload().await?;
    Ok(HttpResponse::Ok().json(&*cluster))
}

async fn get_keyspace(state: Data, path: web::Path<String>) -> Result<HttpResponse, Error> {
    let keyspace = state.admin.keyspace(&path).await?;
    Ok(HttpResponse::Ok().json(keyspace))
}

async fn get_table(state: Data, path: TablePath) -> Result<HttpResponse, Error> {
    let (keyspace, table) = path.into_inner();
    let table = state.admin.table(&keyspace, &table).await?;
    Ok(HttpResponse::Ok().json(table))
}

async fn read_rows(
    state: Data,
    path: TablePath,
    params: web::Query<ReadParams>,
) -> Result<HttpResponse, Error> {
    let (keyspace, table) = path.into_inner();
    let params = params.into_inner();
    let mut request = PageRequest::new(params.fetch_size.unwrap_or(state.default_fetch_size))
        .after(params.next_token.filter(|t| !t.is_empty()).map(ContinuationToken::new));
    if let Some(search) = params.search.filter(|s| !s.is_empty()) {
        request = request.search(search);
    }
    let page = state.admin.read_rows(&keyspace, &table, &request).await?;
    Ok(HttpResponse::Ok().json(json!({
        "nextToken": page.next_token,
        "data": page.rows,
    })))
}

fn message(text: String) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "message": text }))
}

async fn insert_row(state: Data, path: TablePath, body: web::Json<Row>) -> Result<HttpResponse, Error> {
    let (keyspace, table) = path.into_inner();
    Ok(message(state.admin.insert_row(&keyspace, &table, &body).await?))
}

async fn update_row(state: Data, path: TablePath, body: web::Json<Row>) -> Result<HttpResponse, Error> {
    let (keyspace, table) = path.into_inner();
    Ok(message(state.admin.update_row(&keyspace, &table, &body).await?))
}

async fn delete_row(
    state: Data,
    path: TablePath,
    params: web::Query<DeleteParams>,
    body: web::Json<Row>,
) -> Result<HttpResponse, Error> {
    let (keyspace, table) = path.into_inner();
    match params.into_inner().columns {
        Some(columns) => {
            let columns: Vec<&str> = columns.split(',').map(str::trim).filter(|c| !c.is_empty()).collect();
            let text = state
                .admin
                .delete_columns(&keyspace, &table, &columns, &body)
                .await?;
            Ok(message(text))
        }
        None => Ok(message(state.admin.delete_row(&keyspace, &table, &body).await?)),
    }
}

/// Rejects a request whose body or query string could not be decoded, with
/// the same body shape as [`Error`] responses.
fn malformed_request<E>(code: &'static str, err: E) -> actix_web::Error
where
    E: fmt::Debug + fmt::Display + 'static,
{
    let response = HttpResponse::BadRequest().json(json!({
        "errorCode": StatusCode::BAD_REQUEST.as_u16(),
        "error": code,
        "message": err.to_string(),
    }));
    InternalError::from_response(err, response).into()
}

/// Registers every route; mount with `App::new().configure(api::configure)`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    routes(cfg, DEFAULT_BODY_LIMIT);
}

/// Same as [`configure`] with a custom JSON body limit.
pub fn configure_with_limit(body_limit: usize) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| routes(cfg, body_limit)
}

fn routes(cfg: &mut web::ServiceConfig, body_limit: usize) {
    let json = web::JsonConfig::default()
        .limit(body_limit)
        .error_handler(|err, _req: &HttpRequest| malformed_request("MALFORMED_BODY", err));
    let query = web::QueryConfig::default()
        .error_handler(|err, _req: &HttpRequest| malformed_request("MALFORMED_QUERY", err));
    cfg.service(
        web::scope("/api")
            .app_data(json)
            .app_data(query)
            .route("/", web::get().to(index))
            .route("/schema", web::get().to(get_schema))
            .route("/schema", web::post().to(reload_schema))
            .route("/schema/{keyspace}", web::get().to(get_keyspace))
            .route("/schema/{keyspace}/{table}", web::get().to(get_table))
            .route("/{keyspace}/{table}", web::get().to(read_rows))
            .route("/{keyspace}/{table}", web::post().to(insert_row))
            .route("/{keyspace}/{table}", web::put().to(update_row))
            .route("/{keyspace}/{table}", web::delete().to(delete_row)),
    );
}
