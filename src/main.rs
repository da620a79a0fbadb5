use std::sync::Arc;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use scylla_rust_admin::api::{self, AppState};
use scylla_rust_admin::config::Config;
use scylla_rust_admin::db::ScyllaClient;
use scylla_rust_admin::CqlClient;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .try_init();

    let config = Config::from_env()?;
    let client: Arc<dyn CqlClient> = Arc::new(ScyllaClient::connect(&config.db).await?);
    let state = web::Data::new(AppState::new(client, config.default_fetch_size));
    let cluster = state
        .admin
        .reload()
        .await
        .context("initial schema load failed")?;
    info!(keyspaces = cluster.keyspaces().count(), "schema loaded");

    let http = config.http.clone();
    info!(host = %http.host, port = http.port, "starting admin server");
    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .expose_headers(http.cors_expose_headers.iter().map(String::as_str))
            .max_age(3600);
        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            .configure(api::configure_with_limit(http.body_limit))
    })
    .bind((config.http.host.as_str(), config.http.port))?
    .run()
    .await?;
    Ok(())
}
