pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod loader;
pub mod model;
pub mod mutation;
pub mod rows;
pub mod service;
pub mod value;

#[cfg(feature = "server")]
pub mod api;
#[cfg(feature = "server")]
pub mod db;
#[cfg(feature = "remote")]
pub mod remote;

pub use client::{ContinuationToken, CqlClient, Page, Row, Statement};
pub use error::{Error, Result};
pub use model::{Cluster, Column, ColumnKind, Keyspace, Table, TableRef};
pub use service::Admin;

pub mod server {
    #[derive(Debug, Clone, PartialEq)]
    pub struct ServerInfo {
        pub name: &'static str,
        pub version: &'static str,
    }

    pub fn server_info() -> ServerInfo {
        ServerInfo {
            name: "scylla-rust-admin",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}
