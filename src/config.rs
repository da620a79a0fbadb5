//! Environment-driven configuration.

use anyhow::{Context, Result};

/// Largest accepted JSON request body, in bytes.
pub const DEFAULT_BODY_LIMIT: usize = 100 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub nodes: Vec<String>,
    pub credentials: Option<(String, String)>,
    pub ssl: bool,
    pub ca_bundle: Option<String>,
    pub ssl_insecure: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub body_limit: usize,
    pub cors_expose_headers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db: DbConfig,
    pub http: HttpConfig,
    /// Page size used when a read does not ask for one.
    pub default_fetch_size: i32,
}

fn flag(v: Option<String>) -> bool {
    v.map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn list(v: &str) -> Vec<String> {
    v.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: '{}'", key, raw)),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let uri = lookup("SCYLLA_URI").unwrap_or_else(|| "127.0.0.1:9042".to_string());
        let nodes = list(&uri);
        anyhow::ensure!(!nodes.is_empty(), "SCYLLA_URI names no contact point");
        let credentials = match (lookup("SCYLLA_USER"), lookup("SCYLLA_PASS")) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        };
        let db = DbConfig {
            nodes,
            credentials,
            ssl: flag(lookup("SCYLLA_SSL")),
            ca_bundle: lookup("SCYLLA_CA_BUNDLE"),
            ssl_insecure: flag(lookup("SCYLLA_SSL_INSECURE")),
        };

        let default_fetch_size: i32 = parsed(&lookup, "FETCH_SIZE", 100)?;
        anyhow::ensure!(default_fetch_size > 0, "FETCH_SIZE must be positive");

        let http = HttpConfig {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed(&lookup, "PORT", 8080)?,
            body_limit: parsed(&lookup, "BODY_LIMIT", DEFAULT_BODY_LIMIT)?,
            cors_expose_headers: list(
                &lookup("CORS_EXPOSE_HEADERS").unwrap_or_else(|| "Link".to_string()),
            ),
        };
        Ok(Self {
            db,
            http,
            default_fetch_size,
        })
    }
}
