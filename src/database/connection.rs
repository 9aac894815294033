//! Database connection URL value object.

use serde::Serialize;
use std::fmt;
use url::Url;

use crate::{QueryBridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    MySQL,
    SQLite,
    MsSql,
    Other,
}

impl DatabaseType {
    /// Backend from a URL scheme such as `postgresql+psycopg2`
    fn from_scheme(scheme: &str) -> Self {
        let backend = scheme.split('+').next().unwrap_or(scheme);
        match backend {
            "postgres" | "postgresql" => DatabaseType::PostgreSQL,
            "mysql" | "mariadb" => DatabaseType::MySQL,
            "sqlite" => DatabaseType::SQLite,
            "mssql" | "sqlserver" => DatabaseType::MsSql,
            _ => DatabaseType::Other,
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatabaseType::PostgreSQL => "postgresql",
            DatabaseType::MySQL => "mysql",
            DatabaseType::SQLite => "sqlite",
            DatabaseType::MsSql => "mssql",
            DatabaseType::Other => "other",
        };
        f.write_str(name)
    }
}

/// Parsed database URL. The password never shows up in `Display` or `redacted()`.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConnection {
    url: String,
    pub db_type: DatabaseType,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    password: Option<String>,
}

impl DatabaseConnection {
    pub fn from_url(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(QueryBridgeError::Configuration(
                "Database URL is required".to_string(),
            ));
        }

        let parsed = Url::parse(raw.trim()).map_err(|e| {
            QueryBridgeError::Configuration(format!("Invalid database URL: {}", e))
        })?;

        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());

        Ok(Self {
            url: raw.trim().to_string(),
            db_type: DatabaseType::from_scheme(parsed.scheme()),
            host: parsed.host_str().and_then(non_empty),
            port: parsed.port(),
            database: non_empty(parsed.path().trim_start_matches('/')),
            username: non_empty(parsed.username()),
            password: parsed.password().map(str::to_string),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// URL without a `+driver` scheme suffix (`postgresql+psycopg2://` → `postgresql://`),
    /// the form native drivers accept
    pub fn driver_url(&self) -> String {
        match self.url.split_once("://") {
            Some((scheme, rest)) if scheme.contains('+') => {
                let backend = scheme.split('+').next().unwrap_or(scheme);
                format!("{}://{}", backend, rest)
            }
            _ => self.url.clone(),
        }
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// URL with the password masked, safe for logs
    pub fn redacted(&self) -> String {
        match Url::parse(&self.url) {
            Ok(mut parsed) if parsed.password().is_some() => {
                // set_password only fails for cannot-be-a-base URLs, which carry no password
                let _ = parsed.set_password(Some("***"));
                parsed.to_string()
            }
            _ => self.url.clone(),
        }
    }
}

impl fmt::Debug for DatabaseConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConnection")
            .field("url", &self.redacted())
            .field("db_type", &self.db_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .finish()
    }
}

impl fmt::Display for DatabaseConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}
