//! # Configuration
//!
//! Application settings loaded once at startup from a TOML file.
//!
//! Every section has defaults, so an empty file is a valid configuration:
//!
//! ```toml
//! [app]
//! name = "tinymvc"
//!
//! [server]
//! address = "127.0.0.1:8000"
//!
//! [database]
//! url = "sqlite:app.db"
//!
//! [session]
//! name = "tinymvc_session"
//! csrf_token = "_token"
//! idle_timeout_secs = 7200
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `[app]`
    pub app: AppConfig,
    /// `[server]`
    pub server: ServerSection,
    /// `[database]`
    pub database: DatabaseConfig,
    /// `[session]`
    pub session: SessionConfig,
    /// `[views]`
    pub views: ViewsConfig,
    /// The file as parsed, including keys no section knows about
    #[serde(skip)]
    raw: toml::Table,
}

/// `[app]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application name
    pub name: String,
    /// Public base URL
    pub url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "tinymvc".to_string(),
            url: "http://localhost:8000".to_string(),
        }
    }
}

/// `[server]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Listen address
    pub address: String,
    /// Max request body size in bytes
    pub max_body_size: usize,
    /// Seconds to wait for in-flight requests on shutdown
    pub shutdown_timeout_secs: u64,
    /// Keep connections alive between requests
    pub keep_alive: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8000".to_string(),
            max_body_size: 1024 * 1024,
            shutdown_timeout_secs: 30,
            keep_alive: true,
        }
    }
}

/// `[database]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL; no URL means no database
    pub url: Option<String>,
    /// Pool size
    pub max_connections: Option<u32>,
}

/// `[session]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session cookie name
    pub name: String,
    /// Session key holding the CSRF token
    pub csrf_token: String,
    /// Seconds an unused session is kept before it is dropped
    pub idle_timeout_secs: u64,
}

impl SessionConfig {
    /// Idle lifetime of a session
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "tinymvc_session".to_string(),
            csrf_token: "_token".to_string(),
            idle_timeout_secs: 2 * 60 * 60,
        }
    }
}

/// `[views]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewsConfig {
    /// Directory holding view files
    pub path: PathBuf,
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("views"),
        }
    }
}

impl Config {
    /// Parse and validate configuration text
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for malformed TOML or invalid values.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let raw: toml::Table = toml::from_str(source).map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        let mut config: Self = toml::Value::Table(raw.clone())
            .try_into()
            .map_err(|e: toml::de::Error| Error::Config {
                message: e.to_string(),
            })?;
        config.raw = raw;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read, otherwise as
    /// [`Config::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "Loading configuration");
        Self::from_toml_str(&source)
    }

    fn validate(&self) -> Result<()> {
        if self.session.name.trim().is_empty() {
            return Err(Error::Config {
                message: "session.name must not be empty".to_string(),
            });
        }
        if self.session.csrf_token.trim().is_empty() {
            return Err(Error::Config {
                message: "session.csrf_token must not be empty".to_string(),
            });
        }
        if self.session.idle_timeout_secs == 0 {
            return Err(Error::Config {
                message: "session.idle_timeout_secs must be at least 1".to_string(),
            });
        }
        if self.database.max_connections == Some(0) {
            return Err(Error::Config {
                message: "database.max_connections must be at least 1".to_string(),
            });
        }
        self.server_config().map(|_| ())
    }

    /// Dotted lookup, e.g. `get("database.url")`
    ///
    /// Keys present in the file win; known keys fall back to their
    /// defaults. Unknown keys give `None`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<toml::Value> {
        lookup(&self.raw, key).cloned().or_else(|| {
            let defaults = toml::Value::try_from(self).ok()?;
            lookup(defaults.as_table()?, key).cloned()
        })
    }

    /// Server settings in the form the server consumes
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `server.address` is not a socket address.
    pub fn server_config(&self) -> Result<crate::server::ServerConfig> {
        let address: SocketAddr = self.server.address.parse().map_err(|_| Error::Config {
            message: format!("server.address is not a socket address: {}", self.server.address),
        })?;

        Ok(crate::server::ServerConfig {
            address,
            keep_alive: self.server.keep_alive,
            shutdown_timeout: Duration::from_secs(self.server.shutdown_timeout_secs),
            max_body_size: self.server.max_body_size,
        })
    }
}

fn lookup<'a>(table: &'a toml::Table, key: &str) -> Option<&'a toml::Value> {
    let mut parts = key.split('.');
    let mut current = table.get(parts.next()?)?;
    for part in parts {
        current = current.as_table()?.get(part)?;
    }
    Some(current)
}
