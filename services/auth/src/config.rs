//! Service configuration
//!
//! Values are layered: built-in defaults, then an optional config file, then
//! environment variables prefixed with `SESSIONAUTH_`. Nested keys use a
//! double underscore, e.g. `SESSIONAUTH_SESSION__DURATION_SECS=1800`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Duration;
use serde::Deserialize;

use crate::session::SessionConfig;

const ENV_PREFIX: &str = "SESSIONAUTH";

/// Top-level service configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub session: SessionSettings,
    pub store: StoreSettings,
    pub cookie: CookieSettings,
    pub users: UserSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    pub bind: String,
    /// Upper bound for handling a single request
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8085".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Session timing, in seconds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub duration_secs: u64,
    pub max_duration_secs: u64,
    pub min_write_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            duration_secs: 3600,
            max_duration_secs: 24 * 3600,
            min_write_interval_secs: 120,
        }
    }
}

impl SessionSettings {
    /// Convert to the manager's policy; out-of-range values become zero and
    /// are replaced by the manager's defaults
    pub fn to_session_config(&self) -> SessionConfig {
        let secs = |value: u64| {
            i64::try_from(value)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or_else(Duration::zero)
        };
        SessionConfig {
            session_duration: secs(self.duration_secs),
            max_session_duration: secs(self.max_duration_secs),
            min_write_interval: secs(self.min_write_interval_secs),
        }
    }
}

/// Which session store backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    Filesystem,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub kind: StoreKind,
    /// Directory for the filesystem store, the system temp dir when unset
    pub path: Option<PathBuf>,
    pub redis_url: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            kind: StoreKind::Filesystem,
            path: None,
            redis_url: "redis://localhost:6379".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CookieSettings {
    pub name: String,
    pub secure: bool,
    /// Base64 encoded key of at least 64 bytes; a random key is generated
    /// when unset, which logs everybody out on restart
    pub key: Option<String>,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            name: "_c_auth".to_string(),
            secure: true,
            key: None,
        }
    }
}

/// Where credentials are checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserSource {
    Static,
    Database,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StaticUser {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub source: UserSource,
    #[serde(rename = "static")]
    pub static_users: Vec<StaticUser>,
    pub database_url: Option<String>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            source: UserSource::Static,
            static_users: vec![
                StaticUser {
                    name: "demo".to_string(),
                    password: "demo".to_string(),
                },
                StaticUser {
                    name: "admin".to_string(),
                    password: "admin".to_string(),
                },
            ],
            database_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Default filter when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load the configuration from an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to read configuration")?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }
}
