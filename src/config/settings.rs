//! # Configuration Settings
//!
//! Defines the configuration structure for keystash: which storage backend to
//! use, how to reach it, and how to log.

use crate::errors::{KeystashError, Result};
use crate::storage::file::Encoding;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

/// Environment variable prefix; nested keys are separated by `__`
/// (`KEYSTASH__STORAGE__BACKEND=database`).
pub const ENV_PREFIX: &str = "KEYSTASH";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Storage configuration
    #[validate(nested)]
    pub storage: StorageConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Layer defaults, an optional TOML file and `KEYSTASH__*` environment
    /// variables, then validate the result.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Toml).required(true),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(KeystashError::from)?;
        self.validate_custom()
    }

    /// Checks that depend on the selected backend
    fn validate_custom(&self) -> Result<()> {
        match self.storage.backend {
            BackendKind::Database if !self.storage.database.is_sqlite() => {
                Err(KeystashError::config("Database URL must start with 'sqlite:'"))
            }
            BackendKind::Database
                if self.storage.database.min_connections > self.storage.database.max_connections =>
            {
                Err(KeystashError::config("min_connections cannot be greater than max_connections"))
            }
            _ => Ok(()),
        }
    }
}

/// Physical storage engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Memory,
    Database,
    #[serde(alias = "kv", alias = "keyvalue")]
    KeyValue,
    File,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Database => "database",
            BackendKind::KeyValue => "key_value",
            BackendKind::File => "file",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = KeystashError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "memory" => Ok(BackendKind::Memory),
            "database" | "db" | "sqlite" => Ok(BackendKind::Database),
            "key_value" | "keyvalue" | "kv" => Ok(BackendKind::KeyValue),
            "file" => Ok(BackendKind::File),
            other => Err(KeystashError::not_implemented(format!("storage backend '{}'", other))),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend holding the records
    pub backend: BackendKind,

    /// Serve reads from an in-memory copy kept in step with the backend.
    /// Ignored for the memory backend.
    pub mirror: bool,

    #[validate(nested)]
    pub database: DatabaseConfig,

    #[validate(nested)]
    pub key_value: KeyValueConfig,

    #[validate(nested)]
    pub file: FileConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[validate(range(min = 0, max = 50, message = "Min connections must be between 0 and 50"))]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Idle timeout in seconds (0 = no timeout)
    pub idle_timeout_seconds: u64,

    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/keystash.db".to_string(),
            max_connections: 10,
            min_connections: 0,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600, // 10 minutes
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    /// Private in-memory database, migrated on connect
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            auto_migrate: true,
            ..Default::default()
        }
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get idle timeout as Duration (None if 0)
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_seconds))
        }
    }

    /// Check if this is a SQLite configuration
    pub fn is_sqlite(&self) -> bool {
        self.url.starts_with("sqlite:")
    }

    /// Check if the database lives only in memory
    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

/// Key-value backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct KeyValueConfig {
    /// redb database file
    pub path: PathBuf,
}

impl Default for KeyValueConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("./data/keystash.redb") }
    }
}

/// File backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FileConfig {
    /// Directory holding one file per collection
    pub directory: PathBuf,

    /// Collection encoding: json, binary, csv or xml
    #[validate(length(min = 1, message = "Encoding cannot be empty"))]
    pub encoding: String,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self { directory: PathBuf::from("./data"), encoding: Encoding::Json.to_string() }
    }
}

impl FileConfig {
    /// Parsed encoding; unknown names are `NotImplemented`
    pub fn encoding(&self) -> Result<Encoding> {
        self.encoding.parse()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,

    /// Service name attached to log records
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: false,
            service_name: "keystash".to_string(),
        }
    }
}
