//! # Configuration Management
//!
//! Settings are layered from built-in defaults, an optional TOML file and
//! `KEYSTASH__*` environment variables, then validated.

pub mod settings;

pub use settings::{
    AppConfig, BackendKind, DatabaseConfig, FileConfig, KeyValueConfig, ObservabilityConfig,
    StorageConfig, ENV_PREFIX,
};
