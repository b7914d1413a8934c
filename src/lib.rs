//! # Keystash
//!
//! Storage core for a small secrets manager. Folders and paths organise named
//! secrets whose values may be expressions over other secrets.
//!
//! ## Architecture
//!
//! ```text
//! caller → SecretService → Store → Repository (memory | database | key-value | file)
//!                                      ↑
//!                              optional in-memory mirror
//! ```
//!
//! Every backend implements the same [`storage::Repository`] contract, so
//! filtering, sorting, pagination and uniqueness behave identically whichever
//! one [`config::StorageConfig`] selects.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use keystash::{domain::Secret, services::SecretService, storage::Store};
//!
//! # async fn demo() -> keystash::Result<()> {
//! let service = SecretService::new(Store::in_memory());
//! let host = service.create_secret(Secret::new(1, "HOST", "db.internal", "string")).await?;
//! let url = service.create_secret(Secret::new(1, "URL", "'tcp://' + HOST", "string")).await?;
//! assert_eq!(service.evaluate_secret(url.id).await?, "tcp://db.internal");
//! # let _ = host;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod evaluator;
pub mod observability;
pub mod services;
pub mod storage;

// Re-export commonly used types and traits
pub use config::AppConfig;
pub use errors::{KeystashError, Result};
pub use services::SecretService;
pub use storage::{Repository, Store};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "keystash");
    }
}
