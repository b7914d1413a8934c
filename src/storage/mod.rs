//! # Storage and Persistence
//!
//! The repository contract, the query engine that gives `ListParams` its
//! meaning, and the backends implementing both: in-memory, SQLite, key-value
//! (redb) and collection files, plus the write-through mirror and backend
//! selection.

pub mod database;
pub mod file;
pub mod keyvalue;
pub mod memory;
pub mod migrations;
pub mod mirror;
pub mod pool;
pub mod query;
pub mod repository;
pub mod seed;
pub mod store;

pub use crate::config::DatabaseConfig;

pub use database::{DatabaseRepository, SqlEntity};
pub use file::{Encoding, FileRepository};
pub use keyvalue::{InMemoryKvStore, KeyValueRepository, KeyValueStore, RedbStore};
pub use memory::MemoryRepository;
pub use migrations::{
    get_migration_version, list_applied_migrations, run_migrations as run_db_migrations,
    validate_migrations, MigrationInfo,
};
pub use mirror::Mirrored;
pub use pool::{create_pool, get_pool_stats, DbPool, PoolStats};
pub use repository::Repository;
pub use seed::{copy_all, CopyFailure, CopyReport};
pub use store::Store;

use crate::errors::{KeystashError, Result};

/// Run database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    migrations::run_migrations(pool).await
}

/// Check database connectivity
pub async fn check_connection(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| KeystashError::Database {
        source: e,
        context: "Database connectivity check failed".to_string(),
    })?;

    Ok(())
}
