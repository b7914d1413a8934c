//! Shared fixtures for the integration tests.
//!
//! [`backends`] builds one store per backend configuration. Every contract in
//! `repository_contract.rs` runs against each of them, so a behaviour that
//! holds for the in-memory store must hold for all the others too.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use keystash::config::DatabaseConfig;
use keystash::storage::{create_pool, Encoding, InMemoryKvStore, RedbStore, Store};
use std::sync::Arc;
use tempfile::TempDir;

/// A store plus the temp directory keeping its files alive
pub struct Backend {
    pub label: String,
    pub store: Store,
    dir: Option<Arc<TempDir>>,
}

pub fn memory() -> Backend {
    Backend { label: "memory".to_string(), store: Store::in_memory(), dir: None }
}

pub async fn database() -> Backend {
    let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
    Backend { label: "database".to_string(), store: Store::database(pool), dir: None }
}

pub async fn database_file() -> Backend {
    let dir = Arc::new(TempDir::new().unwrap());
    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("keystash.db").display()),
        ..DatabaseConfig::default()
    };
    let pool = create_pool(&config).await.unwrap();
    Backend { label: "database(file)".to_string(), store: Store::database(pool), dir: Some(dir) }
}

pub fn redb() -> Backend {
    let dir = Arc::new(TempDir::new().unwrap());
    let kv = RedbStore::open(dir.path().join("keystash.redb")).unwrap();
    Backend {
        label: "key_value(redb)".to_string(),
        store: Store::key_value(Arc::new(kv)),
        dir: Some(dir),
    }
}

pub fn kv_in_memory() -> Backend {
    Backend {
        label: "key_value(memory)".to_string(),
        store: Store::key_value(Arc::new(InMemoryKvStore::new())),
        dir: None,
    }
}

pub fn file(encoding: Encoding) -> Backend {
    let dir = Arc::new(TempDir::new().unwrap());
    let store = Store::file(dir.path(), encoding).unwrap();
    Backend { label: format!("file({})", encoding), store, dir: Some(dir) }
}

pub async fn mirrored(backend: Backend) -> Backend {
    Backend {
        label: format!("mirrored {}", backend.label),
        store: backend.store.mirrored().await.unwrap(),
        dir: backend.dir,
    }
}

/// Every backend configuration, each with empty collections
pub async fn backends() -> Vec<Backend> {
    vec![
        memory(),
        database().await,
        database_file().await,
        redb(),
        kv_in_memory(),
        file(Encoding::Json),
        file(Encoding::Binary),
        file(Encoding::Csv),
        file(Encoding::Xml),
        mirrored(database().await).await,
        mirrored(redb()).await,
        mirrored(file(Encoding::Json)).await,
    ]
}

/// Fixed instant `seconds` after 2024-01-01T00:00:00Z
pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(seconds)
}
