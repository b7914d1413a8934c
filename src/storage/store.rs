//! # Backend Selection
//!
//! [`Store`] bundles one repository per entity type behind `Arc<dyn Repository>`
//! and is assembled once from [`StorageConfig`]. Callers never name a concrete
//! backend.

use crate::config::{BackendKind, StorageConfig};
use crate::domain::{Folder, Path, Secret};
use crate::errors::Result;
use crate::storage::database::DatabaseRepository;
use crate::storage::file::{Encoding, FileRepository};
use crate::storage::keyvalue::{KeyValueRepository, KeyValueStore, RedbStore};
use crate::storage::memory::MemoryRepository;
use crate::storage::mirror::Mirrored;
use crate::storage::pool::{create_pool, DbPool};
use crate::storage::repository::Repository;
use std::sync::Arc;
use tracing::info;

/// Repositories for the three collections
#[derive(Clone)]
pub struct Store {
    pub folders: Arc<dyn Repository<Folder>>,
    pub paths: Arc<dyn Repository<Path>>,
    pub secrets: Arc<dyn Repository<Secret>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("backend", &self.backend()).finish()
    }
}

impl Store {
    /// Volatile store with empty collections
    pub fn in_memory() -> Self {
        Self {
            folders: Arc::new(MemoryRepository::<Folder>::new()),
            paths: Arc::new(MemoryRepository::<Path>::new()),
            secrets: Arc::new(MemoryRepository::<Secret>::new()),
        }
    }

    /// SQLite-backed store over an existing pool
    pub fn database(pool: DbPool) -> Self {
        Self {
            folders: Arc::new(DatabaseRepository::<Folder>::new(pool.clone())),
            paths: Arc::new(DatabaseRepository::<Path>::new(pool.clone())),
            secrets: Arc::new(DatabaseRepository::<Secret>::new(pool)),
        }
    }

    /// Store sharing one key-value store across all collections
    pub fn key_value(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            folders: Arc::new(KeyValueRepository::<Folder>::new(Arc::clone(&store))),
            paths: Arc::new(KeyValueRepository::<Path>::new(Arc::clone(&store))),
            secrets: Arc::new(KeyValueRepository::<Secret>::new(store)),
        }
    }

    /// Store keeping one collection file per entity in `directory`
    pub fn file(directory: &std::path::Path, encoding: Encoding) -> Result<Self> {
        Ok(Self {
            folders: Arc::new(FileRepository::<Folder>::new(directory, encoding)?),
            paths: Arc::new(FileRepository::<Path>::new(directory, encoding)?),
            secrets: Arc::new(FileRepository::<Secret>::new(directory, encoding)?),
        })
    }

    /// Put a write-through in-memory mirror in front of every collection
    pub async fn mirrored(self) -> Result<Self> {
        Ok(Self {
            folders: Arc::new(Mirrored::new(self.folders).await?),
            paths: Arc::new(Mirrored::new(self.paths).await?),
            secrets: Arc::new(Mirrored::new(self.secrets).await?),
        })
    }

    /// Build the store described by the configuration
    pub async fn from_config(config: &StorageConfig) -> Result<Self> {
        let store = match config.backend {
            BackendKind::Memory => Self::in_memory(),
            BackendKind::Database => Self::database(create_pool(&config.database).await?),
            BackendKind::KeyValue => {
                Self::key_value(Arc::new(RedbStore::open(&config.key_value.path)?))
            }
            BackendKind::File => Self::file(&config.file.directory, config.file.encoding()?)?,
        };

        info!(backend = %config.backend, mirror = config.mirror, "Storage backend initialized");

        // A mirror over memory would only duplicate it
        if config.mirror && config.backend != BackendKind::Memory {
            store.mirrored().await
        } else {
            Ok(store)
        }
    }

    /// Backend name of the folder collection (all three share a backend)
    pub fn backend(&self) -> &'static str {
        self.folders.backend()
    }
}
