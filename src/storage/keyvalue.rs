//! # Key-Value Repository
//!
//! Records are stored as JSON under `<kind>:<id>` keys in a [`KeyValueStore`].
//! Listing scans the entity's key prefix, bulk-fetches the values and hands the
//! decoded collection to the shared query engine, so filtering, sorting and
//! paging behave exactly like the in-memory repository.

use crate::domain::{Entity, ListParams};
use crate::errors::{KeystashError, Result};
use crate::storage::query;
use crate::storage::repository::{
    ensure_unique, merge_update, next_id_of, now, stamp_new, Repository,
};
use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Minimal async key-value contract used by [`KeyValueRepository`]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Remove a key; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Every key starting with `prefix`, in key order
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Values for many keys at once; missing keys yield `None` in place
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        (**self).set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        (**self).delete(key).await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        (**self).scan_prefix(prefix).await
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        (**self).get_many(keys).await
    }
}

/// Single table holding every record. Key: `<kind>:<id>`, value: JSON bytes.
const RECORDS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

fn kv_error(key: &str, action: &str, error: impl Into<redb::Error>) -> KeystashError {
    let error: redb::Error = error.into();
    tracing::error!(error = %error, key, action, "Key-value store operation failed");
    KeystashError::backend("key", key, action, error)
}

/// [`KeyValueStore`] persisted in a redb database file
pub struct RedbStore {
    db: Database,
    path: PathBuf,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").field("path", &self.path).finish()
    }
}

impl RedbStore {
    /// Create or open the store at `path`, creating parent directories and the table
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| KeystashError::Io {
                source: e,
                context: format!("Failed to create directory {}", parent.display()),
            })?;
        }

        let location = path.display().to_string();
        let db = Database::create(&path).map_err(|e| kv_error(&location, "open", e))?;

        let write_txn = db.begin_write().map_err(|e| kv_error(&location, "open", e))?;
        {
            write_txn.open_table(RECORDS_TABLE).map_err(|e| kv_error(&location, "open", e))?;
        }
        write_txn.commit().map_err(|e| kv_error(&location, "open", e))?;

        tracing::info!(path = %path.display(), "Opened key-value store");
        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_value(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read().map_err(|e| kv_error(key, "get", e))?;
        let table = read_txn.open_table(RECORDS_TABLE).map_err(|e| kv_error(key, "get", e))?;
        let value = table.get(key).map_err(|e| kv_error(key, "get", e))?;
        Ok(value.map(|guard| guard.value().to_vec()))
    }
}

#[async_trait]
impl KeyValueStore for RedbStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.read_value(key)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(|e| kv_error(key, "set", e))?;
        {
            let mut table =
                write_txn.open_table(RECORDS_TABLE).map_err(|e| kv_error(key, "set", e))?;
            table.insert(key, value.as_slice()).map_err(|e| kv_error(key, "set", e))?;
        }
        write_txn.commit().map_err(|e| kv_error(key, "set", e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let write_txn = self.db.begin_write().map_err(|e| kv_error(key, "delete", e))?;
        let existed = {
            let mut table =
                write_txn.open_table(RECORDS_TABLE).map_err(|e| kv_error(key, "delete", e))?;
            let removed = table.remove(key).map_err(|e| kv_error(key, "delete", e))?;
            removed.is_some()
        };
        write_txn.commit().map_err(|e| kv_error(key, "delete", e))?;
        Ok(existed)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let read_txn = self.db.begin_read().map_err(|e| kv_error(prefix, "scan", e))?;
        let table =
            read_txn.open_table(RECORDS_TABLE).map_err(|e| kv_error(prefix, "scan", e))?;

        let mut keys = Vec::new();
        for item in table.range::<&str>(prefix..).map_err(|e| kv_error(prefix, "scan", e))? {
            let (key, _value) = item.map_err(|e| kv_error(prefix, "scan", e))?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key.to_string());
        }
        Ok(keys)
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let read_txn = self.db.begin_read().map_err(|e| kv_error("*", "get_many", e))?;
        let table =
            read_txn.open_table(RECORDS_TABLE).map_err(|e| kv_error("*", "get_many", e))?;

        keys.iter()
            .map(|key| {
                let value = table.get(key.as_str()).map_err(|e| kv_error(key, "get_many", e))?;
                Ok(value.map(|guard| guard.value().to_vec()))
            })
            .collect()
    }
}

/// Volatile [`KeyValueStore`] over a sorted map
#[derive(Debug, Clone, Default)]
pub struct InMemoryKvStore {
    entries: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let entries = self.entries.read().await;
        Ok(keys.iter().map(|key| entries.get(key).cloned()).collect())
    }
}

/// Repository for one entity type over a [`KeyValueStore`]
pub struct KeyValueRepository<E> {
    store: Arc<dyn KeyValueStore>,
    // Serializes read-check-write sequences (ID assignment, uniqueness)
    write_lock: Arc<Mutex<()>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for KeyValueRepository<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            write_lock: Arc::clone(&self.write_lock),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> KeyValueRepository<E> {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store, write_lock: Arc::new(Mutex::new(())), _entity: PhantomData }
    }

    fn prefix() -> String {
        format!("{}:", E::KIND)
    }

    fn key(id: i64) -> String {
        format!("{}:{}", E::KIND, id)
    }

    fn encode(record: &E) -> Result<Vec<u8>> {
        serde_json::to_vec(record).map_err(|e| {
            KeystashError::serialization_with_source(
                format!("Failed to encode {} {}", E::KIND, record.id()),
                e,
            )
        })
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<E> {
        serde_json::from_slice(bytes).map_err(|e| {
            KeystashError::serialization_with_source(format!("Failed to decode {}", key), e)
        })
    }

    async fn fetch(&self, id: i64) -> Result<Option<E>> {
        let key = Self::key(id);
        match self.store.get(&key).await? {
            Some(bytes) => Ok(Some(Self::decode(&key, &bytes)?)),
            None => Ok(None),
        }
    }

    async fn store_record(&self, record: &E, action: &str) -> Result<()> {
        let key = Self::key(record.id());
        let bytes = Self::encode(record)?;
        self.store.set(&key, bytes).await.map_err(|e| match e {
            KeystashError::Backend { source, .. } => {
                KeystashError::backend(E::KIND, record.id(), action, source)
            }
            other => other,
        })
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for KeyValueRepository<E> {
    fn backend(&self) -> &'static str {
        "key_value"
    }

    async fn next_id(&self) -> Result<i64> {
        next_id_of(&self.load().await?)
    }

    #[instrument(skip(self), fields(entity = E::KIND), name = "kv_load")]
    async fn load(&self) -> Result<Vec<E>> {
        let keys = self.store.scan_prefix(&Self::prefix()).await?;
        let values = self.store.get_many(&keys).await?;

        let mut records = Vec::with_capacity(keys.len());
        for (key, value) in keys.iter().zip(values) {
            // A key deleted between scan and fetch is skipped
            if let Some(bytes) = value {
                records.push(Self::decode(key, &bytes)?);
            }
        }
        records.sort_by_key(|r| r.id());
        Ok(records)
    }

    #[instrument(skip(self, params), fields(entity = E::KIND), name = "kv_get")]
    async fn get(&self, params: &ListParams) -> Result<Vec<E>> {
        query::apply(self.load().await?, params)
    }

    #[instrument(skip(self, params), fields(entity = E::KIND), name = "kv_count")]
    async fn count(&self, params: &ListParams) -> Result<u64> {
        query::count(&self.load().await?, params)
    }

    #[instrument(
        skip(self, record),
        fields(entity = E::KIND, record_name = %record.name()),
        name = "kv_create"
    )]
    async fn create(&self, mut record: E) -> Result<E> {
        let _guard = self.write_lock.lock().await;
        let records = self.load().await?;
        ensure_unique(&records, &record, true)?;
        stamp_new(&mut record, next_id_of(&records)?);

        self.store_record(&record, "create").await?;
        tracing::info!(entity = E::KIND, id = record.id(), "Created record in key-value store");
        Ok(record)
    }

    #[instrument(
        skip(self, record),
        fields(entity = E::KIND, id = record.id()),
        name = "kv_update"
    )]
    async fn update(&self, record: E) -> Result<E> {
        let _guard = self.write_lock.lock().await;
        let current = self
            .fetch(record.id())
            .await?
            .filter(|r| !r.is_deleted())
            .ok_or_else(|| KeystashError::not_found(E::KIND, record.id()))?;
        let updated = merge_update(&current, record);
        ensure_unique(&self.load().await?, &updated, false)?;
        self.store_record(&updated, "update").await?;
        Ok(updated)
    }

    #[instrument(skip(self), fields(entity = E::KIND), name = "kv_delete")]
    async fn delete(&self, id: i64, force: bool) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut stored = self
            .fetch(id)
            .await?
            .filter(|r| force || !r.is_deleted())
            .ok_or_else(|| KeystashError::not_found(E::KIND, id))?;

        if force {
            self.store.delete(&Self::key(id)).await?;
        } else {
            let stamp = now();
            stored.set_deleted_at(Some(stamp));
            stored.set_updated_at(stamp);
            self.store_record(&stored, "delete").await?;
        }

        tracing::info!(entity = E::KIND, id, force, "Deleted record in key-value store");
        Ok(())
    }
}
